use std::sync::Arc;

use crate::models::ResolutionVerdict;
use crate::polymarket::gamma_client::{GammaMarket, MarketMetadataSource};

use super::gamma::{analyze_market, GammaVerdict, MisrouteGuard};
use super::overrides::OverrideTable;
use super::uma::{candidate_keys, decode_request, OracleReader, RequestKey};

/// What the on-chain lookup learned about a market.
enum ChainAnswer {
    Resolved(crate::models::Resolution),
    /// The oracle answered and has no settled price.
    Unsettled,
    /// No call succeeded, or no request key could be built.
    Unavailable(String),
}

/// Answers "has this market resolved, and which way" from, in order:
/// operator overrides, the UMA oracle, and Gamma market metadata.
#[derive(Clone)]
pub struct ResolutionOracle {
    chain: Option<Arc<dyn OracleReader>>,
    metadata: Arc<dyn MarketMetadataSource>,
    overrides: Arc<OverrideTable>,
    guard: MisrouteGuard,
}

impl ResolutionOracle {
    pub fn new(
        chain: Option<Arc<dyn OracleReader>>,
        metadata: Arc<dyn MarketMetadataSource>,
        overrides: OverrideTable,
    ) -> Self {
        Self {
            chain,
            metadata,
            overrides: Arc::new(overrides),
            guard: MisrouteGuard::default(),
        }
    }

    pub fn with_guard(mut self, guard: MisrouteGuard) -> Self {
        self.guard = guard;
        self
    }

    /// `stored_question` is the question text captured when the trade was
    /// opened. It keys the on-chain request; the metadata title is used only
    /// when nothing was stored.
    pub async fn check_market(&self, condition_id: &str, stored_question: Option<&str>) -> ResolutionVerdict {
        if let Some(resolution) = self.overrides.resolution_for(condition_id) {
            tracing::info!(
                market = condition_id,
                winner = resolution.winning_outcome_index,
                "Using operator override"
            );
            return ResolutionVerdict::Resolved(resolution);
        }

        let (metadata, metadata_answered) = self.fetch_metadata(condition_id).await;

        let question = stored_question
            .filter(|q| !q.trim().is_empty())
            .or_else(|| metadata.as_ref().and_then(|m| m.display_title()));
        let keys = candidate_keys(
            question,
            metadata.as_ref().and_then(|m| m.question_id.as_deref()),
            condition_id,
            metadata.as_ref().and_then(|m| m.end_date_str()),
        );

        let chain_reason = match self.query_chain(condition_id, &keys).await {
            ChainAnswer::Resolved(resolution) => return ResolutionVerdict::Resolved(resolution),
            ChainAnswer::Unsettled => None,
            ChainAnswer::Unavailable(reason) => Some(reason),
        };

        if let Some(market) = &metadata {
            match analyze_market(market) {
                GammaVerdict::Resolved(resolution) => {
                    tracing::info!(
                        market = condition_id,
                        winner = resolution.winning_outcome_index,
                        price = %resolution.resolved_price,
                        "Resolved from market metadata"
                    );
                    return ResolutionVerdict::Resolved(resolution);
                }
                GammaVerdict::Ambiguous(reason) => {
                    tracing::warn!(market = condition_id, reason = %reason, "Ambiguous metadata resolution ignored");
                    return ResolutionVerdict::NotResolved(format!("ambiguous: {reason}"));
                }
                GammaVerdict::NotResolved => {}
            }
        }

        match chain_reason {
            Some(reason) if !metadata_answered => {
                ResolutionVerdict::Unknown(format!("oracle: {reason}; metadata unavailable"))
            }
            _ => ResolutionVerdict::NotResolved("market not resolved".into()),
        }
    }

    /// Returns the trusted payload, if any, and whether the metadata source
    /// gave a usable answer at all. A misrouted payload counts as an answer
    /// (the market is simply not treated as resolved) but is not trusted.
    async fn fetch_metadata(&self, condition_id: &str) -> (Option<GammaMarket>, bool) {
        match self.metadata.fetch_market(condition_id).await {
            Ok(Some(market)) => match self.guard.check(condition_id, &market) {
                Some(reason) => {
                    tracing::warn!(market = condition_id, reason = %reason, "Discarding misrouted metadata payload");
                    (None, true)
                }
                None => (Some(market), true),
            },
            Ok(None) => {
                tracing::debug!(market = condition_id, "No metadata for market");
                (None, false)
            }
            Err(e) => {
                tracing::warn!(error = %e, market = condition_id, "Metadata fetch failed");
                (None, false)
            }
        }
    }

    async fn query_chain(&self, condition_id: &str, keys: &[RequestKey]) -> ChainAnswer {
        let Some(chain) = &self.chain else {
            return ChainAnswer::Unavailable("oracle reader not configured".into());
        };
        if keys.is_empty() {
            return ChainAnswer::Unavailable("no request key could be derived".into());
        }

        let mut answered = false;
        let mut last_error = String::new();

        for key in keys {
            match chain.has_price(key).await {
                Ok(false) => answered = true,
                Ok(true) => {
                    tracing::debug!(market = condition_id, encoding = %key.encoding, "Oracle has price");
                    let request = match chain.get_request(key).await {
                        Ok(request) => request,
                        Err(e) => {
                            tracing::warn!(error = %e, market = condition_id, "Oracle getRequest failed");
                            last_error = e.to_string();
                            continue;
                        }
                    };
                    answered = true;
                    match decode_request(&request) {
                        Ok(Some(resolution)) => {
                            tracing::info!(
                                market = condition_id,
                                encoding = %key.encoding,
                                winner = resolution.winning_outcome_index,
                                price = %resolution.resolved_price,
                                "Resolved from UMA oracle"
                            );
                            return ChainAnswer::Resolved(resolution);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, market = condition_id, "Ignoring out-of-range oracle value");
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, market = condition_id, encoding = %key.encoding, "Oracle hasPrice failed");
                    last_error = e.to_string();
                }
            }
        }

        if answered {
            ChainAnswer::Unsettled
        } else {
            ChainAnswer::Unavailable(last_error)
        }
    }
}
