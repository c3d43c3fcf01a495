use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use tokio::time::{interval, Duration};

use crate::db::store::compute_pnl;
use crate::db::TradeStore;
use crate::models::{AttemptStatus, PaperTrade, Resolution, ResolutionVerdict};
use crate::resolution::ResolutionOracle;
use crate::services::notifier::{format_settlement, Notifier};

/// Per-cycle tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementSummary {
    pub checked: usize,
    pub resolved: usize,
    pub not_resolved: usize,
    pub unknown: usize,
    pub errored: usize,
}

#[derive(Clone)]
pub struct SettlementLoop {
    store: TradeStore,
    oracle: ResolutionOracle,
    notifier: Option<Notifier>,
    batch_limit: i64,
}

impl SettlementLoop {
    pub fn new(store: TradeStore, oracle: ResolutionOracle, notifier: Option<Notifier>, batch_limit: i64) -> Self {
        Self {
            store,
            oracle,
            notifier,
            batch_limit,
        }
    }

    /// Run `settle_once` every `every`, forever.
    pub async fn run(self, every: Duration) {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            let summary = self.settle_once().await;
            if summary.checked > 0 {
                tracing::info!(
                    checked = summary.checked,
                    resolved = summary.resolved,
                    not_resolved = summary.not_resolved,
                    unknown = summary.unknown,
                    errored = summary.errored,
                    "Settlement cycle finished"
                );
            }
        }
    }

    /// Check every OPEN trade once. Nothing here returns an error: failures
    /// become attempt rows and log lines, and the trade is retried next cycle.
    pub async fn settle_once(&self) -> SettlementSummary {
        let mut summary = SettlementSummary::default();

        let open = match self.store.list_open(self.batch_limit).await {
            Ok(trades) => trades,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list open paper trades, skipping cycle");
                return summary;
            }
        };
        tracing::debug!(count = open.len(), "Settlement: checking open trades");

        for trade in &open {
            summary.checked += 1;
            let status = self.settle_trade(trade).await;
            match status {
                AttemptStatus::Resolved => summary.resolved += 1,
                AttemptStatus::NotResolved => summary.not_resolved += 1,
                AttemptStatus::Unknown => summary.unknown += 1,
                AttemptStatus::Error | AttemptStatus::Rejected => summary.errored += 1,
            }
        }
        summary
    }

    async fn settle_trade(&self, trade: &PaperTrade) -> AttemptStatus {
        if trade.market_ref.trim().is_empty() {
            let reason = "paper trade has no market id";
            if let Err(e) = self.store.mark_error(trade.id, reason).await {
                tracing::error!(error = %e, trade_id = trade.id, "Failed to mark trade as errored");
            }
            tracing::warn!(trade_id = trade.id, "Paper trade has no market id, marked ERROR");
            self.log_attempt(trade.id, AttemptStatus::Error, Some(reason)).await;
            return AttemptStatus::Error;
        }

        let verdict = self
            .oracle
            .check_market(&trade.market_ref, trade.market_question.as_deref())
            .await;

        match verdict {
            ResolutionVerdict::Resolved(resolution) => self.apply_resolution(trade, &resolution).await,
            ResolutionVerdict::NotResolved(reason) => {
                tracing::debug!(trade_id = trade.id, market = %trade.market_ref, reason = %reason, "Market not resolved");
                self.log_attempt(trade.id, AttemptStatus::NotResolved, Some(&reason)).await;
                AttemptStatus::NotResolved
            }
            ResolutionVerdict::Unknown(reason) => {
                counter!("resolution_unknown_total").increment(1);
                tracing::warn!(trade_id = trade.id, market = %trade.market_ref, reason = %reason, "Resolution unknown, will retry");
                self.log_attempt(trade.id, AttemptStatus::Unknown, Some(&reason)).await;
                AttemptStatus::Unknown
            }
        }
    }

    async fn apply_resolution(&self, trade: &PaperTrade, resolution: &Resolution) -> AttemptStatus {
        let won = resolution.winning_outcome_index == trade.outcome_index;
        // The verdict prices the winning token; a losing position holds the other side.
        let position_price = if won {
            resolution.resolved_price
        } else {
            Decimal::ONE - resolution.resolved_price
        };

        let details = format!(
            "winner={} price={} source={}",
            resolution.winning_outcome_index, resolution.resolved_price, resolution.source
        );

        match self
            .store
            .resolve_trade(trade.id, resolution.winning_outcome_index, won, position_price)
            .await
        {
            Ok(true) => {
                self.log_attempt(trade.id, AttemptStatus::Resolved, Some(&details)).await;
                self.resolve_simulations(trade, resolution).await;
                if let Some(n) = &self.notifier {
                    let pnl = compute_pnl(trade.stake, trade.entry_price, won, position_price);
                    let whale = match self.store.get_signal(trade.signal_id).await {
                        Ok(signal) => signal,
                        Err(e) => {
                            tracing::warn!(error = %e, trade_id = trade.id, "Failed to load signal for notification");
                            None
                        }
                    };
                    n.send(&format_settlement(trade, whale.as_ref(), resolution, won, pnl))
                        .await;
                }
                AttemptStatus::Resolved
            }
            Ok(false) => {
                tracing::warn!(trade_id = trade.id, "Settlement refused, trade no longer open");
                self.log_attempt(trade.id, AttemptStatus::Rejected, Some(&details)).await;
                AttemptStatus::Rejected
            }
            Err(e) => {
                tracing::error!(error = %e, trade_id = trade.id, "Failed to write settlement");
                let details = format!("{details}; error={e}");
                self.log_attempt(trade.id, AttemptStatus::Error, Some(&details)).await;
                AttemptStatus::Error
            }
        }
    }

    /// Price the copy simulations still open on the settled market.
    async fn resolve_simulations(&self, trade: &PaperTrade, resolution: &Resolution) {
        let resolved_at = resolution.resolution_time.unwrap_or_else(Utc::now);
        match self
            .store
            .resolve_simulations_for_market(
                &trade.market_ref,
                resolution.winning_outcome_index,
                resolution.resolved_price,
                resolved_at,
            )
            .await
        {
            Ok(resolved) => {
                counter!("simulations_resolved").increment(resolved.len() as u64);
                for sim in &resolved {
                    if let Some(summary) = &sim.summary {
                        tracing::info!(
                            simulation_id = %sim.id,
                            market = %sim.market_id,
                            best_delay = summary.best_delay,
                            profitable = summary.profitable,
                            avg_pnl = %summary.avg_pnl,
                            "Simulation resolved"
                        );
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, market = %trade.market_ref, "Failed to resolve simulations");
            }
        }
    }

    async fn log_attempt(&self, trade_id: i64, status: AttemptStatus, details: Option<&str>) {
        if let Err(e) = self.store.record_attempt(trade_id, status, details).await {
            tracing::error!(error = %e, trade_id, status = %status.as_str(), "Failed to record resolution attempt");
        }
    }
}
