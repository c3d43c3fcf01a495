use std::collections::HashSet;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{DetectionEvent, WhaleRecord};

/// Which detections are worth simulating and paper trading.
///
/// Elite (pre-vetted) wallets clear a lower confidence bar than wallets the
/// ledger discovered on its own; both then take the same path.
#[derive(Debug, Clone)]
pub struct CopyPolicy {
    elite_wallets: HashSet<String>,
    pub elite_min_confidence: f64,
    pub discovered_min_confidence: f64,
    pub min_notional: Decimal,
}

impl Default for CopyPolicy {
    fn default() -> Self {
        Self {
            elite_wallets: HashSet::new(),
            elite_min_confidence: 0.3,
            discovered_min_confidence: 0.6,
            min_notional: Decimal::from(1_000),
        }
    }
}

/// Reason a detection was not copied.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SkipReason {
    #[error("notional {notional} below minimum {min}")]
    BelowNotional { notional: Decimal, min: Decimal },

    #[error("wallet not in ledger")]
    UnknownWallet,

    #[error("wallet inactive")]
    Inactive,

    #[error("confidence {confidence:.3} below {min:.3}")]
    LowConfidence { confidence: f64, min: f64 },
}

impl CopyPolicy {
    pub fn new(
        elite_wallets: impl IntoIterator<Item = String>,
        elite_min_confidence: f64,
        discovered_min_confidence: f64,
        min_notional: Decimal,
    ) -> Self {
        Self {
            elite_wallets: elite_wallets.into_iter().map(|w| w.to_lowercase()).collect(),
            elite_min_confidence,
            discovered_min_confidence,
            min_notional,
        }
    }

    pub fn is_elite(&self, wallet: &str) -> bool {
        self.elite_wallets.contains(&wallet.to_lowercase())
    }

    pub fn min_confidence_for(&self, wallet: &str) -> f64 {
        if self.is_elite(wallet) {
            self.elite_min_confidence
        } else {
            self.discovered_min_confidence
        }
    }

    /// Returns the wallet's confidence when the detection qualifies.
    pub fn evaluate(&self, event: &DetectionEvent, record: Option<&WhaleRecord>) -> Result<f64, SkipReason> {
        if event.notional < self.min_notional {
            return Err(SkipReason::BelowNotional {
                notional: event.notional,
                min: self.min_notional,
            });
        }
        let record = record.ok_or(SkipReason::UnknownWallet)?;
        if !record.active {
            return Err(SkipReason::Inactive);
        }

        let min = self.min_confidence_for(&event.wallet);
        if record.confidence < min {
            return Err(SkipReason::LowConfidence {
                confidence: record.confidence,
                min,
            });
        }
        Ok(record.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Side, WhaleSource};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn event(wallet: &str, notional: i64) -> DetectionEvent {
        DetectionEvent {
            wallet: wallet.into(),
            market_id: "0xmarket".into(),
            asset_id: "token".into(),
            side: Side::Buy,
            outcome_index: Some(0),
            size: Decimal::from(notional * 2),
            price: Decimal::new(5, 1),
            notional: Decimal::from(notional),
            timestamp: Utc::now(),
            tx_ref: None,
            market_question: None,
        }
    }

    fn record(wallet: &str, confidence: f64) -> WhaleRecord {
        WhaleRecord {
            address: wallet.to_lowercase(),
            first_seen: Utc::now(),
            last_activity: Utc::now(),
            markets_traded: BTreeSet::new(),
            trade_count: 1,
            total_value: Decimal::ZERO,
            confidence,
            anchor_confidence: confidence,
            active: true,
            source: WhaleSource::Anomaly,
            win_rate: None,
            tags: Vec::new(),
        }
    }

    fn policy() -> CopyPolicy {
        CopyPolicy::new(vec!["0xELITE".to_string()], 0.3, 0.6, Decimal::from(1_000))
    }

    #[test]
    fn test_elite_wallet_uses_lower_threshold() {
        let p = policy();
        assert_eq!(p.evaluate(&event("0xelite", 2_000), Some(&record("0xelite", 0.5))), Ok(0.5));
    }

    #[test]
    fn test_discovered_wallet_needs_higher_confidence() {
        let p = policy();
        let result = p.evaluate(&event("0xother", 2_000), Some(&record("0xother", 0.5)));
        assert!(matches!(result, Err(SkipReason::LowConfidence { .. })));
    }

    #[test]
    fn test_small_trades_are_skipped() {
        let p = policy();
        let result = p.evaluate(&event("0xelite", 10), Some(&record("0xelite", 0.9)));
        assert!(matches!(result, Err(SkipReason::BelowNotional { .. })));
    }

    #[test]
    fn test_unknown_wallet() {
        assert_eq!(policy().evaluate(&event("0xnobody", 2_000), None), Err(SkipReason::UnknownWallet));
    }
}
