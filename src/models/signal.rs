use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{DetectionEvent, Side};

/// Number of leading address characters that identify a wallet in the
/// signal uniqueness key.
pub const WALLET_PREFIX_LEN: usize = 10;

/// A qualifying detection about to be written as a signal.
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub wallet: String,
    pub market_id: String,
    pub asset_id: Option<String>,
    pub outcome_index: i64,
    pub side: Side,
    pub price: Decimal,
    pub notional: Decimal,
    pub whale_confidence: f64,
    pub tx_ref: Option<String>,
    pub market_question: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl NewSignal {
    /// Returns `None` when the event does not say which outcome was traded.
    pub fn from_event(event: &DetectionEvent, whale_confidence: f64) -> Option<Self> {
        Some(Self {
            wallet: event.wallet_key(),
            market_id: event.market_id.clone(),
            asset_id: Some(event.asset_id.clone()).filter(|a| !a.is_empty()),
            outcome_index: event.outcome_index?,
            side: event.side,
            price: event.price,
            notional: event.notional,
            whale_confidence,
            tx_ref: event.tx_ref.clone(),
            market_question: event.market_question.clone(),
            detected_at: event.timestamp,
        })
    }

    pub fn wallet_prefix(&self) -> String {
        wallet_prefix(&self.wallet)
    }
}

pub fn wallet_prefix(wallet: &str) -> String {
    wallet.to_lowercase().chars().take(WALLET_PREFIX_LEN).collect()
}

/// Stored signal row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub wallet: String,
    pub wallet_prefix: String,
    pub market_id: String,
    pub asset_id: Option<String>,
    pub outcome_index: i64,
    pub side: Side,
    pub price: Decimal,
    pub notional: Decimal,
    pub whale_confidence: f64,
    pub tx_ref: Option<String>,
    pub market_question: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_lowercased_and_truncated() {
        assert_eq!(wallet_prefix("0xABCDEF1234567890"), "0xabcdef12");
        assert_eq!(wallet_prefix("0xab"), "0xab");
    }
}
