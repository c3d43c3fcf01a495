pub mod resolution;
pub mod signal;
pub mod simulation;
pub mod trade;
pub mod whale;

pub use resolution::{Resolution, ResolutionSource, ResolutionVerdict};
pub use signal::{NewSignal, Signal};
pub use simulation::{DelayResult, PriceSource, Simulation, SimulationStatus, SimulationSummary};
pub use trade::{AttemptStatus, PaperTrade, ResolutionAttempt, TradeStatus};
pub use whale::{WhaleRecord, WhaleSource};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUY" | "0" => Some(Side::Buy),
            "SELL" | "1" => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// DetectionEvent: core pipeline message
// ---------------------------------------------------------------------------

/// One trade observed on the feed. Transient; never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub wallet: String,
    pub market_id: String,
    pub asset_id: String,
    pub side: Side,
    /// Outcome slot traded, when the feed reports it.
    pub outcome_index: Option<i64>,
    /// Shares.
    pub size: Decimal,
    pub price: Decimal,
    /// `size * price`, in USDC.
    pub notional: Decimal,
    pub timestamp: DateTime<Utc>,
    pub tx_ref: Option<String>,
    pub market_question: Option<String>,
}

impl DetectionEvent {
    /// Wallet addresses are compared case-insensitively everywhere.
    pub fn wallet_key(&self) -> String {
        self.wallet.to_lowercase()
    }
}

impl fmt::Display for DetectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Detection: wallet={} market={} side={} size={} price={} notional={}",
            self.wallet.get(..10).unwrap_or(&self.wallet),
            self.market_id.get(..10).unwrap_or(&self.market_id),
            self.side,
            self.size,
            self.price,
            self.notional,
        )
    }
}
