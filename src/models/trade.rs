use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Resolved,
    Error,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "OPEN",
            TradeStatus::Resolved => "RESOLVED",
            TradeStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(TradeStatus::Open),
            "RESOLVED" => Ok(TradeStatus::Resolved),
            "ERROR" => Ok(TradeStatus::Error),
            other => Err(format!("unknown trade status: {other}")),
        }
    }
}

/// A simulated position opened from a signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperTrade {
    pub id: i64,
    pub signal_id: i64,
    pub opened_at: DateTime<Utc>,
    pub status: TradeStatus,
    pub stake: Decimal,
    pub entry_price: Decimal,
    pub outcome_index: i64,
    pub side: Side,
    /// Market condition id; empty when the detection carried none.
    pub market_ref: String,
    pub asset_id: Option<String>,
    pub market_question: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_outcome_index: Option<i64>,
    pub resolved_price: Option<Decimal>,
    pub won: Option<bool>,
    pub pnl: Option<Decimal>,
    pub error_reason: Option<String>,
}

impl PaperTrade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }
}

/// Status recorded in the resolution attempt log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    Resolved,
    NotResolved,
    Unknown,
    Error,
    /// The store refused the settlement write (already terminal).
    Rejected,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Resolved => "RESOLVED",
            AttemptStatus::NotResolved => "NOT_RESOLVED",
            AttemptStatus::Unknown => "UNKNOWN",
            AttemptStatus::Error => "ERROR",
            AttemptStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESOLVED" => Ok(AttemptStatus::Resolved),
            "NOT_RESOLVED" => Ok(AttemptStatus::NotResolved),
            "UNKNOWN" => Ok(AttemptStatus::Unknown),
            "ERROR" => Ok(AttemptStatus::Error),
            "REJECTED" => Ok(AttemptStatus::Rejected),
            other => Err(format!("unknown attempt status: {other}")),
        }
    }
}

/// Append-only audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionAttempt {
    pub id: i64,
    pub paper_trade_id: i64,
    pub checked_at: DateTime<Utc>,
    pub status: AttemptStatus,
    pub details: Option<String>,
}
