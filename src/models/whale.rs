use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How a wallet entered the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhaleSource {
    /// Discovered from a large trade on the feed.
    Anomaly,
    /// Pre-vetted wallet from configuration.
    Elite,
    Manual,
}

impl fmt::Display for WhaleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhaleSource::Anomaly => f.write_str("anomaly"),
            WhaleSource::Elite => f.write_str("elite"),
            WhaleSource::Manual => f.write_str("manual"),
        }
    }
}

/// Per-wallet activity state held by the whale ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleRecord {
    pub address: String,
    pub first_seen: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub markets_traded: BTreeSet<String>,
    #[serde(default)]
    pub trade_count: u64,
    #[serde(default)]
    pub total_value: Decimal,
    pub confidence: f64,
    /// Confidence as of `last_activity`; decay is always measured from here.
    #[serde(default)]
    pub anchor_confidence: f64,
    pub active: bool,
    pub source: WhaleSource,
    #[serde(default)]
    pub win_rate: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
}
