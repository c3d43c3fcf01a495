use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Override,
    UmaOracle,
    GammaApi,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionSource::Override => f.write_str("override"),
            ResolutionSource::UmaOracle => f.write_str("uma_oracle"),
            ResolutionSource::GammaApi => f.write_str("gamma_api"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub winning_outcome_index: i64,
    /// Settled value of the winning outcome's token, 0..=1.
    pub resolved_price: Decimal,
    pub resolution_time: Option<DateTime<Utc>>,
    pub source: ResolutionSource,
}

/// Answer from the resolution oracle adapter.
///
/// `NotResolved` is the normal case for a live market. `Unknown` means no
/// source could be reached or parsed and the question must be asked again.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionVerdict {
    Resolved(Resolution),
    NotResolved(String),
    Unknown(String),
}

impl ResolutionVerdict {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionVerdict::Resolved(_))
    }
}
