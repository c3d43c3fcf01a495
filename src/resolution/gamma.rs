//! Reads a winner out of a Gamma market payload.
//!
//! Gamma has carried resolution in several places over time; the checks
//! below run from most to least explicit and stop at the first that
//! produces a definite answer.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::models::{Resolution, ResolutionSource};
use crate::polymarket::gamma_client::{value_as_array, GammaMarket};

/// Result of inspecting one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum GammaVerdict {
    Resolved(Resolution),
    /// Flags say resolved but the winner cannot be pinned down.
    Ambiguous(String),
    NotResolved,
}

fn value_as_index(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn value_is_true(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn outcome_prices(market: &GammaMarket) -> Vec<Option<Decimal>> {
    market
        .outcome_prices
        .as_ref()
        .and_then(value_as_array)
        .map(|items| items.iter().map(value_as_decimal).collect())
        .unwrap_or_default()
}

fn explicit_winner(market: &GammaMarket) -> Option<Value> {
    if let Some(Value::Object(res)) = &market.resolution {
        if let Some(v) = res.get("outcomeIndex").or_else(|| res.get("outcome_index")) {
            return Some(v.clone());
        }
        if let Some(v) = res.get("outcome") {
            return Some(v.clone());
        }
    }
    market.resolved_outcome_index.clone()
}

/// Outcome objects (`outcomes: [{..., "winning": true}]`) marked as the winner.
fn flagged_outcome(market: &GammaMarket) -> Option<i64> {
    let outcomes = market.outcomes.as_ref().and_then(value_as_array)?;
    outcomes
        .iter()
        .position(|o| {
            o.as_object().is_some_and(|obj| {
                value_is_true(obj.get("winning"))
                    || value_is_true(obj.get("winner"))
                    || value_is_true(obj.get("resolved"))
            })
        })
        .map(|i| i as i64)
}

/// Map an explicit winner value to an index: numeric indexes are used as-is,
/// text is matched against outcome labels.
fn resolve_label(market: &GammaMarket, winner: &Value) -> Option<i64> {
    if let Some(idx) = value_as_index(winner) {
        return Some(idx);
    }
    let label = winner.as_str()?.trim();
    let labels = market.outcomes.as_ref().and_then(value_as_array)?;
    labels
        .iter()
        .position(|l| l.as_str().is_some_and(|s| s.trim().eq_ignore_ascii_case(label)))
        .map(|i| i as i64)
}

fn resolved(market: &GammaMarket, index: i64) -> GammaVerdict {
    if let Some(count) = market.outcome_count() {
        if index < 0 || index as usize >= count {
            return GammaVerdict::Ambiguous(format!(
                "winning index {index} out of range for {count} outcomes"
            ));
        }
    } else if index < 0 {
        return GammaVerdict::Ambiguous(format!("negative winning index {index}"));
    }

    let price = outcome_prices(market)
        .get(index as usize)
        .copied()
        .flatten()
        .filter(|p| *p > Decimal::ZERO && *p <= Decimal::ONE)
        .unwrap_or(Decimal::ONE);

    GammaVerdict::Resolved(Resolution {
        winning_outcome_index: index,
        resolved_price: price,
        resolution_time: None,
        source: ResolutionSource::GammaApi,
    })
}

/// Inspect a Gamma payload for a definite winner.
pub fn analyze_market(market: &GammaMarket) -> GammaVerdict {
    let flagged_resolved = market.resolved == Some(true);

    if let Some(winner) = explicit_winner(market) {
        return match resolve_label(market, &winner) {
            Some(idx) => resolved(market, idx),
            None => GammaVerdict::Ambiguous(format!("unreadable winner {winner}")),
        };
    }

    if let Some(idx) = flagged_outcome(market) {
        return resolved(market, idx);
    }

    let prices = outcome_prices(market);
    let settled_at_one: Vec<usize> = prices
        .iter()
        .enumerate()
        .filter(|(_, p)| **p == Some(Decimal::ONE))
        .map(|(i, _)| i)
        .collect();
    if settled_at_one.len() == 1 {
        return resolved(market, settled_at_one[0] as i64);
    }

    if market.closed == Some(true) {
        if let Some(idx) = market.tokens.iter().position(|t| t.winner == Some(true)) {
            return resolved(market, idx as i64);
        }
    }

    if flagged_resolved {
        return GammaVerdict::Ambiguous("marked resolved without a winner".into());
    }
    GammaVerdict::NotResolved
}

/// Detects payloads the API returned for a market other than the one asked
/// for. Gamma has been seen to fall back to a stale default market when a
/// condition id is unknown.
#[derive(Debug, Clone)]
pub struct MisrouteGuard {
    markers: Vec<String>,
    stale_year: String,
}

impl Default for MisrouteGuard {
    fn default() -> Self {
        Self {
            markers: vec!["biden".into(), "coronavirus".into()],
            stale_year: "2020".into(),
        }
    }
}

impl MisrouteGuard {
    /// Reason the payload should be discarded, if any.
    pub fn check(&self, requested_condition_id: &str, market: &GammaMarket) -> Option<String> {
        if let Some(returned) = market.condition_id.as_deref() {
            if !returned.eq_ignore_ascii_case(requested_condition_id) {
                return Some(format!("payload is for {returned}"));
            }
        }

        let title = market.display_title().unwrap_or_default().to_lowercase();
        if let Some(marker) = self.markers.iter().find(|m| title.contains(m.as_str())) {
            return Some(format!("title matches stale marker '{marker}'"));
        }

        if market.end_date_str().is_some_and(|d| d.contains(&self.stale_year)) {
            return Some(format!("end date in {}", self.stale_year));
        }
        None
    }
}
