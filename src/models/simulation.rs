use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    Pending,
    Completed,
}

impl SimulationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationStatus::Pending => "pending",
            SimulationStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SimulationStatus::Pending),
            "completed" => Some(SimulationStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a delayed entry price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    /// A recorded market sample within tolerance of the fire time.
    Actual,
    /// No sample was close enough; the detection price was reused.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayResult {
    pub delay_seconds: u64,
    pub fire_time: DateTime<Utc>,
    pub sampled_price: Decimal,
    pub price_source: PriceSource,
    pub slippage_pct: Decimal,
    pub simulated_entry_price: Decimal,
    /// Per-share profit of this entry once the market has resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl_pct: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DelayResult {
    pub fn is_resolved(&self) -> bool {
        self.pnl.is_some()
    }
}

/// Outcome of a simulation after its market resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    /// Delay whose entry would have made the most.
    pub best_delay: u64,
    /// True if any delayed entry would have made money.
    pub profitable: bool,
    pub avg_pnl: Decimal,
    /// Settled value of the outcome the whale bought.
    pub settlement_price: Decimal,
    pub resolved_at: DateTime<Utc>,
}

/// What copying a whale trade would have cost after each configured delay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    pub id: Uuid,
    pub whale_address: String,
    pub market_id: String,
    pub detection_time: DateTime<Utc>,
    pub detection_price: Decimal,
    /// Dollar notional of the detected trade.
    pub detection_size: Decimal,
    /// Outcome the whale traded, when the feed or metadata said.
    pub outcome_index: Option<i64>,
    pub scheduled_delays: Vec<u64>,
    pub results: Vec<DelayResult>,
    pub status: SimulationStatus,
    pub summary: Option<SimulationSummary>,
}

impl Simulation {
    pub fn is_complete(&self) -> bool {
        self.results.len() >= self.scheduled_delays.len()
    }

    pub fn has_result_for(&self, delay_seconds: u64) -> bool {
        self.results.iter().any(|r| r.delay_seconds == delay_seconds)
    }

    /// Price every unresolved entry against `settlement_price` (the settled
    /// value of the traded outcome) and recompute the summary. Entries that
    /// were already priced keep their numbers. Returns false when there was
    /// nothing to price.
    pub fn resolve(&mut self, settlement_price: Decimal, at: DateTime<Utc>) -> bool {
        let mut changed = false;
        for result in self.results.iter_mut().filter(|r| !r.is_resolved()) {
            let entry = result.simulated_entry_price;
            let pnl = settlement_price - entry;
            let pnl_pct = if entry > Decimal::ZERO {
                (pnl / entry * Decimal::ONE_HUNDRED).round_dp(6)
            } else {
                Decimal::ZERO
            };
            result.pnl = Some(pnl);
            result.pnl_pct = Some(pnl_pct);
            result.resolved_at = Some(at);
            changed = true;
        }

        if let Some(summary) = self.summarize(settlement_price, at) {
            changed |= self.summary.as_ref() != Some(&summary);
            self.summary = Some(summary);
        }
        changed
    }

    fn summarize(&self, settlement_price: Decimal, at: DateTime<Utc>) -> Option<SimulationSummary> {
        let priced: Vec<(u64, Decimal)> = self
            .results
            .iter()
            .filter_map(|r| r.pnl.map(|pnl| (r.delay_seconds, pnl)))
            .collect();
        let (mut best_delay, mut best_pnl) = *priced.first()?;
        for &(delay, pnl) in &priced[1..] {
            if pnl > best_pnl {
                best_delay = delay;
                best_pnl = pnl;
            }
        }
        let total: Decimal = priced.iter().map(|(_, pnl)| *pnl).sum();

        Some(SimulationSummary {
            best_delay,
            profitable: priced.iter().any(|(_, pnl)| *pnl > Decimal::ZERO),
            avg_pnl: (total / Decimal::from(priced.len())).round_dp(6),
            settlement_price,
            resolved_at: self
                .summary
                .as_ref()
                .map_or(at, |s| s.resolved_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(delay: u64, entry: Decimal) -> DelayResult {
        DelayResult {
            delay_seconds: delay,
            fire_time: Utc::now(),
            sampled_price: entry,
            price_source: PriceSource::Actual,
            slippage_pct: Decimal::ZERO,
            simulated_entry_price: entry,
            pnl: None,
            pnl_pct: None,
            resolved_at: None,
        }
    }

    fn simulation(results: Vec<DelayResult>) -> Simulation {
        Simulation {
            id: Uuid::new_v4(),
            whale_address: "0xwhale".into(),
            market_id: "0xmarket".into(),
            detection_time: Utc::now(),
            detection_price: Decimal::new(40, 2),
            detection_size: Decimal::from(5_000),
            outcome_index: Some(0),
            scheduled_delays: results.iter().map(|r| r.delay_seconds).collect(),
            results,
            status: SimulationStatus::Completed,
            summary: None,
        }
    }

    #[test]
    fn winning_market_prices_every_delay() {
        let mut sim = simulation(vec![
            result(60, Decimal::new(41, 2)),
            result(180, Decimal::new(40, 2)),
            result(300, Decimal::new(50, 2)),
        ]);
        assert!(sim.resolve(Decimal::ONE, Utc::now()));

        let pnls: Vec<Decimal> = sim.results.iter().filter_map(|r| r.pnl).collect();
        assert_eq!(pnls, vec![Decimal::new(59, 2), Decimal::new(60, 2), Decimal::new(50, 2)]);
        assert_eq!(sim.results[2].pnl_pct, Some(Decimal::from(100)));

        let summary = sim.summary.expect("summary");
        assert_eq!(summary.best_delay, 180);
        assert!(summary.profitable);
        assert_eq!(summary.avg_pnl, Decimal::new(563333, 6));
    }

    #[test]
    fn losing_market_is_unprofitable_and_first_delay_wins_ties() {
        let mut sim = simulation(vec![result(60, Decimal::new(40, 2)), result(180, Decimal::new(40, 2))]);
        sim.resolve(Decimal::ZERO, Utc::now());

        let summary = sim.summary.expect("summary");
        assert_eq!(summary.best_delay, 60);
        assert!(!summary.profitable);
        assert_eq!(summary.avg_pnl, Decimal::new(-40, 2));
        assert_eq!(sim.results[0].pnl_pct, Some(Decimal::from(-100)));
    }

    #[test]
    fn resolving_twice_changes_nothing() {
        let mut sim = simulation(vec![result(60, Decimal::new(40, 2))]);
        assert!(sim.resolve(Decimal::ONE, Utc::now()));
        let first = sim.clone();
        assert!(!sim.resolve(Decimal::ONE, Utc::now()));
        assert_eq!(sim.results, first.results);
        assert_eq!(sim.summary, first.summary);
    }

    #[test]
    fn no_results_means_no_summary() {
        let mut sim = simulation(Vec::new());
        assert!(!sim.resolve(Decimal::ONE, Utc::now()));
        assert!(sim.summary.is_none());
    }
}
