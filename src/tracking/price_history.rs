use std::collections::VecDeque;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;

pub const DEFAULT_CAPACITY: usize = 1_000;
pub const DEFAULT_TOLERANCE_SECS: i64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

/// Time-ordered samples for one market (immutable snapshot for ArcSwap).
#[derive(Debug, Clone, Default)]
struct MarketSeries {
    samples: VecDeque<PriceSample>,
}

impl MarketSeries {
    fn with_sample(&self, sample: PriceSample, capacity: usize) -> Self {
        let mut samples = self.samples.clone();
        let pos = samples.partition_point(|s| s.timestamp <= sample.timestamp);
        samples.insert(pos, sample);
        while samples.len() > capacity {
            samples.pop_front();
        }
        Self { samples }
    }

    fn nearest(&self, target: DateTime<Utc>, tolerance: Duration) -> Option<PriceSample> {
        let pos = self.samples.partition_point(|s| s.timestamp < target);
        let before = pos.checked_sub(1).and_then(|i| self.samples.get(i));
        let after = self.samples.get(pos);

        let best = match (before, after) {
            (Some(b), Some(a)) => {
                if target - b.timestamp <= a.timestamp - target {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        let distance = if best.timestamp >= target {
            best.timestamp - target
        } else {
            target - best.timestamp
        };
        (distance <= tolerance).then_some(*best)
    }
}

/// Bounded per-market price cache fed by the ingestion path.
///
/// Writers publish a new snapshot per sample; readers load the current
/// snapshot without taking a lock, so lookups never block ingestion.
#[derive(Clone)]
pub struct PriceHistory {
    markets: Arc<DashMap<String, Arc<ArcSwap<MarketSeries>>>>,
    capacity: usize,
    tolerance: Duration,
}

impl Default for PriceHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Duration::seconds(DEFAULT_TOLERANCE_SECS))
    }
}

impl PriceHistory {
    pub fn new(capacity: usize, tolerance: Duration) -> Self {
        Self {
            markets: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            tolerance,
        }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    fn series(&self, market_id: &str) -> Option<Arc<ArcSwap<MarketSeries>>> {
        self.markets.get(market_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn record_sample(&self, market_id: &str, timestamp: DateTime<Utc>, price: Decimal) {
        let series = match self.series(market_id) {
            Some(series) => series,
            None => Arc::clone(
                self.markets
                    .entry(market_id.to_string())
                    .or_insert_with(|| Arc::new(ArcSwap::from_pointee(MarketSeries::default())))
                    .value(),
            ),
        };

        let sample = PriceSample { timestamp, price };
        let capacity = self.capacity;
        series.rcu(|current| current.with_sample(sample, capacity));
    }

    /// Sample closest to `target` within the configured tolerance.
    pub fn lookup(&self, market_id: &str, target: DateTime<Utc>) -> Option<PriceSample> {
        self.lookup_within(market_id, target, self.tolerance)
    }

    pub fn lookup_within(
        &self,
        market_id: &str,
        target: DateTime<Utc>,
        tolerance: Duration,
    ) -> Option<PriceSample> {
        self.series(market_id)?.load().nearest(target, tolerance)
    }

    pub fn latest(&self, market_id: &str) -> Option<PriceSample> {
        self.series(market_id)?.load().samples.back().copied()
    }

    pub fn len(&self, market_id: &str) -> usize {
        self.series(market_id).map(|s| s.load().samples.len()).unwrap_or(0)
    }
}
