use rust_decimal::Decimal;

/// Estimated cost of entering a position behind a whale.
///
/// Callers only see this trait, so a depth-based model can replace the
/// tiered table without touching the simulator.
pub trait SlippageModel: Send + Sync {
    /// Fractional slippage for a trade of `trade_size` dollars.
    fn slippage_pct(&self, market_id: &str, trade_size: Decimal, reference_price: Decimal) -> Decimal;

    fn execution_price(&self, market_id: &str, trade_size: Decimal, reference_price: Decimal) -> Decimal {
        reference_price * (Decimal::ONE + self.slippage_pct(market_id, trade_size, reference_price))
    }
}

/// One size bucket: trades strictly above `min_size` pay `extra_pct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlippageTier {
    pub min_size: Decimal,
    pub extra_pct: Decimal,
}

/// Base rate plus the surcharge of the largest bucket the trade falls into.
#[derive(Debug, Clone)]
pub struct TieredSlippage {
    pub base_pct: Decimal,
    /// Sorted by `min_size`, largest first.
    tiers: Vec<SlippageTier>,
}

impl TieredSlippage {
    pub fn new(base_pct: Decimal, mut tiers: Vec<SlippageTier>) -> Self {
        tiers.sort_by(|a, b| b.min_size.cmp(&a.min_size));
        Self { base_pct, tiers }
    }
}

impl Default for TieredSlippage {
    /// 0.1% base, +0.1% above $5k, +0.2% above $10k.
    fn default() -> Self {
        Self::new(
            Decimal::new(1, 3),
            vec![
                SlippageTier {
                    min_size: Decimal::from(10_000),
                    extra_pct: Decimal::new(2, 3),
                },
                SlippageTier {
                    min_size: Decimal::from(5_000),
                    extra_pct: Decimal::new(1, 3),
                },
            ],
        )
    }
}

impl SlippageModel for TieredSlippage {
    fn slippage_pct(&self, _market_id: &str, trade_size: Decimal, _reference_price: Decimal) -> Decimal {
        let extra = self
            .tiers
            .iter()
            .find(|t| trade_size > t.min_size)
            .map(|t| t.extra_pct)
            .unwrap_or(Decimal::ZERO);
        self.base_pct + extra
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
