pub mod config;
pub mod db;
pub mod errors;
pub mod execution;
pub mod ingestion;
pub mod metrics;
pub mod models;
pub mod polymarket;
pub mod resolution;
pub mod services;
pub mod tracking;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::TradeStore;
use crate::errors::AppResult;
use crate::execution::CopySimulator;
use crate::models::{DetectionEvent, PaperTrade};
use crate::tracking::{PriceHistory, WhaleLedger};

/// Handles to the shared components, cheap to clone into tasks.
#[derive(Clone)]
pub struct AppState {
    pub ledger: WhaleLedger,
    pub prices: PriceHistory,
    pub simulator: CopySimulator,
    pub store: TradeStore,
}

impl AppState {
    pub fn new(ledger: WhaleLedger, prices: PriceHistory, simulator: CopySimulator, store: TradeStore) -> Self {
        Self {
            ledger,
            prices,
            simulator,
            store,
        }
    }

    /// Active wallets at or above `min_confidence`, most confident first.
    pub async fn query_active_whales(&self, min_confidence: f64) -> AppResult<Vec<String>> {
        self.ledger.query_active(min_confidence, Utc::now()).await
    }

    pub async fn start_simulation(&self, detected: &DetectionEvent) -> AppResult<Uuid> {
        self.simulator.start_simulation(detected).await
    }

    pub async fn get_open_trades(&self, limit: i64) -> AppResult<Vec<PaperTrade>> {
        self.store.list_open(limit).await
    }

    pub async fn resolve_trade(
        &self,
        id: i64,
        winning_outcome_index: i64,
        won: bool,
        resolved_price: Decimal,
    ) -> AppResult<bool> {
        self.store
            .resolve_trade(id, winning_outcome_index, won, resolved_price)
            .await
    }
}
