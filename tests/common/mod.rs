use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy::primitives::I256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use polywatch::db::{self, TradeStore};
use polywatch::models::{DetectionEvent, NewSignal, Side};
use polywatch::polymarket::gamma_client::{GammaClientError, GammaMarket, MarketMetadataSource};
use polywatch::resolution::uma::{AncillaryEncoding, OracleRequest, RequestKey};
use polywatch::resolution::{OracleError, OracleReader};

/// Fresh in-memory store with migrations applied.
#[allow(dead_code)]
pub async fn setup_test_store() -> TradeStore {
    let pool = db::init_memory_pool()
        .await
        .expect("Failed to open in-memory database");
    TradeStore::new(pool)
}

#[allow(dead_code)]
pub fn sample_signal(wallet: &str, market_id: &str, outcome_index: i64) -> NewSignal {
    NewSignal {
        wallet: wallet.to_lowercase(),
        market_id: market_id.into(),
        asset_id: Some("token_test_001".into()),
        outcome_index,
        side: Side::Buy,
        price: Decimal::new(40, 2),
        notional: Decimal::from(5_000),
        whale_confidence: 0.65,
        tx_ref: Some("0xtx".into()),
        market_question: Some("Will the test pass?".into()),
        detected_at: Utc::now(),
    }
}

#[allow(dead_code)]
pub fn sample_event(wallet: &str, market_id: &str, notional: i64, at: DateTime<Utc>) -> DetectionEvent {
    let price = Decimal::new(40, 2);
    DetectionEvent {
        wallet: wallet.into(),
        market_id: market_id.into(),
        asset_id: "token_test_001".into(),
        side: Side::Buy,
        outcome_index: Some(0),
        size: Decimal::from(notional) / price,
        price,
        notional: Decimal::from(notional),
        timestamp: at,
        tx_ref: None,
        market_question: Some("Will the test pass?".into()),
    }
}

/// Metadata source answering from a fixed table. `fail` makes every call error.
#[derive(Default)]
#[allow(dead_code)]
pub struct FakeMetadata {
    pub markets: HashMap<String, GammaMarket>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeMetadata {
    pub fn with_market(condition_id: &str, payload: serde_json::Value) -> Self {
        let market: GammaMarket = serde_json::from_value(payload).expect("valid market payload");
        let mut markets = HashMap::new();
        markets.insert(condition_id.to_string(), market);
        Self {
            markets,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MarketMetadataSource for FakeMetadata {
    async fn fetch_market(&self, condition_id: &str) -> Result<Option<GammaMarket>, GammaClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GammaClientError::Unexpected("metadata offline".into()));
        }
        Ok(self.markets.get(condition_id).cloned())
    }
}

/// On-chain reader with a scripted answer per ancillary encoding.
#[derive(Default)]
#[allow(dead_code)]
pub struct FakeOracle {
    pub settled: HashMap<AncillaryEncoding, OracleRequest>,
    pub fail: bool,
    pub lookups: Mutex<Vec<RequestKey>>,
}

#[allow(dead_code)]
impl FakeOracle {
    pub fn settled_with(encoding: AncillaryEncoding, resolved_price: &str) -> Self {
        let mut settled = HashMap::new();
        settled.insert(
            encoding,
            OracleRequest {
                settled: true,
                resolved_price: resolved_price.parse::<I256>().expect("valid int256"),
                expiration_time: 1_700_000_000,
            },
        );
        Self {
            settled,
            ..Self::default()
        }
    }

    pub fn unsettled() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn queried(&self) -> Vec<AncillaryEncoding> {
        self.lookups.lock().expect("lookup log").iter().map(|k| k.encoding).collect()
    }

    pub fn queried_keys(&self) -> Vec<RequestKey> {
        self.lookups.lock().expect("lookup log").clone()
    }
}

#[async_trait]
impl OracleReader for FakeOracle {
    async fn has_price(&self, key: &RequestKey) -> Result<bool, OracleError> {
        self.lookups.lock().expect("lookup log").push(key.clone());
        if self.fail {
            return Err(OracleError::Rpc("connection refused".into()));
        }
        Ok(self.settled.contains_key(&key.encoding))
    }

    async fn get_request(&self, key: &RequestKey) -> Result<OracleRequest, OracleError> {
        if self.fail {
            return Err(OracleError::Rpc("connection refused".into()));
        }
        self.settled
            .get(&key.encoding)
            .cloned()
            .ok_or_else(|| OracleError::Rpc("no such request".into()))
    }
}
