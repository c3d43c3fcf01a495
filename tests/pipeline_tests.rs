mod common;

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;

use common::FakeMetadata;
use polywatch::db::TradeStore;
use polywatch::execution::{CopyPolicy, CopySimulator, SimulatorConfig, TieredSlippage};
use polywatch::ingestion::{Pipeline, PipelineOutcome};
use polywatch::models::{DetectionEvent, WhaleSource};
use polywatch::polymarket::MarketMetadataSource;
use polywatch::tracking::{LedgerConfig, PriceHistory, WhaleLedger};

const ELITE: &str = "0xELITE_WALLET_0001";

fn pipeline(store: &TradeStore, metadata: Option<Arc<dyn MarketMetadataSource>>) -> Pipeline {
    let prices = PriceHistory::default();
    let simulator = CopySimulator::new(
        store.clone(),
        prices.clone(),
        Arc::new(TieredSlippage::default()),
        // Far enough out that no timer fires while a test runs.
        SimulatorConfig {
            delays_secs: vec![3_600],
        },
    );
    Pipeline {
        ledger: WhaleLedger::in_memory(LedgerConfig::default()),
        prices,
        policy: CopyPolicy::new(vec![ELITE.to_string()], 0.3, 0.6, Decimal::from(1_000)),
        store: store.clone(),
        simulator,
        metadata,
        notifier: None,
        whale_min_notional: Decimal::from(1_000),
        paper_stake: Decimal::from(50),
    }
}

fn event(wallet: &str, market: &str, notional: i64) -> DetectionEvent {
    common::sample_event(wallet, market, notional, Utc::now())
}

#[tokio::test]
async fn test_small_trade_only_feeds_price_history() {
    let store = common::setup_test_store().await;
    let p = pipeline(&store, None);

    let outcome = p.process_detection(&event(ELITE, "0xmarket_small", 200)).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Observed);

    assert_eq!(p.prices.len("0xmarket_small"), 1);
    assert!(p.ledger.get(ELITE).await.is_none());
    assert!(store.list_open(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_elite_whale_trade_is_copied_once() {
    let store = common::setup_test_store().await;
    let p = pipeline(&store, None);
    p.ledger.register(ELITE, WhaleSource::Elite, None, Utc::now()).await.unwrap();

    let first = p.process_detection(&event(ELITE, "0xmarket_copy", 5_000)).await.unwrap();
    let PipelineOutcome::Copied { trade_id, simulation_id } = first else {
        panic!("expected a copied trade, got {first:?}");
    };

    let open = store.list_open(10).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, trade_id);
    assert_eq!(open[0].stake, Decimal::from(50));
    assert_eq!(open[0].entry_price, Decimal::new(40, 2));

    let simulation_id = simulation_id.expect("simulation started");
    let sim = p.simulator.get_simulation(simulation_id).await.unwrap().expect("simulation stored");
    assert_eq!(sim.market_id, "0xmarket_copy");
    assert_eq!(sim.outcome_index, Some(0));
    assert!(sim.results.is_empty());

    let record = p.ledger.get(ELITE).await.expect("whale in ledger");
    assert_eq!(record.trade_count, 1);

    // The same whale on the same market and outcome is one signal.
    let second = p.process_detection(&event(ELITE, "0xmarket_copy", 8_000)).await.unwrap();
    assert_eq!(second, PipelineOutcome::Duplicate);
    assert_eq!(store.list_open(10).await.unwrap().len(), 1);
    assert_eq!(p.ledger.get(ELITE).await.unwrap().trade_count, 2);
}

#[tokio::test]
async fn test_new_wallet_below_discovered_bar_is_skipped() {
    let store = common::setup_test_store().await;
    let p = pipeline(&store, None);

    let outcome = p
        .process_detection(&event("0xFRESH_WALLET_0001", "0xmarket_fresh", 5_000))
        .await
        .unwrap();
    assert!(matches!(outcome, PipelineOutcome::Skipped(_)));

    // Still tracked, just not trusted yet.
    let record = p.ledger.get("0xfresh_wallet_0001").await.expect("whale in ledger");
    assert_eq!(record.source, WhaleSource::Anomaly);
    assert!(store.list_open(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_outcome_index_is_filled_from_metadata() {
    let store = common::setup_test_store().await;
    let metadata: Arc<dyn MarketMetadataSource> = Arc::new(FakeMetadata::with_market(
        "0xmarket_meta",
        json!({
            "conditionId": "0xmarket_meta",
            "question": "Will metadata help?",
            "clobTokenIds": "[\"token_other\", \"token_test_001\"]"
        }),
    ));
    let p = pipeline(&store, Some(metadata));
    p.ledger.register(ELITE, WhaleSource::Elite, None, Utc::now()).await.unwrap();

    let mut e = event(ELITE, "0xmarket_meta", 5_000);
    e.outcome_index = None;
    e.market_question = None;

    let outcome = p.process_detection(&e).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Copied { .. }));

    let open = store.list_open(10).await.unwrap();
    assert_eq!(open[0].outcome_index, 1);
    assert_eq!(open[0].market_question.as_deref(), Some("Will metadata help?"));
}

#[tokio::test]
async fn test_unknown_outcome_without_metadata_is_skipped() {
    let store = common::setup_test_store().await;
    let p = pipeline(&store, None);
    p.ledger.register(ELITE, WhaleSource::Elite, None, Utc::now()).await.unwrap();

    let mut e = event(ELITE, "0xmarket_blind", 5_000);
    e.outcome_index = None;

    let outcome = p.process_detection(&e).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Skipped(_)));
    assert!(store.list_open(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_trade_stays_open_when_simulation_cannot_be_stored() {
    let store = common::setup_test_store().await;
    let p = pipeline(&store, None);
    p.ledger.register(ELITE, WhaleSource::Elite, None, Utc::now()).await.unwrap();

    sqlx::query("DROP TABLE simulations")
        .execute(store.pool())
        .await
        .unwrap();

    let outcome = p.process_detection(&event(ELITE, "0xmarket_nosim", 5_000)).await.unwrap();
    let PipelineOutcome::Copied { trade_id, simulation_id } = outcome else {
        panic!("expected a copied trade, got {outcome:?}");
    };
    assert!(simulation_id.is_none());

    let open = store.list_open(10).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, trade_id);
}
