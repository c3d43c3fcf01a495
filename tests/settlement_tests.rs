mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use common::{FakeMetadata, FakeOracle};
use polywatch::db::{OpenOutcome, TradeStore};
use polywatch::execution::{CopySimulator, SimulatorConfig, TieredSlippage};
use polywatch::models::{AttemptStatus, ResolutionSource, ResolutionVerdict, TradeStatus};
use polywatch::resolution::overrides::OverrideEntry;
use polywatch::resolution::uma::{json_ancillary_data, AncillaryEncoding};
use polywatch::resolution::{OverrideTable, ResolutionOracle};
use polywatch::services::{SettlementLoop, SettlementSummary};
use polywatch::tracking::PriceHistory;

const MARKET: &str = "0xc0ffee01";
const FULL_SCALE: &str = "1000000000000000000";

fn live_market() -> serde_json::Value {
    json!({
        "conditionId": MARKET,
        "question": "Will the test pass?",
        "questionID": "0x1234",
        "endDate": "2030-01-01T00:00:00Z",
        "closed": false,
        "outcomes": "[\"Yes\", \"No\"]",
        "outcomePrices": "[\"0.55\", \"0.45\"]"
    })
}

async fn open_trade(store: &TradeStore, market: &str, outcome_index: i64) -> i64 {
    let signal = common::sample_signal("0xWHALE_SETTLE_01", market, outcome_index);
    match store
        .open_trade(&signal, Decimal::from(50), Decimal::new(40, 2), outcome_index)
        .await
        .expect("open_trade should succeed")
    {
        OpenOutcome::Opened { trade_id, .. } => trade_id,
        other => panic!("expected a new trade, got {other:?}"),
    }
}

fn settlement(store: &TradeStore, oracle: ResolutionOracle) -> SettlementLoop {
    SettlementLoop::new(store.clone(), oracle, None, 100)
}

#[tokio::test]
async fn test_unresolved_market_stays_open_and_is_logged() {
    let store = common::setup_test_store().await;
    let id = open_trade(&store, MARKET, 0).await;

    let oracle = ResolutionOracle::new(
        Some(Arc::new(FakeOracle::unsettled())),
        Arc::new(FakeMetadata::with_market(MARKET, live_market())),
        OverrideTable::default(),
    );
    let summary = settlement(&store, oracle).settle_once().await;

    assert_eq!(
        summary,
        SettlementSummary {
            checked: 1,
            not_resolved: 1,
            ..SettlementSummary::default()
        }
    );
    let trade = store.get_trade(id).await.unwrap().unwrap();
    assert_eq!(trade.status, TradeStatus::Open);

    let attempts = store.attempts_for(id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::NotResolved);
}

#[tokio::test]
async fn test_oracle_settlement_pays_winning_trade() {
    let store = common::setup_test_store().await;
    let id = open_trade(&store, MARKET, 0).await;

    let oracle = ResolutionOracle::new(
        Some(Arc::new(FakeOracle::settled_with(AncillaryEncoding::JsonQuestion, FULL_SCALE))),
        Arc::new(FakeMetadata::with_market(MARKET, live_market())),
        OverrideTable::default(),
    );
    let summary = settlement(&store, oracle).settle_once().await;
    assert_eq!(summary.resolved, 1);

    let trade = store.get_trade(id).await.unwrap().unwrap();
    assert_eq!(trade.status, TradeStatus::Resolved);
    assert_eq!(trade.won, Some(true));
    assert_eq!(trade.pnl, Some(Decimal::from(75)));
    assert_eq!(trade.resolved_outcome_index, Some(0));

    let attempts = store.attempts_for(id).await.unwrap();
    assert_eq!(attempts.last().map(|a| a.status), Some(AttemptStatus::Resolved));

    // Nothing left to settle on the next cycle.
    let oracle = ResolutionOracle::new(
        Some(Arc::new(FakeOracle::settled_with(AncillaryEncoding::JsonQuestion, FULL_SCALE))),
        Arc::new(FakeMetadata::with_market(MARKET, live_market())),
        OverrideTable::default(),
    );
    assert_eq!(settlement(&store, oracle).settle_once().await.checked, 0);
}

#[tokio::test]
async fn test_oracle_settlement_against_trade_loses_stake() {
    let store = common::setup_test_store().await;
    let id = open_trade(&store, MARKET, 0).await;

    let oracle = ResolutionOracle::new(
        Some(Arc::new(FakeOracle::settled_with(AncillaryEncoding::QuestionId, "0"))),
        Arc::new(FakeMetadata::with_market(MARKET, live_market())),
        OverrideTable::default(),
    );
    settlement(&store, oracle).settle_once().await;

    let trade = store.get_trade(id).await.unwrap().unwrap();
    assert_eq!(trade.status, TradeStatus::Resolved);
    assert_eq!(trade.won, Some(false));
    assert_eq!(trade.resolved_outcome_index, Some(1));
    assert_eq!(trade.pnl, Some(Decimal::from(-50)));
}

#[tokio::test]
async fn test_unknown_when_no_source_answers_and_retried_next_cycle() {
    let store = common::setup_test_store().await;
    let id = open_trade(&store, MARKET, 0).await;

    let oracle = ResolutionOracle::new(
        Some(Arc::new(FakeOracle::failing())),
        Arc::new(FakeMetadata::failing()),
        OverrideTable::default(),
    );
    let settle = settlement(&store, oracle);

    assert_eq!(settle.settle_once().await.unknown, 1);
    assert_eq!(settle.settle_once().await.unknown, 1);

    let trade = store.get_trade(id).await.unwrap().unwrap();
    assert_eq!(trade.status, TradeStatus::Open);

    let attempts = store.attempts_for(id).await.unwrap();
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|a| a.status == AttemptStatus::Unknown));
}

#[tokio::test]
async fn test_trade_without_market_id_is_marked_error() {
    let store = common::setup_test_store().await;
    let now = Utc::now();

    // open_trade refuses an empty market id, so write the rows directly.
    let (signal_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO signals (created_at, wallet, wallet_prefix, market_id, outcome_index, side,
                             price, notional, whale_confidence)
        VALUES (?1, '0xlegacy', '0xlegacy', '', 0, 'BUY', '0.4', '5000', 0.7)
        RETURNING id
        "#,
    )
    .bind(now)
    .fetch_one(store.pool())
    .await
    .unwrap();
    let (trade_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO paper_trades (signal_id, opened_at, stake_usd, entry_price, outcome_index, side, market_id)
        VALUES (?1, ?2, '50', '0.4', 0, 'BUY', '')
        RETURNING id
        "#,
    )
    .bind(signal_id)
    .bind(now)
    .fetch_one(store.pool())
    .await
    .unwrap();

    let metadata = Arc::new(FakeMetadata::default());
    let oracle = ResolutionOracle::new(None, metadata.clone(), OverrideTable::default());
    let summary = settlement(&store, oracle).settle_once().await;

    assert_eq!(summary.errored, 1);
    assert_eq!(metadata.calls.load(Ordering::SeqCst), 0);

    let trade = store.get_trade(trade_id).await.unwrap().unwrap();
    assert_eq!(trade.status, TradeStatus::Error);
    assert!(store.list_open(10).await.unwrap().is_empty());

    let attempts = store.attempts_for(trade_id).await.unwrap();
    assert_eq!(attempts[0].status, AttemptStatus::Error);
}

#[tokio::test]
async fn test_override_short_circuits_automated_sources() {
    let store = common::setup_test_store().await;
    let id = open_trade(&store, MARKET, 1).await;

    let chain = Arc::new(FakeOracle::unsettled());
    let metadata = Arc::new(FakeMetadata::with_market(MARKET, live_market()));
    let overrides = OverrideTable::new(vec![(
        "0xC0FFEE".to_string(),
        OverrideEntry {
            winning_outcome_index: 1,
            note: Some("settled off-chain".into()),
        },
    )]);
    let oracle = ResolutionOracle::new(Some(chain.clone()), metadata.clone(), overrides);

    match oracle.check_market(MARKET, None).await {
        ResolutionVerdict::Resolved(res) => assert_eq!(res.source, ResolutionSource::Override),
        other => panic!("expected override, got {other:?}"),
    }
    assert!(chain.queried().is_empty());
    assert_eq!(metadata.calls.load(Ordering::SeqCst), 0);

    settlement(&store, oracle).settle_once().await;
    let trade = store.get_trade(id).await.unwrap().unwrap();
    assert_eq!(trade.won, Some(true));
    assert_eq!(trade.pnl, Some(Decimal::from(75)));
}

#[tokio::test]
async fn test_metadata_fallback_resolves_closed_market() {
    let chain = Arc::new(FakeOracle::unsettled());
    let metadata = Arc::new(FakeMetadata::with_market(
        MARKET,
        json!({
            "conditionId": MARKET,
            "question": "Will the test pass?",
            "closed": true,
            "outcomes": "[\"Yes\", \"No\"]",
            "outcomePrices": "[\"0\", \"1\"]"
        }),
    ));
    let oracle = ResolutionOracle::new(Some(chain), metadata, OverrideTable::default());

    match oracle.check_market(MARKET, None).await {
        ResolutionVerdict::Resolved(res) => {
            assert_eq!(res.winning_outcome_index, 1);
            assert_eq!(res.source, ResolutionSource::GammaApi);
        }
        other => panic!("expected gamma resolution, got {other:?}"),
    }
}

#[tokio::test]
async fn test_lookup_order_json_then_question_id_then_condition_id() {
    let chain = Arc::new(FakeOracle::unsettled());
    let oracle = ResolutionOracle::new(
        Some(chain.clone()),
        Arc::new(FakeMetadata::with_market(MARKET, live_market())),
        OverrideTable::default(),
    );

    let verdict = oracle.check_market(MARKET, None).await;
    assert!(matches!(verdict, ResolutionVerdict::NotResolved(_)));
    assert_eq!(
        chain.queried(),
        vec![
            AncillaryEncoding::JsonQuestion,
            AncillaryEncoding::QuestionId,
            AncillaryEncoding::ConditionId
        ]
    );
}

#[tokio::test]
async fn test_misrouted_payload_is_not_trusted() {
    // Claims to be resolved, but for a different market.
    let metadata = Arc::new(FakeMetadata::with_market(
        MARKET,
        json!({
            "conditionId": "0xdeadbeef",
            "question": "Will Biden win the 2020 election?",
            "endDate": "2020-11-03",
            "resolved": true,
            "resolvedOutcomeIndex": 0,
            "outcomes": ["Yes", "No"]
        }),
    ));
    let oracle = ResolutionOracle::new(
        Some(Arc::new(FakeOracle::failing())),
        metadata,
        OverrideTable::default(),
    );

    let verdict = oracle.check_market(MARKET, Some("Will the test pass?")).await;
    assert!(matches!(verdict, ResolutionVerdict::NotResolved(_)));
}

#[tokio::test]
async fn test_out_of_range_oracle_value_is_not_acted_on() {
    let chain = Arc::new(FakeOracle::settled_with(
        AncillaryEncoding::JsonQuestion,
        "2000000000000000000",
    ));
    let oracle = ResolutionOracle::new(
        Some(chain),
        Arc::new(FakeMetadata::with_market(MARKET, live_market())),
        OverrideTable::default(),
    );

    let verdict = oracle.check_market(MARKET, None).await;
    assert!(matches!(verdict, ResolutionVerdict::NotResolved(_)));
}

#[tokio::test]
async fn test_stored_question_keys_the_oracle_request() {
    let chain = Arc::new(FakeOracle::unsettled());
    let mut payload = live_market();
    payload["question"] = json!("Reworded title from metadata?");
    let oracle = ResolutionOracle::new(
        Some(chain.clone()),
        Arc::new(FakeMetadata::with_market(MARKET, payload)),
        OverrideTable::default(),
    );

    oracle.check_market(MARKET, Some("Will the test pass?")).await;
    let keys = chain.queried_keys();
    assert_eq!(keys[0].encoding, AncillaryEncoding::JsonQuestion);
    assert_eq!(keys[0].ancillary_data, json_ancillary_data("Will the test pass?"));

    // Nothing stored: the metadata title is used.
    let chain = Arc::new(FakeOracle::unsettled());
    let oracle = ResolutionOracle::new(
        Some(chain.clone()),
        Arc::new(FakeMetadata::with_market(MARKET, live_market())),
        OverrideTable::default(),
    );
    oracle.check_market(MARKET, None).await;
    assert_eq!(chain.queried_keys()[0].ancillary_data, json_ancillary_data("Will the test pass?"));
}

#[tokio::test]
async fn test_settlement_prices_copy_simulations_on_the_market() {
    let store = common::setup_test_store().await;
    let prices = PriceHistory::default();
    let simulator = CopySimulator::new(
        store.clone(),
        prices.clone(),
        Arc::new(TieredSlippage::default()),
        SimulatorConfig::default(),
    );

    let det = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    prices.record_sample(MARKET, det + Duration::seconds(50), Decimal::new(41, 2));
    prices.record_sample(MARKET, det + Duration::seconds(310), Decimal::new(39, 2));

    let mut ids = Vec::new();
    for (wallet, outcome_index) in [
        ("0xWHALE_SIM_YES_01", Some(0)),
        ("0xWHALE_SIM_NO_001", Some(1)),
        ("0xWHALE_SIM_BLIND1", None),
    ] {
        let mut event = common::sample_event(wallet, MARKET, 5_000, det);
        event.outcome_index = outcome_index;
        let created = simulator.create_simulation(&event).await.unwrap();
        for delay in [60u64, 180, 300] {
            simulator
                .record_delay(created.id, delay, det + Duration::seconds(delay as i64))
                .await
                .unwrap();
        }
        ids.push(created.id);
    }
    let elsewhere = simulator
        .create_simulation(&common::sample_event("0xWHALE_SIM_ELSE1", "0xother", 5_000, det))
        .await
        .unwrap();

    open_trade(&store, MARKET, 0).await;
    let oracle = ResolutionOracle::new(
        Some(Arc::new(FakeOracle::settled_with(AncillaryEncoding::JsonQuestion, FULL_SCALE))),
        Arc::new(FakeMetadata::with_market(MARKET, live_market())),
        OverrideTable::default(),
    );
    assert_eq!(settlement(&store, oracle).settle_once().await.resolved, 1);

    // Entries 0.41041, 0.4004 and 0.39039 against a YES that settled at 1.
    let yes = store.get_simulation(ids[0]).await.unwrap().unwrap();
    let summary = yes.summary.expect("winning side summarised");
    assert_eq!(summary.settlement_price, Decimal::ONE);
    assert_eq!(summary.best_delay, 300);
    assert!(summary.profitable);
    assert_eq!(summary.avg_pnl, Decimal::new(5996, 4));
    let pnls: Vec<Option<Decimal>> = yes.results.iter().map(|r| r.pnl).collect();
    assert_eq!(
        pnls,
        vec![
            Some(Decimal::new(58959, 5)),
            Some(Decimal::new(5996, 4)),
            Some(Decimal::new(60961, 5)),
        ]
    );

    let no = store.get_simulation(ids[1]).await.unwrap().unwrap();
    let summary = no.summary.expect("losing side summarised");
    assert_eq!(summary.settlement_price, Decimal::ZERO);
    assert_eq!(summary.best_delay, 300);
    assert!(!summary.profitable);
    assert_eq!(summary.avg_pnl, Decimal::new(-4004, 4));

    // No traded outcome, nothing to price against.
    let blind = store.get_simulation(ids[2]).await.unwrap().unwrap();
    assert!(blind.summary.is_none());
    assert!(blind.results.iter().all(|r| r.pnl.is_none()));

    let other = store.get_simulation(elsewhere.id).await.unwrap().unwrap();
    assert!(other.summary.is_none());
}
