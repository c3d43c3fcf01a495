use std::sync::Arc;

use chrono::Utc;

use polywatch::config::AppConfig;
use polywatch::db::{self, TradeStore};
use polywatch::execution::{CopyPolicy, CopySimulator, SimulatorConfig, TieredSlippage};
use polywatch::ingestion::{run_ws_listener, Pipeline};
use polywatch::models::{DetectionEvent, WhaleSource};
use polywatch::polymarket::{GammaClient, MarketMetadataSource};
use polywatch::resolution::{OracleReader, OverrideTable, ResolutionOracle, UmaOracleClient};
use polywatch::services::maintenance::run_maintenance_loop;
use polywatch::services::{Notifier, SettlementLoop};
use polywatch::tracking::{LedgerConfig, LedgerStorage, PriceHistory, WhaleLedger};
use polywatch::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env()?;

    if let Some(addr) = &config.metrics_addr {
        polywatch::metrics::init_metrics(addr)?;
    }

    tracing::info!("Opening trade store...");
    let pool = db::init_pool(&config.database_url).await?;
    let store = TradeStore::new(pool);
    tracing::info!("Trade store ready");

    let ledger = WhaleLedger::open(
        LedgerStorage::File(config.ledger_path.clone()),
        LedgerConfig {
            activity_threshold: config.activity_threshold(),
            ..LedgerConfig::default()
        },
    )
    .await?;

    let now = Utc::now();
    for wallet in &config.elite_wallets {
        ledger.register(wallet, WhaleSource::Elite, None, now).await?;
    }

    let prices = PriceHistory::new(
        config.price_history_capacity,
        chrono::Duration::seconds(config.price_lookup_tolerance_secs),
    );
    let simulator = CopySimulator::new(
        store.clone(),
        prices.clone(),
        Arc::new(TieredSlippage::default()),
        SimulatorConfig {
            delays_secs: config.simulation_delays_secs.clone(),
        },
    );
    let state = AppState::new(ledger.clone(), prices.clone(), simulator.clone(), store.clone());

    let notifier = match (&config.telegram_bot_token, &config.telegram_chat_id) {
        (Some(token), Some(chat)) if config.has_telegram() => Some(Notifier::new(token.clone(), chat.clone())),
        _ => {
            tracing::info!("Telegram notifications disabled");
            None
        }
    };

    let gamma: Arc<dyn MarketMetadataSource> = Arc::new(GammaClient::new(&config.gamma_api_url));

    // --- Settlement: UMA oracle → Gamma fallback → trade store ---
    let chain: Option<Arc<dyn OracleReader>> = match UmaOracleClient::new(
        &config.polygon_rpc_url,
        &config.uma_oracle_address,
        &config.uma_requester_address,
    ) {
        Ok(client) => Some(Arc::new(client) as Arc<dyn OracleReader>),
        Err(e) => {
            tracing::warn!(error = %e, "UMA oracle unavailable, settling from Gamma only");
            None
        }
    };
    let overrides = match &config.resolution_overrides_path {
        Some(path) => OverrideTable::load(path).await,
        None => OverrideTable::default(),
    };
    let oracle = ResolutionOracle::new(chain, Arc::clone(&gamma), overrides);
    let settlement = SettlementLoop::new(store.clone(), oracle, notifier.clone(), config.settlement_batch_limit);
    let settlement_every = config.settlement_interval();
    tokio::spawn(async move {
        settlement.run(settlement_every).await;
    });
    tracing::info!(interval_secs = config.settlement_interval_secs, "Settlement loop spawned");

    // --- Ledger maintenance ---
    let maintenance_ledger = ledger.clone();
    let maintenance_every = config.maintenance_interval();
    let prune_below = config.ledger_min_confidence;
    tokio::spawn(async move {
        run_maintenance_loop(maintenance_ledger, maintenance_every, prune_below).await;
    });

    // --- Ingestion: feed → pipeline → store + simulator ---
    let pipeline = Pipeline {
        ledger,
        prices,
        policy: CopyPolicy::new(
            config.elite_wallets.clone(),
            config.elite_min_confidence,
            config.discovered_min_confidence,
            config.whale_min_notional,
        ),
        store,
        simulator,
        metadata: Some(gamma),
        notifier,
        whale_min_notional: config.whale_min_notional,
        paper_stake: config.paper_stake_usd,
    };

    let (ws_tx, ws_rx) = tokio::sync::mpsc::channel::<DetectionEvent>(1000);
    let pipeline_task = tokio::spawn(pipeline.run(ws_rx));

    if config.ws_subscribe_token_ids.is_empty() {
        tracing::warn!("WS_SUBSCRIBE_TOKEN_IDS is empty, trade feed listener will not start");
        drop(ws_tx);
    } else {
        let ws_url = config.polymarket_ws_url.clone();
        let token_ids = config.ws_subscribe_token_ids.clone();
        tracing::info!(token_count = token_ids.len(), "Starting trade feed listener");
        tokio::spawn(run_ws_listener(ws_url, token_ids, ws_tx));
    }

    let active = state.query_active_whales(config.ledger_min_confidence).await?;
    let open = state.get_open_trades(config.settlement_batch_limit).await?;
    tracing::info!(
        active_whales = active.len(),
        open_trades = open.len(),
        stake = %config.paper_stake_usd,
        "polywatch running"
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
        result = pipeline_task => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Pipeline task panicked");
            }
            // Without a feed there is still settlement work to do.
            tokio::signal::ctrl_c().await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
