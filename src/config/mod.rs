use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";
const DEFAULT_GAMMA_URL: &str = "https://gamma-api.polymarket.com";
const DEFAULT_POLYGON_RPC: &str = "https://polygon-rpc.com";

/// UMA OptimisticOracleV2 on Polygon.
pub const DEFAULT_UMA_ORACLE: &str = "0x5953f2538F613E05bAED8A5AeFa8e6622467AD3D";
/// Polymarket UmaCtfAdapter, the requester for binary markets.
pub const DEFAULT_UMA_REQUESTER: &str = "0x2F5e3684cb1F318ec51b00Edba38d79Ac2c0aA9d";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub ledger_path: PathBuf,

    // Feed
    pub polymarket_ws_url: String,
    pub ws_subscribe_token_ids: Vec<String>,

    // Resolution sources
    pub gamma_api_url: String,
    pub polygon_rpc_url: String,
    pub uma_oracle_address: String,
    pub uma_requester_address: String,
    pub resolution_overrides_path: Option<PathBuf>,

    // Ledger
    pub activity_threshold_hours: i64,
    pub ledger_min_confidence: f64,
    pub whale_min_notional: Decimal,

    // Copy policy
    pub elite_wallets: Vec<String>,
    pub elite_min_confidence: f64,
    pub discovered_min_confidence: f64,

    // Simulation
    pub simulation_delays_secs: Vec<u64>,
    pub price_history_capacity: usize,
    pub price_lookup_tolerance_secs: i64,
    pub paper_stake_usd: Decimal,

    // Loops
    pub settlement_interval_secs: u64,
    pub settlement_batch_limit: i64,
    pub maintenance_interval_secs: u64,

    // Notifications
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub notifications_enabled: bool,

    pub metrics_addr: Option<String>,
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_delays(raw: &str) -> Vec<u64> {
    let mut delays: Vec<u64> = raw
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    delays.sort_unstable();
    delays.dedup();
    if delays.is_empty() {
        vec![60, 180, 300]
    } else {
        delays
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/polywatch.sqlite?mode=rwc".into()),
            ledger_path: env::var("LEDGER_PATH")
                .unwrap_or_else(|_| "data/whale_ledger.json".into())
                .into(),

            polymarket_ws_url: env::var("POLYMARKET_WS_URL")
                .unwrap_or_else(|_| DEFAULT_WS_URL.into()),
            ws_subscribe_token_ids: parse_list(
                &env::var("WS_SUBSCRIBE_TOKEN_IDS").unwrap_or_default(),
            ),

            gamma_api_url: env::var("GAMMA_API_URL").unwrap_or_else(|_| DEFAULT_GAMMA_URL.into()),
            polygon_rpc_url: env::var("POLYGON_RPC_URL")
                .unwrap_or_else(|_| DEFAULT_POLYGON_RPC.into()),
            uma_oracle_address: env::var("UMA_ORACLE_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_UMA_ORACLE.into()),
            uma_requester_address: env::var("UMA_REQUESTER_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_UMA_REQUESTER.into()),
            resolution_overrides_path: env::var("RESOLUTION_OVERRIDES_PATH").ok().map(PathBuf::from),

            activity_threshold_hours: env::var("ACTIVITY_THRESHOLD_HOURS")
                .unwrap_or_else(|_| "72".into())
                .parse()
                .unwrap_or(72),
            ledger_min_confidence: env::var("LEDGER_MIN_CONFIDENCE")
                .unwrap_or_else(|_| "0.3".into())
                .parse()
                .unwrap_or(0.3),
            whale_min_notional: env::var("WHALE_MIN_NOTIONAL")
                .unwrap_or_else(|_| "1000".into())
                .parse()
                .unwrap_or(Decimal::from(1_000)),

            elite_wallets: parse_list(&env::var("ELITE_WALLETS").unwrap_or_default())
                .into_iter()
                .map(|w| w.to_lowercase())
                .collect(),
            elite_min_confidence: env::var("ELITE_MIN_CONFIDENCE")
                .unwrap_or_else(|_| "0.3".into())
                .parse()
                .unwrap_or(0.3),
            discovered_min_confidence: env::var("DISCOVERED_MIN_CONFIDENCE")
                .unwrap_or_else(|_| "0.6".into())
                .parse()
                .unwrap_or(0.6),

            simulation_delays_secs: parse_delays(
                &env::var("SIMULATION_DELAYS_SECS").unwrap_or_else(|_| "60,180,300".into()),
            ),
            price_history_capacity: env::var("PRICE_HISTORY_CAPACITY")
                .unwrap_or_else(|_| "1000".into())
                .parse()
                .unwrap_or(1_000),
            price_lookup_tolerance_secs: env::var("PRICE_LOOKUP_TOLERANCE_SECS")
                .unwrap_or_else(|_| "120".into())
                .parse()
                .unwrap_or(120),
            paper_stake_usd: env::var("PAPER_STAKE_USD")
                .unwrap_or_else(|_| "50".into())
                .parse()
                .unwrap_or(Decimal::from(50)),

            settlement_interval_secs: env::var("SETTLEMENT_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".into())
                .parse()
                .unwrap_or(300),
            settlement_batch_limit: env::var("SETTLEMENT_BATCH_LIMIT")
                .unwrap_or_else(|_| "100".into())
                .parse()
                .unwrap_or(100),
            maintenance_interval_secs: env::var("MAINTENANCE_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".into())
                .parse()
                .unwrap_or(3_600),

            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),
            notifications_enabled: env::var("NOTIFICATIONS_ENABLED")
                .unwrap_or_else(|_| "true".into())
                .parse()
                .unwrap_or(true),

            metrics_addr: env::var("METRICS_ADDR").ok(),
        })
    }

    /// Returns true if a Telegram bot and chat are configured and enabled.
    pub fn has_telegram(&self) -> bool {
        self.notifications_enabled
            && self.telegram_bot_token.is_some()
            && self.telegram_chat_id.is_some()
    }

    pub fn activity_threshold(&self) -> chrono::Duration {
        chrono::Duration::hours(self.activity_threshold_hours)
    }

    pub fn settlement_interval(&self) -> Duration {
        Duration::from_secs(self.settlement_interval_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}
