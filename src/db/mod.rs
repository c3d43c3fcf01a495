pub mod attempt_repo;
pub mod paper_trade_repo;
pub mod retry;
pub mod signal_repo;
pub mod simulation_repo;
pub mod store;

pub use retry::RetryPolicy;
pub use store::{OpenOutcome, TradeStore};

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::errors::{AppError, AppResult};

/// Open the trade database and bring its schema up to date.
pub async fn init_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    if let Some(parent) = options.get_filename().parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    // Verify connectivity
    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database, kept alive for the pool's lifetime.
pub async fn init_memory_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

// ---------------------------------------------------------------------------
// Column helpers: money and prices are stored as TEXT
// ---------------------------------------------------------------------------

pub(crate) fn parse_decimal(column: &str, raw: &str) -> AppResult<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| AppError::DataCorruption(format!("{column}: {raw:?} is not a decimal ({e})")))
}

pub(crate) fn parse_opt_decimal(column: &str, raw: Option<&str>) -> AppResult<Option<Decimal>> {
    raw.map(|r| parse_decimal(column, r)).transpose()
}
