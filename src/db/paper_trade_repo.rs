use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteExecutor;

use crate::db::{parse_decimal, parse_opt_decimal};
use crate::errors::{AppError, AppResult};
use crate::models::{PaperTrade, Side, TradeStatus};

#[derive(sqlx::FromRow)]
struct PaperTradeRow {
    id: i64,
    signal_id: i64,
    opened_at: DateTime<Utc>,
    status: String,
    stake_usd: String,
    entry_price: String,
    outcome_index: i64,
    side: String,
    market_id: String,
    asset_id: Option<String>,
    market_question: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_outcome_index: Option<i64>,
    resolved_price: Option<String>,
    won: Option<bool>,
    pnl_usd: Option<String>,
    error_reason: Option<String>,
}

impl TryFrom<PaperTradeRow> for PaperTrade {
    type Error = AppError;

    fn try_from(row: PaperTradeRow) -> AppResult<Self> {
        let status = row
            .status
            .parse::<TradeStatus>()
            .map_err(|e| AppError::DataCorruption(format!("paper trade {}: {e}", row.id)))?;
        let side = Side::from_api_str(&row.side).ok_or_else(|| {
            AppError::DataCorruption(format!("paper trade {}: bad side {}", row.id, row.side))
        })?;

        Ok(PaperTrade {
            id: row.id,
            signal_id: row.signal_id,
            opened_at: row.opened_at,
            status,
            stake: parse_decimal("paper_trades.stake_usd", &row.stake_usd)?,
            entry_price: parse_decimal("paper_trades.entry_price", &row.entry_price)?,
            outcome_index: row.outcome_index,
            side,
            market_ref: row.market_id,
            asset_id: row.asset_id,
            market_question: row.market_question,
            resolved_at: row.resolved_at,
            resolved_outcome_index: row.resolved_outcome_index,
            resolved_price: parse_opt_decimal("paper_trades.resolved_price", row.resolved_price.as_deref())?,
            won: row.won,
            pnl: parse_opt_decimal("paper_trades.pnl_usd", row.pnl_usd.as_deref())?,
            error_reason: row.error_reason,
        })
    }
}

/// Fields written once when a paper trade is opened.
pub struct NewPaperTrade<'a> {
    pub signal_id: i64,
    pub opened_at: DateTime<Utc>,
    pub stake: Decimal,
    pub entry_price: Decimal,
    pub outcome_index: i64,
    pub side: Side,
    pub market_id: &'a str,
    pub asset_id: Option<&'a str>,
    pub market_question: Option<&'a str>,
}

pub async fn insert_paper_trade<'e, E: SqliteExecutor<'e>>(
    ex: E,
    trade: &NewPaperTrade<'_>,
) -> AppResult<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO paper_trades (signal_id, opened_at, status, stake_usd, entry_price, outcome_index,
                                  side, market_id, asset_id, market_question)
        VALUES (?1, ?2, 'OPEN', ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        RETURNING id
        "#,
    )
    .bind(trade.signal_id)
    .bind(trade.opened_at)
    .bind(trade.stake.to_string())
    .bind(trade.entry_price.to_string())
    .bind(trade.outcome_index)
    .bind(trade.side.as_str())
    .bind(trade.market_id)
    .bind(trade.asset_id)
    .bind(trade.market_question)
    .fetch_one(ex)
    .await?;

    Ok(id)
}

pub async fn get_paper_trade<'e, E: SqliteExecutor<'e>>(
    ex: E,
    id: i64,
) -> AppResult<Option<PaperTrade>> {
    let row = sqlx::query_as::<_, PaperTradeRow>("SELECT * FROM paper_trades WHERE id = ?1")
        .bind(id)
        .fetch_optional(ex)
        .await?;

    row.map(PaperTrade::try_from).transpose()
}

/// Oldest OPEN trades first.
pub async fn list_open<'e, E: SqliteExecutor<'e>>(ex: E, limit: i64) -> AppResult<Vec<PaperTrade>> {
    let rows = sqlx::query_as::<_, PaperTradeRow>(
        r#"
        SELECT * FROM paper_trades
        WHERE status = 'OPEN'
        ORDER BY opened_at ASC, id ASC
        LIMIT ?1
        "#,
    )
    .bind(limit)
    .fetch_all(ex)
    .await?;

    rows.into_iter().map(PaperTrade::try_from).collect()
}

pub struct Settlement {
    pub resolved_at: DateTime<Utc>,
    pub winning_outcome_index: i64,
    pub resolved_price: Decimal,
    pub won: bool,
    pub pnl: Decimal,
}

/// OPEN → RESOLVED. Returns false if the row was not OPEN.
pub async fn mark_resolved<'e, E: SqliteExecutor<'e>>(
    ex: E,
    id: i64,
    s: &Settlement,
) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE paper_trades
        SET status = 'RESOLVED', resolved_at = ?2, resolved_outcome_index = ?3,
            resolved_price = ?4, won = ?5, pnl_usd = ?6
        WHERE id = ?1 AND status = 'OPEN'
        "#,
    )
    .bind(id)
    .bind(s.resolved_at)
    .bind(s.winning_outcome_index)
    .bind(s.resolved_price.to_string())
    .bind(s.won)
    .bind(s.pnl.to_string())
    .execute(ex)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// OPEN → ERROR. Returns false if the row was not OPEN.
pub async fn mark_error<'e, E: SqliteExecutor<'e>>(ex: E, id: i64, reason: &str) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE paper_trades SET status = 'ERROR', error_reason = ?2 WHERE id = ?1 AND status = 'OPEN'",
    )
    .bind(id)
    .bind(reason)
    .execute(ex)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn count_by_status<'e, E: SqliteExecutor<'e>>(ex: E) -> AppResult<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM paper_trades GROUP BY status ORDER BY status")
            .fetch_all(ex)
            .await?;

    Ok(rows)
}
