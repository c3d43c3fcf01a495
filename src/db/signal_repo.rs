use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteExecutor;

use crate::db::parse_decimal;
use crate::errors::{AppError, AppResult};
use crate::models::{NewSignal, Side, Signal};

#[derive(sqlx::FromRow)]
struct SignalRow {
    id: i64,
    created_at: DateTime<Utc>,
    wallet: String,
    wallet_prefix: String,
    market_id: String,
    asset_id: Option<String>,
    outcome_index: i64,
    side: String,
    price: String,
    notional: String,
    whale_confidence: f64,
    tx_ref: Option<String>,
    market_question: Option<String>,
}

impl TryFrom<SignalRow> for Signal {
    type Error = AppError;

    fn try_from(row: SignalRow) -> AppResult<Self> {
        let side = Side::from_api_str(&row.side)
            .ok_or_else(|| AppError::DataCorruption(format!("signal {}: bad side {}", row.id, row.side)))?;
        Ok(Signal {
            id: row.id,
            created_at: row.created_at,
            wallet: row.wallet,
            wallet_prefix: row.wallet_prefix,
            market_id: row.market_id,
            asset_id: row.asset_id,
            outcome_index: row.outcome_index,
            side,
            price: parse_decimal("signals.price", &row.price)?,
            notional: parse_decimal("signals.notional", &row.notional)?,
            whale_confidence: row.whale_confidence,
            tx_ref: row.tx_ref,
            market_question: row.market_question,
        })
    }
}

/// Insert a signal unless its (market, outcome, side, wallet prefix) key
/// already exists. Returns the new id, or `None` on a duplicate.
pub async fn insert_signal<'e, E: SqliteExecutor<'e>>(
    ex: E,
    signal: &NewSignal,
) -> AppResult<Option<i64>> {
    let id: Option<(i64,)> = sqlx::query_as(
        r#"
        INSERT INTO signals (created_at, wallet, wallet_prefix, market_id, asset_id, outcome_index,
                             side, price, notional, whale_confidence, tx_ref, market_question)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT (market_id, outcome_index, side, wallet_prefix) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(signal.detected_at)
    .bind(&signal.wallet)
    .bind(signal.wallet_prefix())
    .bind(&signal.market_id)
    .bind(&signal.asset_id)
    .bind(signal.outcome_index)
    .bind(signal.side.as_str())
    .bind(signal.price.to_string())
    .bind(signal.notional.to_string())
    .bind(signal.whale_confidence)
    .bind(&signal.tx_ref)
    .bind(&signal.market_question)
    .fetch_optional(ex)
    .await?;

    Ok(id.map(|(id,)| id))
}

/// Look up the signal that owns a dedup key.
pub async fn find_signal_id<'e, E: SqliteExecutor<'e>>(
    ex: E,
    signal: &NewSignal,
) -> AppResult<Option<i64>> {
    let id: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT id FROM signals
        WHERE market_id = ?1 AND outcome_index = ?2 AND side = ?3 AND wallet_prefix = ?4
        "#,
    )
    .bind(&signal.market_id)
    .bind(signal.outcome_index)
    .bind(signal.side.as_str())
    .bind(signal.wallet_prefix())
    .fetch_optional(ex)
    .await?;

    Ok(id.map(|(id,)| id))
}

pub async fn get_signal<'e, E: SqliteExecutor<'e>>(ex: E, id: i64) -> AppResult<Option<Signal>> {
    let row = sqlx::query_as::<_, SignalRow>("SELECT * FROM signals WHERE id = ?1")
        .bind(id)
        .fetch_optional(ex)
        .await?;

    row.map(Signal::try_from).transpose()
}
