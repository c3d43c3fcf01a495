use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteExecutor;

use crate::errors::{AppError, AppResult};
use crate::models::{AttemptStatus, ResolutionAttempt};

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: i64,
    paper_trade_id: i64,
    checked_at: DateTime<Utc>,
    status: String,
    details: Option<String>,
}

/// Append one audit row. Never deduplicated.
pub async fn insert_attempt<'e, E: SqliteExecutor<'e>>(
    ex: E,
    paper_trade_id: i64,
    checked_at: DateTime<Utc>,
    status: AttemptStatus,
    details: Option<&str>,
) -> AppResult<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO resolution_attempts (paper_trade_id, checked_at, status, details)
        VALUES (?1, ?2, ?3, ?4)
        RETURNING id
        "#,
    )
    .bind(paper_trade_id)
    .bind(checked_at)
    .bind(status.as_str())
    .bind(details)
    .fetch_one(ex)
    .await?;

    Ok(id)
}

/// All attempts for a trade in insertion order.
pub async fn list_for_trade<'e, E: SqliteExecutor<'e>>(
    ex: E,
    paper_trade_id: i64,
) -> AppResult<Vec<ResolutionAttempt>> {
    let rows = sqlx::query_as::<_, AttemptRow>(
        "SELECT * FROM resolution_attempts WHERE paper_trade_id = ?1 ORDER BY id ASC",
    )
    .bind(paper_trade_id)
    .fetch_all(ex)
    .await?;

    rows.into_iter()
        .map(|r| {
            let status = r
                .status
                .parse::<AttemptStatus>()
                .map_err(AppError::DataCorruption)?;
            Ok(ResolutionAttempt {
                id: r.id,
                paper_trade_id: r.paper_trade_id,
                checked_at: r.checked_at,
                status,
                details: r.details,
            })
        })
        .collect()
}
