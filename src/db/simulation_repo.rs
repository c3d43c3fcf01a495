use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteExecutor;
use uuid::Uuid;

use crate::db::parse_decimal;
use crate::errors::{AppError, AppResult};
use crate::models::{DelayResult, Simulation, SimulationStatus, SimulationSummary};

#[derive(sqlx::FromRow)]
struct SimulationRow {
    id: String,
    whale_address: String,
    market_id: String,
    detection_time: DateTime<Utc>,
    detection_price: String,
    detection_size: String,
    outcome_index: Option<i64>,
    scheduled_delays: String,
    results: String,
    status: String,
    summary: Option<String>,
}

/// A decoded row, plus the raw results text when it could not be parsed.
pub struct LoadedSimulation {
    pub simulation: Simulation,
    pub corrupt_results: Option<String>,
}

fn decode(row: SimulationRow) -> AppResult<LoadedSimulation> {
    let id = Uuid::parse_str(&row.id)
        .map_err(|e| AppError::DataCorruption(format!("simulation id {}: {e}", row.id)))?;
    let scheduled_delays: Vec<u64> = serde_json::from_str(&row.scheduled_delays)
        .map_err(|e| AppError::DataCorruption(format!("simulation {id} delays: {e}")))?;
    let status = SimulationStatus::parse(&row.status)
        .ok_or_else(|| AppError::DataCorruption(format!("simulation {id}: bad status {}", row.status)))?;

    let summary = row
        .summary
        .as_deref()
        .map(serde_json::from_str::<SimulationSummary>)
        .transpose()
        .map_err(|e| AppError::DataCorruption(format!("simulation {id} summary: {e}")))?;

    let (results, corrupt_results) = match serde_json::from_str::<Vec<DelayResult>>(&row.results) {
        Ok(results) => (results, None),
        Err(_) => (Vec::new(), Some(row.results)),
    };

    Ok(LoadedSimulation {
        simulation: Simulation {
            id,
            whale_address: row.whale_address,
            market_id: row.market_id,
            detection_time: row.detection_time,
            detection_price: parse_decimal("simulations.detection_price", &row.detection_price)?,
            detection_size: parse_decimal("simulations.detection_size", &row.detection_size)?,
            outcome_index: row.outcome_index,
            scheduled_delays,
            results,
            status,
            summary,
        },
        corrupt_results,
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string(value).map_err(|e| AppError::Internal(e.into()))
}

pub async fn insert_simulation<'e, E: SqliteExecutor<'e>>(ex: E, sim: &Simulation) -> AppResult<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO simulations (id, whale_address, market_id, detection_time, detection_price,
                                 detection_size, outcome_index, scheduled_delays, results, status,
                                 created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
        "#,
    )
    .bind(sim.id.to_string())
    .bind(&sim.whale_address)
    .bind(&sim.market_id)
    .bind(sim.detection_time)
    .bind(sim.detection_price.to_string())
    .bind(sim.detection_size.to_string())
    .bind(sim.outcome_index)
    .bind(to_json(&sim.scheduled_delays)?)
    .bind(to_json(&sim.results)?)
    .bind(sim.status.as_str())
    .bind(now)
    .execute(ex)
    .await?;

    Ok(())
}

pub async fn get_simulation<'e, E: SqliteExecutor<'e>>(
    ex: E,
    id: Uuid,
) -> AppResult<Option<LoadedSimulation>> {
    let row = sqlx::query_as::<_, SimulationRow>(
        r#"
        SELECT id, whale_address, market_id, detection_time, detection_price, detection_size,
               outcome_index, scheduled_delays, results, status, summary
        FROM simulations WHERE id = ?1
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(ex)
    .await?;

    row.map(decode).transpose()
}

/// Overwrite the results and status of a simulation.
pub async fn save_results<'e, E: SqliteExecutor<'e>>(ex: E, sim: &Simulation) -> AppResult<()> {
    sqlx::query("UPDATE simulations SET results = ?2, status = ?3, updated_at = ?4 WHERE id = ?1")
        .bind(sim.id.to_string())
        .bind(to_json(&sim.results)?)
        .bind(sim.status.as_str())
        .bind(Utc::now())
        .execute(ex)
        .await?;

    Ok(())
}

/// Simulations on `market_id` that have not been summarised yet.
pub async fn list_unresolved_for_market<'e, E: SqliteExecutor<'e>>(
    ex: E,
    market_id: &str,
) -> AppResult<Vec<Uuid>> {
    let ids: Vec<(String,)> = sqlx::query_as(
        "SELECT id FROM simulations WHERE market_id = ?1 AND summary IS NULL ORDER BY created_at",
    )
    .bind(market_id)
    .fetch_all(ex)
    .await?;

    ids.into_iter()
        .map(|(id,)| {
            Uuid::parse_str(&id).map_err(|e| AppError::DataCorruption(format!("simulation id {id}: {e}")))
        })
        .collect()
}

/// Overwrite results and summary after the market resolved.
pub async fn save_resolution<'e, E: SqliteExecutor<'e>>(ex: E, sim: &Simulation) -> AppResult<()> {
    let summary = sim.summary.as_ref().map(to_json).transpose()?;
    sqlx::query("UPDATE simulations SET results = ?2, summary = ?3, updated_at = ?4 WHERE id = ?1")
        .bind(sim.id.to_string())
        .bind(to_json(&sim.results)?)
        .bind(summary)
        .bind(Utc::now())
        .execute(ex)
        .await?;

    Ok(())
}

/// Move an unreadable results column aside and reset it to an empty list.
pub async fn quarantine_results<'e, E: SqliteExecutor<'e>>(
    ex: E,
    id: Uuid,
    raw: &str,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE simulations SET quarantined_results = ?2, results = '[]', updated_at = ?3 WHERE id = ?1",
    )
    .bind(id.to_string())
    .bind(raw)
    .bind(Utc::now())
    .execute(ex)
    .await?;

    Ok(())
}
