use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::attempt_repo;
use crate::db::paper_trade_repo::{self, NewPaperTrade, Settlement};
use crate::db::retry::{with_retry, RetryPolicy};
use crate::db::signal_repo;
use crate::db::simulation_repo::{self, LoadedSimulation};
use crate::errors::{AppError, AppResult};
use crate::models::{
    AttemptStatus, DelayResult, NewSignal, PaperTrade, ResolutionAttempt, Signal, Simulation,
    SimulationStatus,
};

/// Result of `TradeStore::open_trade`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened { signal_id: i64, trade_id: i64 },
    /// The (market, outcome, side, wallet prefix) key was already taken.
    DuplicateSignal { existing_signal_id: Option<i64> },
}

/// Result of `TradeStore::append_delay_result`.
#[derive(Debug, Clone)]
pub enum AppendOutcome {
    Appended(Simulation),
    /// Delay not scheduled or already recorded; state unchanged.
    Skipped(Simulation),
    NotFound,
}

/// PnL of a settled paper trade.
///
/// A winning trade that settles at 1.0 earns `stake * (1/entry - 1)`; any
/// other settlement price uses the price ratio. A loss forfeits the stake.
pub fn compute_pnl(stake: Decimal, entry_price: Decimal, won: bool, resolved_price: Decimal) -> Decimal {
    if !won {
        return -stake;
    }
    if entry_price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let pnl = if resolved_price == Decimal::ONE {
        stake * (Decimal::ONE / entry_price - Decimal::ONE)
    } else {
        stake * (resolved_price - entry_price) / entry_price
    };
    pnl.round_dp(6)
}

/// Durable signals, paper trades, resolution attempts and simulations.
///
/// Every mutation runs as one short transaction and is retried with backoff
/// when SQLite reports lock contention, so the pipeline, the simulator and
/// the settlement loop can share one database.
#[derive(Clone)]
pub struct TradeStore {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl TradeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_retry_policy(pool, RetryPolicy::default())
    }

    pub fn with_retry_policy(pool: SqlitePool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -----------------------------------------------------------------------
    // Paper trades
    // -----------------------------------------------------------------------

    /// Write the signal and its paper trade together.
    ///
    /// A duplicate signal key is a logged no-op. A missing market id, a
    /// non-positive stake or an entry price outside (0, 1] is rejected.
    pub async fn open_trade(
        &self,
        signal: &NewSignal,
        stake: Decimal,
        entry_price: Decimal,
        outcome_index: i64,
    ) -> AppResult<OpenOutcome> {
        if signal.market_id.trim().is_empty() {
            tracing::warn!(wallet = %signal.wallet, "Refusing paper trade without a market id");
            return Err(AppError::InvariantViolation("paper trade needs a market id".into()));
        }
        if stake <= Decimal::ZERO {
            return Err(AppError::InvariantViolation(format!("stake must be positive, got {stake}")));
        }
        if entry_price <= Decimal::ZERO || entry_price > Decimal::ONE {
            return Err(AppError::InvariantViolation(format!(
                "entry price must be in (0, 1], got {entry_price}"
            )));
        }

        let pool = &self.pool;
        let outcome = with_retry(&self.retry, "open_trade", move || async move {
            let mut tx = pool.begin().await?;

            let Some(signal_id) = signal_repo::insert_signal(&mut *tx, signal).await? else {
                let existing_signal_id = signal_repo::find_signal_id(&mut *tx, signal).await?;
                tx.rollback().await?;
                return Ok(OpenOutcome::DuplicateSignal { existing_signal_id });
            };

            let trade_id = paper_trade_repo::insert_paper_trade(
                &mut *tx,
                &NewPaperTrade {
                    signal_id,
                    opened_at: signal.detected_at,
                    stake,
                    entry_price,
                    outcome_index,
                    side: signal.side,
                    market_id: &signal.market_id,
                    asset_id: signal.asset_id.as_deref(),
                    market_question: signal.market_question.as_deref(),
                },
            )
            .await?;

            tx.commit().await?;
            Ok(OpenOutcome::Opened { signal_id, trade_id })
        })
        .await?;

        match &outcome {
            OpenOutcome::Opened { signal_id, trade_id } => {
                counter!("paper_trades_opened").increment(1);
                tracing::info!(
                    trade_id,
                    signal_id,
                    market = %signal.market_id,
                    outcome_index,
                    stake = %stake,
                    entry_price = %entry_price,
                    "Paper trade opened"
                );
            }
            OpenOutcome::DuplicateSignal { existing_signal_id } => {
                tracing::info!(
                    existing_signal_id = ?existing_signal_id,
                    market = %signal.market_id,
                    wallet = %signal.wallet,
                    side = %signal.side,
                    "Duplicate signal, paper trade not opened"
                );
            }
        }

        Ok(outcome)
    }

    pub async fn list_open(&self, limit: i64) -> AppResult<Vec<PaperTrade>> {
        paper_trade_repo::list_open(&self.pool, limit).await
    }

    pub async fn get_trade(&self, id: i64) -> AppResult<Option<PaperTrade>> {
        paper_trade_repo::get_paper_trade(&self.pool, id).await
    }

    pub async fn get_signal(&self, id: i64) -> AppResult<Option<Signal>> {
        signal_repo::get_signal(&self.pool, id).await
    }

    /// Settle an OPEN trade. Returns false, leaving the row untouched, if the
    /// trade does not exist or is no longer OPEN.
    pub async fn resolve_trade(
        &self,
        id: i64,
        winning_outcome_index: i64,
        won: bool,
        resolved_price: Decimal,
    ) -> AppResult<bool> {
        let pool = &self.pool;
        let resolved = with_retry(&self.retry, "resolve_trade", move || async move {
            let mut tx = pool.begin().await?;

            let Some(trade) = paper_trade_repo::get_paper_trade(&mut *tx, id).await? else {
                tracing::warn!(trade_id = id, "resolve_trade: no such paper trade");
                return Ok(false);
            };
            if !trade.is_open() {
                tracing::warn!(
                    trade_id = id,
                    status = %trade.status,
                    "resolve_trade: trade already settled, ignoring"
                );
                return Ok(false);
            }

            let pnl = compute_pnl(trade.stake, trade.entry_price, won, resolved_price);
            let settlement = Settlement {
                resolved_at: Utc::now(),
                winning_outcome_index,
                resolved_price,
                won,
                pnl,
            };
            let updated = paper_trade_repo::mark_resolved(&mut *tx, id, &settlement).await?;
            tx.commit().await?;

            if updated {
                tracing::info!(trade_id = id, won, pnl = %pnl, "Paper trade resolved");
            }
            Ok(updated)
        })
        .await?;

        if resolved {
            counter!("trades_resolved").increment(1);
        }
        Ok(resolved)
    }

    /// OPEN → ERROR for trades that can never be settled automatically.
    pub async fn mark_error(&self, id: i64, reason: &str) -> AppResult<bool> {
        let pool = &self.pool;
        with_retry(&self.retry, "mark_error", move || async move {
            paper_trade_repo::mark_error(pool, id, reason).await
        })
        .await
    }

    pub async fn record_attempt(
        &self,
        paper_trade_id: i64,
        status: AttemptStatus,
        details: Option<&str>,
    ) -> AppResult<i64> {
        let pool = &self.pool;
        with_retry(&self.retry, "record_attempt", move || async move {
            attempt_repo::insert_attempt(pool, paper_trade_id, Utc::now(), status, details).await
        })
        .await
    }

    pub async fn attempts_for(&self, paper_trade_id: i64) -> AppResult<Vec<ResolutionAttempt>> {
        attempt_repo::list_for_trade(&self.pool, paper_trade_id).await
    }

    pub async fn count_by_status(&self) -> AppResult<Vec<(String, i64)>> {
        paper_trade_repo::count_by_status(&self.pool).await
    }

    // -----------------------------------------------------------------------
    // Simulations
    // -----------------------------------------------------------------------

    pub async fn insert_simulation(&self, sim: &Simulation) -> AppResult<()> {
        let pool = &self.pool;
        with_retry(&self.retry, "insert_simulation", move || async move {
            simulation_repo::insert_simulation(pool, sim).await
        })
        .await
    }

    /// Load a simulation. An unreadable results column is quarantined and
    /// the simulation is returned with no results.
    pub async fn get_simulation(&self, id: Uuid) -> AppResult<Option<Simulation>> {
        let Some(LoadedSimulation { simulation, corrupt_results }) =
            simulation_repo::get_simulation(&self.pool, id).await?
        else {
            return Ok(None);
        };

        if let Some(raw) = corrupt_results {
            tracing::warn!(simulation_id = %id, "Simulation results unreadable, quarantining");
            let pool = &self.pool;
            let raw = raw.as_str();
            with_retry(&self.retry, "quarantine_results", move || async move {
                simulation_repo::quarantine_results(pool, id, raw).await
            })
            .await?;
        }

        Ok(Some(simulation))
    }

    /// Read-modify-write of one simulation's results inside a transaction.
    pub async fn append_delay_result(&self, id: Uuid, result: &DelayResult) -> AppResult<AppendOutcome> {
        let pool = &self.pool;
        with_retry(&self.retry, "append_delay_result", move || async move {
            let mut tx = pool.begin().await?;

            let Some(LoadedSimulation { mut simulation, corrupt_results }) =
                simulation_repo::get_simulation(&mut *tx, id).await?
            else {
                return Ok(AppendOutcome::NotFound);
            };

            if let Some(raw) = corrupt_results {
                tracing::warn!(simulation_id = %id, "Simulation results unreadable, quarantining");
                simulation_repo::quarantine_results(&mut *tx, id, &raw).await?;
            }

            if !simulation.scheduled_delays.contains(&result.delay_seconds)
                || simulation.has_result_for(result.delay_seconds)
            {
                tx.commit().await?;
                return Ok(AppendOutcome::Skipped(simulation));
            }

            simulation.results.push(result.clone());
            simulation.results.sort_by_key(|r| r.delay_seconds);
            if simulation.is_complete() {
                simulation.status = SimulationStatus::Completed;
            }

            simulation_repo::save_results(&mut *tx, &simulation).await?;
            tx.commit().await?;
            Ok(AppendOutcome::Appended(simulation))
        })
        .await
    }

    /// Price one simulation's delayed entries against the market outcome and
    /// store its summary. The traded outcome settles at `winning_price` when
    /// it won and `1 - winning_price` otherwise. Returns `None` when the
    /// simulation is missing or does not know which outcome was traded.
    pub async fn resolve_simulation(
        &self,
        id: Uuid,
        winning_outcome_index: i64,
        winning_price: Decimal,
        resolved_at: DateTime<Utc>,
    ) -> AppResult<Option<Simulation>> {
        let pool = &self.pool;
        with_retry(&self.retry, "resolve_simulation", move || async move {
            let mut tx = pool.begin().await?;

            let Some(LoadedSimulation { mut simulation, corrupt_results }) =
                simulation_repo::get_simulation(&mut *tx, id).await?
            else {
                return Ok(None);
            };
            if let Some(raw) = corrupt_results {
                tracing::warn!(simulation_id = %id, "Simulation results unreadable, quarantining");
                simulation_repo::quarantine_results(&mut *tx, id, &raw).await?;
            }

            let Some(outcome_index) = simulation.outcome_index else {
                tx.commit().await?;
                return Ok(None);
            };
            let settlement_price = if outcome_index == winning_outcome_index {
                winning_price
            } else {
                Decimal::ONE - winning_price
            };

            if simulation.resolve(settlement_price, resolved_at) {
                simulation_repo::save_resolution(&mut *tx, &simulation).await?;
            }
            tx.commit().await?;
            Ok(Some(simulation))
        })
        .await
    }

    /// Resolve every simulation on `market_id` that has no summary yet.
    /// Returns the simulations that were summarised.
    pub async fn resolve_simulations_for_market(
        &self,
        market_id: &str,
        winning_outcome_index: i64,
        winning_price: Decimal,
        resolved_at: DateTime<Utc>,
    ) -> AppResult<Vec<Simulation>> {
        let ids = simulation_repo::list_unresolved_for_market(&self.pool, market_id).await?;

        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            match self
                .resolve_simulation(id, winning_outcome_index, winning_price, resolved_at)
                .await?
            {
                Some(sim) if sim.summary.is_some() => resolved.push(sim),
                Some(_) => {
                    tracing::debug!(simulation_id = %id, "Simulation has no delayed entries to price");
                }
                None => {
                    tracing::debug!(simulation_id = %id, "Simulation outcome unknown, not priced");
                }
            }
        }
        Ok(resolved)
    }
}
