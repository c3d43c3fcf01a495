use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use metrics::counter;
use tokio::sync::Mutex;
use tokio::time::sleep;
use uuid::Uuid;

use crate::db::store::AppendOutcome;
use crate::db::TradeStore;
use crate::errors::AppResult;
use crate::models::{DelayResult, DetectionEvent, PriceSource, Simulation, SimulationStatus};
use crate::tracking::PriceHistory;

use super::slippage::SlippageModel;

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Seconds after detection at which a copy entry is sampled.
    pub delays_secs: Vec<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            delays_secs: vec![60, 180, 300],
        }
    }
}

/// Replays what copying a whale trade would have cost after each delay.
///
/// Timers for different simulations run independently. Appends for one
/// simulation are serialized through a per-id lock, and the store's
/// transactional append drops duplicates, so results never outnumber the
/// scheduled delays. Timers do not survive a restart; a simulation left
/// with fewer results than delays is kept as-is.
#[derive(Clone)]
pub struct CopySimulator {
    store: TradeStore,
    prices: PriceHistory,
    slippage: Arc<dyn SlippageModel>,
    config: SimulatorConfig,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CopySimulator {
    pub fn new(
        store: TradeStore,
        prices: PriceHistory,
        slippage: Arc<dyn SlippageModel>,
        mut config: SimulatorConfig,
    ) -> Self {
        config.delays_secs.sort_unstable();
        config.delays_secs.dedup();
        if config.delays_secs.is_empty() {
            tracing::warn!("No copy delays configured, using defaults");
            config.delays_secs = SimulatorConfig::default().delays_secs;
        }
        Self {
            store,
            prices,
            slippage,
            config,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn delays(&self) -> &[u64] {
        &self.config.delays_secs
    }

    /// Persist a pending simulation for `event` and schedule its timers.
    pub async fn start_simulation(&self, event: &DetectionEvent) -> AppResult<Uuid> {
        let simulation = self.create_simulation(event).await?;
        self.schedule(&simulation);
        counter!("simulations_started").increment(1);
        Ok(simulation.id)
    }

    /// Persist a pending simulation without scheduling anything.
    pub async fn create_simulation(&self, event: &DetectionEvent) -> AppResult<Simulation> {
        let simulation = Simulation {
            id: Uuid::new_v4(),
            whale_address: event.wallet_key(),
            market_id: event.market_id.clone(),
            detection_time: event.timestamp,
            detection_price: event.price,
            detection_size: event.notional,
            outcome_index: event.outcome_index,
            scheduled_delays: self.config.delays_secs.clone(),
            results: Vec::new(),
            status: SimulationStatus::Pending,
            summary: None,
        };
        self.store.insert_simulation(&simulation).await?;

        tracing::info!(
            simulation_id = %simulation.id,
            wallet = %simulation.whale_address,
            market = %simulation.market_id,
            price = %simulation.detection_price,
            delays = ?simulation.scheduled_delays,
            "Simulation created"
        );
        Ok(simulation)
    }

    /// Spawn one timer per scheduled delay, each firing at detection time + delay.
    pub fn schedule(&self, simulation: &Simulation) {
        for &delay in &simulation.scheduled_delays {
            let target = simulation.detection_time + ChronoDuration::seconds(delay as i64);
            let wait = (target - Utc::now()).to_std().unwrap_or_default();
            let simulator = self.clone();
            let id = simulation.id;

            tokio::spawn(async move {
                sleep(wait).await;
                if let Err(e) = simulator.record_delay(id, delay, Utc::now()).await {
                    tracing::error!(
                        error = %e,
                        simulation_id = %id,
                        delay_secs = delay,
                        "Failed to record delayed entry"
                    );
                }
            });
        }
    }

    /// Sample the market at `fire_time` and append the delayed entry.
    ///
    /// Falls back to the detection price, flagged as such, when no sample is
    /// within tolerance.
    pub async fn record_delay(
        &self,
        id: Uuid,
        delay_seconds: u64,
        fire_time: DateTime<Utc>,
    ) -> AppResult<AppendOutcome> {
        let lock = Arc::clone(
            self.locks
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let outcome = {
            let _guard = lock.lock().await;
            self.append_locked(id, delay_seconds, fire_time).await
        };
        // Only the map and this call hold the lock: nobody is waiting on it.
        self.locks.remove_if(&id, |_, l| Arc::strong_count(l) == 2);
        outcome
    }

    /// Number of simulations with a live append lock.
    pub fn pending_locks(&self) -> usize {
        self.locks.len()
    }

    async fn append_locked(
        &self,
        id: Uuid,
        delay_seconds: u64,
        fire_time: DateTime<Utc>,
    ) -> AppResult<AppendOutcome> {
        let Some(simulation) = self.store.get_simulation(id).await? else {
            tracing::warn!(simulation_id = %id, "Timer fired for unknown simulation");
            return Ok(AppendOutcome::NotFound);
        };
        if !simulation.scheduled_delays.contains(&delay_seconds) || simulation.has_result_for(delay_seconds) {
            return Ok(AppendOutcome::Skipped(simulation));
        }

        let (sampled_price, price_source) = match self.prices.lookup(&simulation.market_id, fire_time) {
            Some(sample) => (sample.price, PriceSource::Actual),
            None => (simulation.detection_price, PriceSource::Fallback),
        };
        let slippage_pct =
            self.slippage
                .slippage_pct(&simulation.market_id, simulation.detection_size, sampled_price);
        let simulated_entry_price =
            self.slippage
                .execution_price(&simulation.market_id, simulation.detection_size, sampled_price);

        let result = DelayResult {
            delay_seconds,
            fire_time,
            sampled_price,
            price_source,
            slippage_pct,
            simulated_entry_price,
            pnl: None,
            pnl_pct: None,
            resolved_at: None,
        };

        let outcome = self.store.append_delay_result(id, &result).await?;
        if let AppendOutcome::Appended(updated) = &outcome {
            counter!("delay_results_recorded").increment(1);
            tracing::info!(
                simulation_id = %id,
                delay_secs = delay_seconds,
                price = %sampled_price,
                source = ?price_source,
                entry = %simulated_entry_price,
                "Delayed entry recorded"
            );
            if updated.status == SimulationStatus::Completed {
                tracing::info!(simulation_id = %id, "Simulation completed");
            }
        }
        Ok(outcome)
    }

    pub async fn get_simulation(&self, id: Uuid) -> AppResult<Option<Simulation>> {
        self.store.get_simulation(id).await
    }
}
