use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::{OpenOutcome, TradeStore};
use crate::errors::AppResult;
use crate::execution::{CopyPolicy, CopySimulator};
use crate::models::{DetectionEvent, NewSignal, WhaleSource};
use crate::polymarket::MarketMetadataSource;
use crate::services::notifier::{format_paper_trade_opened, Notifier};
use crate::tracking::{PriceHistory, WhaleLedger};

/// What happened to one detection.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Recorded for prices and the ledger only.
    Observed,
    Skipped(String),
    Duplicate,
    /// `simulation_id` is `None` when the trade opened but its simulation
    /// could not be stored.
    Copied { trade_id: i64, simulation_id: Option<Uuid> },
}

/// Everything a detection touches, in the order it touches it.
#[derive(Clone)]
pub struct Pipeline {
    pub ledger: WhaleLedger,
    pub prices: PriceHistory,
    pub policy: CopyPolicy,
    pub store: TradeStore,
    pub simulator: CopySimulator,
    pub metadata: Option<Arc<dyn MarketMetadataSource>>,
    pub notifier: Option<Notifier>,
    /// Trades at or above this notional update the ledger.
    pub whale_min_notional: Decimal,
    pub paper_stake: Decimal,
}

impl Pipeline {
    /// 1. Record the print in price history
    /// 2. Update the ledger for whale-sized trades
    /// 3. Apply the copy policy
    /// 4. Open the paper trade (deduplicated by signal key)
    /// 5. Start the delayed-copy simulation
    pub async fn process_detection(&self, event: &DetectionEvent) -> AppResult<PipelineOutcome> {
        let start = Instant::now();
        counter!("detections_total").increment(1);

        self.prices.record_sample(&event.market_id, event.timestamp, event.price);

        let wallet = event.wallet_key();
        if event.notional < self.whale_min_notional {
            histogram!("pipeline_latency_seconds").record(start.elapsed().as_secs_f64());
            return Ok(PipelineOutcome::Observed);
        }

        let source = if self.policy.is_elite(&wallet) {
            WhaleSource::Elite
        } else {
            WhaleSource::Anomaly
        };
        self.ledger
            .record_activity(&wallet, &event.market_id, event.notional, source, event.timestamp)
            .await?;

        let record = self.ledger.get(&wallet).await;
        let confidence = match self.policy.evaluate(event, record.as_ref()) {
            Ok(c) => c,
            Err(reason) => {
                tracing::debug!(wallet = %wallet, market = %event.market_id, reason = %reason, "Detection not copied");
                histogram!("pipeline_latency_seconds").record(start.elapsed().as_secs_f64());
                return Ok(PipelineOutcome::Skipped(reason.to_string()));
            }
        };

        let event = self.with_outcome_index(event).await;
        let Some(signal) = NewSignal::from_event(&event, confidence) else {
            tracing::warn!(wallet = %wallet, market = %event.market_id, asset = %event.asset_id, "Traded outcome unknown, not copying");
            return Ok(PipelineOutcome::Skipped("outcome index unknown".into()));
        };

        let trade_id = match self
            .store
            .open_trade(&signal, self.paper_stake, event.price, signal.outcome_index)
            .await?
        {
            OpenOutcome::Opened { trade_id, .. } => trade_id,
            OpenOutcome::DuplicateSignal { .. } => {
                histogram!("pipeline_latency_seconds").record(start.elapsed().as_secs_f64());
                return Ok(PipelineOutcome::Duplicate);
            }
        };

        let simulation_id = match self.simulator.start_simulation(&event).await {
            Ok(id) => Some(id),
            Err(e) => {
                counter!("simulation_start_failures").increment(1);
                tracing::error!(
                    error = %e,
                    trade_id,
                    market = %event.market_id,
                    "Paper trade opened without a copy simulation"
                );
                None
            }
        };

        tracing::info!(
            wallet = %wallet,
            market = %event.market_id,
            confidence,
            trade_id,
            simulation_id = ?simulation_id,
            "Whale trade copied"
        );

        if let Some(n) = &self.notifier {
            n.send(&format_paper_trade_opened(&event, confidence, self.paper_stake)).await;
        }

        histogram!("pipeline_latency_seconds").record(start.elapsed().as_secs_f64());
        Ok(PipelineOutcome::Copied { trade_id, simulation_id })
    }

    /// Fill in the traded outcome and question from market metadata when the
    /// feed left them out.
    async fn with_outcome_index(&self, event: &DetectionEvent) -> DetectionEvent {
        let mut event = event.clone();
        if event.outcome_index.is_some() && event.market_question.is_some() {
            return event;
        }
        let Some(metadata) = &self.metadata else {
            return event;
        };

        match metadata.fetch_market(&event.market_id).await {
            Ok(Some(market)) => {
                if event.outcome_index.is_none() && !event.asset_id.is_empty() {
                    event.outcome_index = market.outcome_index_of(&event.asset_id);
                }
                if event.market_question.is_none() {
                    event.market_question = market.display_title().map(str::to_string);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, market = %event.market_id, "Metadata lookup failed during ingestion");
            }
        }
        event
    }

    /// Drain detections until the channel closes. A failed event is logged
    /// and the loop moves on.
    pub async fn run(self, mut rx: mpsc::Receiver<DetectionEvent>) {
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.process_detection(&event).await {
                tracing::error!(error = %e, event = %event, "Failed to process detection");
            }
        }
        tracing::info!("Detection channel closed, pipeline stopped");
    }
}
