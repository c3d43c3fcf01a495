use chrono::Utc;
use metrics::gauge;
use tokio::time::{interval, Duration};

use crate::tracking::WhaleLedger;

/// One maintenance pass: decay and deactivate idle wallets, then drop the
/// ones whose confidence fell below `prune_below`.
pub async fn run_maintenance_once(ledger: &WhaleLedger, prune_below: f64) -> anyhow::Result<()> {
    let report = ledger.sweep(Utc::now()).await?;
    let pruned = ledger.prune(prune_below).await?;
    let stats = ledger.stats(Utc::now()).await?;

    gauge!("active_whales").set(stats.active as f64);

    tracing::info!(
        deactivated = report.deactivated,
        reactivated = report.reactivated,
        pruned,
        total = stats.total,
        active = stats.active,
        high_confidence = stats.high_confidence,
        avg_confidence = stats.avg_confidence,
        "Ledger maintenance complete"
    );
    Ok(())
}

pub async fn run_maintenance_loop(ledger: WhaleLedger, every: Duration, prune_below: f64) {
    let mut ticker = interval(every);
    loop {
        ticker.tick().await;
        if let Err(e) = run_maintenance_once(&ledger, prune_below).await {
            tracing::error!(error = %e, "Ledger maintenance failed");
        }
    }
}
