use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own scrape listener on `addr`
/// and pre-register every application metric at zero.
pub fn init_metrics(addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = addr.parse()?;
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    // Pre-register counters so they appear even before the first increment.
    counter!("detections_total").absolute(0);
    counter!("simulations_started").absolute(0);
    counter!("delay_results_recorded").absolute(0);
    counter!("simulation_start_failures").absolute(0);
    counter!("simulations_resolved").absolute(0);
    counter!("paper_trades_opened").absolute(0);
    counter!("trades_resolved").absolute(0);
    counter!("resolution_unknown_total").absolute(0);
    counter!("store_lock_retries").absolute(0);

    gauge!("active_whales").set(0.0);

    histogram!("pipeline_latency_seconds").record(0.0);

    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}
