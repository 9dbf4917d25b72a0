//! Metrics: counters and gauges recorded via the `metrics` facade, with
//! no HTTP exporter wired up — admin/monitoring endpoints are explicitly
//! out of scope, so nothing here binds a socket. A recorder (if the
//! deployment wants one) is installed by the operator's own binary, not
//! by this crate; `vatpac-tracker` only ever calls `metrics::counter!`/
//! `metrics::gauge!`, which are no-ops without a recorder installed.
//!
//! Grounded on the teacher's `initialize_run_metrics`/`process_metrics_task`
//! pattern in `metrics.rs`, with the Prometheus exporter, pprof profiling
//! routes, and axum server stripped out.

use std::time::{Duration, Instant};

use tokio::time::sleep;

/// Zero out every counter/gauge this crate emits, so each appears in
/// downstream metrics backends from process start rather than only
/// after it first fires.
pub fn initialize_tracker_metrics() {
    metrics::counter!("feed.record_skipped_total").absolute(0);
    metrics::counter!("feed.fetch_failures_total").absolute(0);

    metrics::counter!("filter.included_total").absolute(0);
    metrics::counter!("filter.excluded_total").absolute(0);
    metrics::counter!("filter.uncertain_total").absolute(0);

    metrics::gauge!("coalescer.flights_tracked").set(0.0);
    metrics::gauge!("coalescer.controllers_tracked").set(0.0);

    metrics::counter!("lifecycle.landings_total").absolute(0);
    metrics::counter!("lifecycle.completions_total").absolute(0);
    metrics::counter!("lifecycle.timeouts_total").absolute(0);

    metrics::counter!("batcher.rows_written_total").absolute(0);
    metrics::counter!("batcher.flush_failures_total").absolute(0);
    metrics::gauge!("batcher.pending_rows").set(0.0);

    metrics::counter!("scheduler.circuit_breaker_trips_total").absolute(0);

    metrics::gauge!("process.uptime_seconds").set(0.0);
}

/// Background task updating process-level gauges on a fixed cadence,
/// mirroring the teacher's `process_metrics_task` minus the HTTP
/// exposition it fed.
pub async fn process_metrics_task() {
    let start = Instant::now();
    loop {
        metrics::gauge!("process.uptime_seconds").set(start.elapsed().as_secs() as f64);

        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
                for line in status.lines() {
                    if let Some(kb_str) = line.strip_prefix("VmRSS:")
                        && let Some(kb) = kb_str.split_whitespace().next().and_then(|s| s.parse::<f64>().ok())
                    {
                        metrics::gauge!("process.memory_bytes").set(kb * 1024.0);
                        break;
                    }
                }
            }
        }

        sleep(Duration::from_secs(5)).await;
    }
}
