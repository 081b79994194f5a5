use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: feasible slots returned by enumeration.
pub const SLOTS_ENUMERATED_TOTAL: &str = "visitchain_slots_enumerated_total";

/// Histogram: slot enumeration latency in seconds.
pub const ENUMERATE_DURATION_SECONDS: &str = "visitchain_enumerate_duration_seconds";

/// Counter: placement repairs at commit time. Labels: outcome (clean, reassigned, conflict).
pub const REPAIRS_TOTAL: &str = "visitchain_repairs_total";

/// Counter: visits committed.
pub const VISITS_COMMITTED_TOTAL: &str = "visitchain_visits_committed_total";

/// Counter: bookings cancelled. Labels: reason.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "visitchain_bookings_cancelled_total";

/// Counter: cascade group resolutions. Labels: source.
pub const CASCADE_RESOLUTIONS_TOTAL: &str = "visitchain_cascade_resolutions_total";

/// Counter: cascade batches that failed to commit.
pub const BATCH_COMMIT_FAILURES_TOTAL: &str = "visitchain_batch_commit_failures_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Install the `tracing` subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
