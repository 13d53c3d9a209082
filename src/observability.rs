use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests. Labels: method, route, status.
pub const REQUESTS_TOTAL: &str = "unibook_requests_total";

/// Histogram: request latency in seconds. Labels: method, route.
pub const REQUEST_DURATION_SECONDS: &str = "unibook_request_duration_seconds";

// ── Admission ───────────────────────────────────────────────────

/// Counter: bookings admitted. Labels: kind.
pub const BOOKINGS_ADMITTED_TOTAL: &str = "unibook_bookings_admitted_total";

/// Counter: bookings rejected by admission. Labels: kind, reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "unibook_bookings_rejected_total";

/// Counter: bookings cancelled or withdrawn. Labels: kind, status.
pub const BOOKINGS_CLOSED_TOTAL: &str = "unibook_bookings_closed_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: resources held by the engine.
pub const RESOURCES_ACTIVE: &str = "unibook_resources_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "unibook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "unibook_wal_flush_batch_size";

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

/// Record one finished HTTP request.
pub fn record_request(method: &str, route: &str, status: u16, elapsed_secs: f64) {
    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(elapsed_secs);
}
