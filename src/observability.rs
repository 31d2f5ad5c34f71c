use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservation list fetches. Labels: outcome (applied, superseded, or an error label).
pub const FETCHES_TOTAL: &str = "rentdesk_fetches_total";

/// Histogram: fetch latency in seconds, successful or not.
pub const FETCH_DURATION_SECONDS: &str = "rentdesk_fetch_duration_seconds";

/// Counter: status updates sent. Labels: target, outcome.
pub const MUTATIONS_TOTAL: &str = "rentdesk_mutations_total";

// ── Push channel ────────────────────────────────────────────────

/// Counter: push events received. Labels: outcome (matched, ignored, other).
pub const PUSH_EVENTS_TOTAL: &str = "rentdesk_push_events_total";

/// Counter: push channel reconnect attempts.
pub const PUSH_RECONNECTS_TOTAL: &str = "rentdesk_push_reconnects_total";

/// Gauge: running realtime listeners.
pub const LISTENERS_ACTIVE: &str = "rentdesk_listeners_active";

// ── Data quality ────────────────────────────────────────────────

/// Counter: fetched records dropped for not matching the view filter.
pub const RECORDS_OUT_OF_SCOPE_TOTAL: &str = "rentdesk_records_out_of_scope_total";

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
