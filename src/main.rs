use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rentdesk::backend::HttpBackend;
use rentdesk::config::Config;
use rentdesk::dashboard::{Dashboard, DashboardStats};
use rentdesk::fleet::FleetSummary;
use rentdesk::notify::{Notice, NoticeHub};
use rentdesk::push::WsTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    rentdesk::observability::init(config.metrics_port)?;

    info!("rentdesk starting for company {}", config.company_id);
    info!("  api: {}", config.api_url);
    info!("  push: {}", config.push_url);
    info!("  request_timeout: {:?}", config.request_timeout);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let backend = Arc::new(HttpBackend::new(
        config.api_url.clone(),
        config.endpoints.clone(),
        config.request_timeout,
    )?);
    match backend.fetch_company(&config.company_id).await {
        Ok(company) => info!(
            "{} ({}, {}): {}",
            company.name,
            company.location.city,
            company.contact_phone,
            FleetSummary::from_company(&company)
        ),
        Err(e) => warn!("company details unavailable: {e}"),
    }

    let transport = Arc::new(WsTransport::new(config.push_url.clone()));
    let notices = Arc::new(NoticeHub::new());
    let dashboard = Arc::new(Dashboard::new(
        config.company_id.clone(),
        backend,
        transport,
        notices.clone(),
        config.request_timeout,
    )?);

    let reporter = tokio::spawn(report_notices(dashboard.clone(), notices));
    for kind in &config.views {
        dashboard.open(*kind).await?;
    }
    log_stats(&dashboard.stats());

    // Graceful shutdown: wait for SIGTERM/ctrl-c, then tear the listeners down
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    info!("shutdown signal received, closing views");
    dashboard.shutdown().await;
    reporter.abort();
    info!("rentdesk stopped");
    Ok(())
}

/// Log every notice, and the dashboard counters whenever they move.
async fn report_notices(dashboard: Arc<Dashboard>, notices: Arc<NoticeHub>) {
    let mut rx = notices.subscribe();
    let mut last = dashboard.stats();
    loop {
        let notice = match rx.recv().await {
            Ok(notice) => notice,
            Err(RecvError::Lagged(n)) => {
                warn!("{n} notices dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match &notice {
            Notice::FetchFailed { error } | Notice::UpdateFailed { error, .. } | Notice::ConnectionLost { error } => {
                warn!("[{}] {}: {error}", notice.title(), notice.message());
            }
            _ => info!("[{}] {}", notice.title(), notice.message()),
        }
        let stats = dashboard.stats();
        if stats != last {
            log_stats(&stats);
            last = stats;
        }
    }
}

fn log_stats(stats: &DashboardStats) {
    info!(
        "current bookings: {}, pending requests: {}, booking history: {}",
        stats.current_bookings, stats.pending_requests, stats.booking_history
    );
}
