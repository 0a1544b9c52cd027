//! Logging, tracing, and metrics bootstrap.

use std::net::SocketAddr;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use shelf_kernel::settings::{LogFormat, TelemetrySettings};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// keeps the first subscriber.
pub fn init(settings: &TelemetrySettings) {
    let filter = build_filter(settings);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match settings.log_format {
        LogFormat::Json => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Pretty => builder.try_init(),
    };

    if installed.is_ok() {
        tracing::info!(
            target: "shelf-telemetry",
            format = ?settings.log_format,
            level = %settings.log_level,
            "telemetry initialized"
        );
    }
}

fn build_filter(settings: &TelemetrySettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Start the Prometheus scrape endpoint when `prometheus_bind` is set.
///
/// Must run inside a Tokio runtime; the listener is spawned onto it.
pub fn init_metrics(settings: &TelemetrySettings) -> anyhow::Result<Option<SocketAddr>> {
    let Some(bind) = settings.prometheus_bind.as_deref() else {
        return Ok(None);
    };

    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid prometheus bind address '{}'", bind))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install prometheus exporter")?;

    tracing::info!(target: "shelf-telemetry", %addr, "prometheus exporter listening");
    Ok(Some(addr))
}
