// src/observability/mod.rs
//! Logging and metrics setup
//!
//! Counters are emitted through the `metrics` facade and are no-ops until a
//! recorder is installed with `init_metrics`.

use crate::utils::config::TelemetryConfig;
use anyhow::{anyhow, Result};
use metrics::{describe_counter, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

/// Packet events built, labelled by `direction`
pub const EVENTS_TOTAL: &str = "packet_interceptor_events_total";

/// Packets dropped by observers, labelled by `direction`
pub const CANCELLED_TOTAL: &str = "packet_interceptor_cancelled_total";

/// Observer failures, labelled by `direction`
pub const OBSERVER_ERRORS_TOTAL: &str = "packet_interceptor_observer_errors_total";

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `config.log_filter`.
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logs {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
    }
}

/// Install the Prometheus recorder and describe the interceptor's counters
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(EVENTS_TOTAL, Unit::Count, "Packet events dispatched to observers");
    describe_counter!(CANCELLED_TOTAL, Unit::Count, "Packets dropped by observers");
    describe_counter!(
        OBSERVER_ERRORS_TOTAL,
        Unit::Count,
        "Observer failures during dispatch"
    );

    Ok(handle)
}
