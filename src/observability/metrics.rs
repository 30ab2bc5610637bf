//! # Metrics Collection
//!
//! Counters for HSM traffic and secret disclosures, exported through
//! Prometheus when enabled. The `metrics` facade is a no-op until a recorder
//! is installed, so call sites record unconditionally.

use crate::config::ObservabilityConfig;
use crate::errors::{LapsError, Result};
use metrics::{counter, describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

pub const HSM_OPERATIONS_TOTAL: &str = "lapsvault_hsm_operations_total";
pub const HSM_REAUTHENTICATIONS_TOTAL: &str = "lapsvault_hsm_reauthentications_total";
pub const DISCLOSURES_TOTAL: &str = "lapsvault_disclosures_total";
pub const ROTATIONS_TOTAL: &str = "lapsvault_rotations_total";

/// Record one HSM call and its outcome
pub fn record_hsm_operation(operation: &'static str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(HSM_OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
}

/// Record one (re)authentication attempt against the HSM
pub fn record_reauthentication(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(HSM_REAUTHENTICATIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record one cleartext disclosure attempt
pub fn record_disclosure(channel: &'static str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(DISCLOSURES_TOTAL, "channel" => channel, "outcome" => outcome).increment(1);
}

/// Record the end of a two-phase rotation round
pub fn record_rotation(applied: bool) {
    let outcome = if applied { "applied" } else { "rejected_by_device" };
    counter!(ROTATIONS_TOTAL, "outcome" => outcome).increment(1);
}

fn describe_metrics() {
    describe_counter!(
        HSM_OPERATIONS_TOTAL,
        Unit::Count,
        "HSM requests issued, labelled by operation and outcome"
    );
    describe_counter!(
        HSM_REAUTHENTICATIONS_TOTAL,
        Unit::Count,
        "HSM login attempts, labelled by outcome"
    );
    describe_counter!(
        DISCLOSURES_TOTAL,
        Unit::Count,
        "Cleartext password disclosures, labelled by channel and outcome"
    );
    describe_counter!(ROTATIONS_TOTAL, Unit::Count, "Completed password rotation rounds");
}

/// Initialize the Prometheus exporter
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = config.metrics_bind_address();
    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        LapsError::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", crate::APP_NAME)
        .install()
        .map_err(|e| LapsError::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    describe_metrics();

    info!(metrics_addr = %metrics_addr, "Metrics collection initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_disabled() {
        let config = ObservabilityConfig { enable_metrics: false, ..Default::default() };
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_recording_without_exporter_is_noop() {
        record_hsm_operation("encrypt", true);
        record_reauthentication(false);
        record_disclosure("operator", true);
        record_rotation(true);
    }
}
