//! # Metrics Collection
//!
//! Counters for authentication and account provisioning outcomes. The
//! `metrics` macros are no-ops until a recorder is installed, so calling the
//! helpers below is always safe; the Prometheus exporter is only started when
//! a metrics port is configured.

use std::net::SocketAddr;

use ::tracing::info;
use metrics::{counter, describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::ObservabilityConfig;
use crate::errors::{Result, SchoolError};

/// Install the Prometheus exporter when `metrics_port` is non-zero.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<bool> {
    let Some(metrics_addr) = config.metrics_bind_address() else {
        return Ok(false);
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        SchoolError::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| SchoolError::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    describe_metrics();

    info!(metrics_addr = %metrics_addr, service_name = %config.service_name, "Metrics exporter started");
    Ok(true)
}

fn describe_metrics() {
    describe_counter!(
        "auth_logins_total",
        Unit::Count,
        "Login attempts by outcome (success, invalid_credentials)"
    );
    describe_counter!(
        "auth_token_rejections_total",
        Unit::Count,
        "Access tokens rejected by the authentication middleware, by reason"
    );
    describe_counter!(
        "auth_setup_tokens_total",
        Unit::Count,
        "Password setup token events (issued, consumed, rejected)"
    );
    describe_counter!(
        "accounts_provisioned_total",
        Unit::Count,
        "Accounts created through the invitation flow, by role and mail outcome"
    );
}

/// Record a login attempt outcome
pub fn record_login(outcome: &str) {
    counter!("auth_logins_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a rejected access token
pub fn record_token_rejection(reason: &str) {
    counter!("auth_token_rejections_total", "reason" => reason.to_string()).increment(1);
}

/// Record a setup token lifecycle event
pub fn record_setup_token(event: &str) {
    counter!("auth_setup_tokens_total", "event" => event.to_string()).increment(1);
}

/// Record an account created through the invitation flow
pub fn record_account_provisioned(role: &str, email_sent: bool) {
    counter!(
        "accounts_provisioned_total",
        "role" => role.to_string(),
        "email_sent" => email_sent.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_exporter_is_a_no_op() {
        let config = ObservabilityConfig { metrics_port: 0, ..Default::default() };
        assert!(!init_metrics(&config).unwrap());
    }

    #[test]
    fn recording_without_recorder_does_not_panic() {
        record_login("success");
        record_token_rejection("expired");
        record_setup_token("issued");
        record_account_provisioned("TEACHER", false);
    }
}
