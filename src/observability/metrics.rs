//! # Metrics Collection
//!
//! Prometheus counters for authentication, passcodes, team transitions and
//! mail delivery. Recording is a no-op until [`init_metrics`] installs the
//! exporter.

use crate::config::ObservabilityConfig;
use crate::errors::{HackathonError, Result};
use ::tracing::info;
use ::metrics::{counter, describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Metrics recorder that tracks application metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record a login or signup outcome
    pub fn record_authentication(&self, status: &str) {
        counter!("auth_authentications_total").increment(1);
        let labels = [("status", status.to_string())];
        counter!("auth_authentications_total", &labels).increment(1);
    }

    /// Record a passcode lifecycle event (issued, consumed, rejected, rolled_back)
    pub fn record_passcode(&self, event: &str) {
        let labels = [("event", event.to_string())];
        counter!("auth_passcodes_total", &labels).increment(1);
    }

    pub fn record_token_refresh(&self, status: &str) {
        let labels = [("status", status.to_string())];
        counter!("auth_token_refreshes_total", &labels).increment(1);
    }

    /// Record a request refused by the account state gate
    pub fn record_gate_rejection(&self, state: &str) {
        let labels = [("state", state.to_string())];
        counter!("auth_gate_rejections_total", &labels).increment(1);
    }

    pub fn record_team_transition(&self, transition: &str, status: &str) {
        let labels = [("transition", transition.to_string()), ("status", status.to_string())];
        counter!("team_transitions_total", &labels).increment(1);
    }

    pub fn record_mail_sent(&self, status: &str) {
        let labels = [("status", status.to_string())];
        counter!("mail_sends_total", &labels).increment(1);
    }

    /// Record a best-effort notification that could not be delivered
    pub fn record_notification_failure(&self, kind: &str) {
        let labels = [("kind", kind.to_string())];
        counter!("notification_failures_total", &labels).increment(1);
    }

    fn describe(&self) {
        describe_counter!(
            "auth_authentications_total",
            Unit::Count,
            "Login and signup attempts by outcome"
        );
        describe_counter!("auth_passcodes_total", Unit::Count, "One-time passcode events");
        describe_counter!("auth_token_refreshes_total", Unit::Count, "Session token rotations");
        describe_counter!(
            "auth_gate_rejections_total",
            Unit::Count,
            "Requests refused by account state"
        );
        describe_counter!("team_transitions_total", Unit::Count, "Team membership transitions");
        describe_counter!("mail_sends_total", Unit::Count, "SMTP send attempts by outcome");
        describe_counter!(
            "notification_failures_total",
            Unit::Count,
            "Best-effort notifications that failed"
        );
    }
}

static METRICS: OnceLock<MetricsRecorder> = OnceLock::new();

/// Install the Prometheus exporter when a metrics port is configured
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let Some(metrics_addr) = config.metrics_bind_address() else {
        info!("Metrics disabled: no metrics port configured");
        return Ok(());
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        HackathonError::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", "hackathon")
        .install()
        .map_err(|e| HackathonError::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    let recorder = METRICS.get_or_init(MetricsRecorder::new);
    recorder.describe();

    info!(metrics_addr = %metrics_addr, "Metrics collection initialized");
    Ok(())
}

/// Get the global metrics recorder
pub fn get_metrics() -> Option<&'static MetricsRecorder> {
    METRICS.get()
}

pub fn record_authentication(status: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_authentication(status);
    }
}

pub fn record_passcode(event: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_passcode(event);
    }
}

pub fn record_token_refresh(status: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_token_refresh(status);
    }
}

pub fn record_gate_rejection(state: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_gate_rejection(state);
    }
}

pub fn record_team_transition(transition: &str, status: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_team_transition(transition, status);
    }
}

pub fn record_mail_sent(status: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_mail_sent(status);
    }
}

pub fn record_notification_failure(kind: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_notification_failure(kind);
    }
}
