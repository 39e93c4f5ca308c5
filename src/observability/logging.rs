//! # Structured Logging
//!
//! Subscriber setup and span helpers on top of the tracing ecosystem.

use crate::config::ObservabilityConfig;
use crate::errors::{HackathonError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Create a tracing span for request tracking.
///
/// ```rust,ignore
/// let span = request_span!("POST", "/team/join", account_id = %id);
/// ```
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            account_id = tracing::field::Empty
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| HackathonError::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true).with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| HackathonError::config(format!("Failed to install log subscriber: {}", e)))
}

/// Log the effective configuration without secrets.
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        server_address = %config.server.bind_address(),
        storage_backend = ?config.database.backend,
        access_token_ttl_secs = config.auth.access_token_ttl_seconds,
        refresh_token_ttl_secs = config.auth.refresh_token_ttl_seconds,
        passcode_ttl_secs = config.passcode.ttl_seconds,
        team_capacity = config.teams.capacity,
        smtp_enabled = config.mail.smtp_enabled(),
        mail_channels = config.mail.credentials.len(),
        metrics_port = ?config.observability.metrics_port,
        "Hackathon backend configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = request_span!("GET", "/user/me");
        let _span = request_span!("POST", "/team/join", account_id = "abc");
    }

    #[test]
    fn test_log_config_info() {
        log_config_info(&crate::config::AppConfig::default());
    }

    #[test]
    fn test_invalid_level_is_config_error() {
        std::env::remove_var("RUST_LOG");
        let config = ObservabilityConfig {
            log_level: "hackathon=loud".to_string(),
            ..Default::default()
        };
        assert!(init_logging(&config).is_err());
    }
}
