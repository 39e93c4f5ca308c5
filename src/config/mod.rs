//! # Configuration Management
//!
//! Settings are read from the process environment (after `dotenvy` has loaded
//! any `.env` file) and validated before the server starts.

pub mod settings;

pub use settings::{
    AppConfig, AuthConfig, DatabaseConfig, MailConfig, MailCredential, ObservabilityConfig,
    PasscodeConfig, SameSitePolicy, ServerConfig, StorageBackend, TeamConfig,
    DEFAULT_TEAM_CAPACITY,
};

use crate::errors::{HackathonError, Result};
use std::str::FromStr;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| HackathonError::config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}

fn env_list(key: &str) -> Vec<String> {
    env_string(key)
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Sender credentials come either as parallel `MAIL_USERS`/`MAIL_PASSWORDS`
/// lists or as numbered `MAIL_<n>_USER`/`MAIL_<n>_PASS` pairs.
fn mail_credentials_from_env() -> Result<Vec<MailCredential>> {
    let users = env_list("MAIL_USERS");
    let passwords = env_list("MAIL_PASSWORDS");
    if users.len() != passwords.len() {
        return Err(HackathonError::config(
            "MAIL_USERS and MAIL_PASSWORDS must list the same number of entries",
        ));
    }

    let mut credentials: Vec<MailCredential> = users
        .into_iter()
        .zip(passwords)
        .map(|(username, password)| MailCredential { username, password })
        .collect();

    for n in 1.. {
        let user = env_string(&format!("MAIL_{}_USER", n));
        let pass = env_string(&format!("MAIL_{}_PASS", n));
        match (user, pass) {
            (Some(username), Some(password)) => {
                credentials.push(MailCredential { username, password })
            }
            (None, None) => break,
            _ => {
                return Err(HackathonError::config(format!(
                    "MAIL_{n}_USER and MAIL_{n}_PASS must be set together"
                )))
            }
        }
    }

    Ok(credentials)
}

impl AppConfig {
    /// Build configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            host: env_string("HOST").unwrap_or(server_defaults.host),
            port: env_parse("PORT", server_defaults.port)?,
            timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS", server_defaults.timeout_seconds)?,
            cors_origins: env_list("CORS_ORIGINS"),
        };

        let db_defaults = DatabaseConfig::default();
        let database = DatabaseConfig {
            backend: env_parse("STORAGE_BACKEND", db_defaults.backend)?,
            url: env_string("DATABASE_URL").unwrap_or(db_defaults.url),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", db_defaults.max_connections)?,
            min_connections: env_parse("DATABASE_MIN_CONNECTIONS", db_defaults.min_connections)?,
            connect_timeout_seconds: env_parse(
                "DATABASE_CONNECT_TIMEOUT_SECONDS",
                db_defaults.connect_timeout_seconds,
            )?,
            idle_timeout_seconds: env_parse(
                "DATABASE_IDLE_TIMEOUT_SECONDS",
                db_defaults.idle_timeout_seconds,
            )?,
            auto_migrate: env_parse("DATABASE_AUTO_MIGRATE", db_defaults.auto_migrate)?,
        };

        let auth_defaults = AuthConfig::default();
        let auth = AuthConfig {
            jwt_secret: env_string("JWT_SECRET").unwrap_or_default(),
            access_token_ttl_seconds: env_parse(
                "ACCESS_TOKEN_TTL_SECONDS",
                auth_defaults.access_token_ttl_seconds,
            )?,
            refresh_token_ttl_seconds: env_parse(
                "REFRESH_TOKEN_TTL_SECONDS",
                auth_defaults.refresh_token_ttl_seconds,
            )?,
            cookie_domain: env_string("COOKIE_DOMAIN"),
            cookie_secure: env_parse("COOKIE_SECURE", auth_defaults.cookie_secure)?,
            same_site: env_parse("COOKIE_SAME_SITE", auth_defaults.same_site)?,
            password_memory_kib: env_parse(
                "PASSWORD_HASH_MEMORY_KIB",
                auth_defaults.password_memory_kib,
            )?,
            password_iterations: env_parse(
                "PASSWORD_HASH_ITERATIONS",
                auth_defaults.password_iterations,
            )?,
            password_parallelism: env_parse(
                "PASSWORD_HASH_PARALLELISM",
                auth_defaults.password_parallelism,
            )?,
        };

        let passcode_defaults = PasscodeConfig::default();
        let passcode = PasscodeConfig {
            ttl_seconds: env_parse("PASSCODE_TTL_SECONDS", passcode_defaults.ttl_seconds)?,
            purge_interval_seconds: env_parse(
                "PASSCODE_PURGE_INTERVAL_SECONDS",
                passcode_defaults.purge_interval_seconds,
            )?,
        };

        let mail_defaults = MailConfig::default();
        let mail = MailConfig {
            smtp_host: env_string("SMTP_HOST"),
            smtp_port: env_parse("SMTP_PORT", mail_defaults.smtp_port)?,
            from_address: env_string("MAIL_FROM").unwrap_or(mail_defaults.from_address),
            credentials: mail_credentials_from_env()?,
            send_timeout_seconds: env_parse(
                "MAIL_SEND_TIMEOUT_SECONDS",
                mail_defaults.send_timeout_seconds,
            )?,
        };

        let teams = TeamConfig {
            capacity: env_parse("TEAM_CAPACITY", DEFAULT_TEAM_CAPACITY)?,
        };

        let obs_defaults = ObservabilityConfig::default();
        let observability = ObservabilityConfig {
            log_level: env_string("LOG_LEVEL").unwrap_or(obs_defaults.log_level),
            json_logging: env_parse("LOG_JSON", obs_defaults.json_logging)?,
            metrics_port: env_string("METRICS_PORT")
                .map(|raw| {
                    raw.trim()
                        .parse()
                        .map_err(|e| HackathonError::config(format!("Invalid METRICS_PORT: {}", e)))
                })
                .transpose()?,
        };

        let config = Self {
            server,
            database,
            auth,
            passcode,
            mail,
            teams,
            observability,
        };

        if config.mail.smtp_enabled() && config.mail.credentials.is_empty() {
            return Err(HackathonError::config(
                "SMTP_HOST is set but no sender credentials were configured",
            ));
        }

        Ok(config)
    }
}
