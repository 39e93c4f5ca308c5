//! # Hackathon
//!
//! Backend for hackathon registration: account signup with emailed one-time
//! passcodes, cookie-carried session tokens, and team formation with a
//! leader, a join code and a fixed capacity.
//!
//! ## Architecture
//!
//! ```text
//! axum router → auth middleware (account state gate) → services → repositories
//!                                                          ↓
//!                                              mail pool (passcodes, notices)
//! ```
//!
//! Storage is PostgreSQL through `sqlx`, or process memory for development.

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod mail;
pub mod observability;
pub mod services;
pub mod startup;
pub mod storage;

pub use config::AppConfig;
pub use errors::{HackathonError, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "hackathon");
    }
}
