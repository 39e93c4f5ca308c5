//! # Storage and Persistence
//!
//! PostgreSQL connectivity, embedded migrations, and the repositories for
//! accounts, teams and passcodes. [`memory`] holds drop-in in-memory
//! implementations of the same repository traits.

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repositories;

pub use crate::config::DatabaseConfig;

pub use memory::{MemoryPasscodeCache, MemoryStore};
pub use migrations::{list_applied_migrations, validate_migrations, MigrationInfo};
pub use pool::{create_pool, DbPool};
pub use repositories::{
    AccountRepository, LeaveOutcome, PasscodeCache, SqlxAccountRepository, SqlxPasscodeCache,
    SqlxTeamRepository, TeamRepository,
};

use crate::errors::{HackathonError, Result};

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    migrations::run_migrations(pool).await
}

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| HackathonError::database(e, "Database connectivity check failed"))?;

    Ok(())
}
