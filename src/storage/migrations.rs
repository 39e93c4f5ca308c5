//! # Database Migration Management
//!
//! SQL migrations are embedded in the binary and applied in filename order on
//! startup when `auto_migrate` is enabled. Each migration runs in its own
//! transaction and is recorded in `_hackathon_migrations`.

use crate::errors::{HackathonError, Result};
use crate::storage::DbPool;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::{error, info, warn};

/// Embedded migrations as (filename stem, SQL).
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "20250101000001_create_teams",
        include_str!("../../migrations/20250101000001_create_teams.sql"),
    ),
    (
        "20250101000002_create_users",
        include_str!("../../migrations/20250101000002_create_users.sql"),
    ),
    (
        "20250101000003_create_passcodes",
        include_str!("../../migrations/20250101000003_create_passcodes.sql"),
    ),
];

/// Migration information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationInfo {
    pub version: i64,
    pub description: String,
    pub installed_on: chrono::DateTime<chrono::Utc>,
    pub execution_time: i64,
}

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!("Starting database migration process");

    create_migration_table(pool).await?;

    let applied = get_applied_migration_versions(pool).await?;

    let mut migrations_run = 0;
    for (filename, sql) in MIGRATIONS {
        let version = extract_version_from_filename(filename)?;

        if applied.contains(&version) {
            info!(version = version, "Migration already applied: {}", filename);
            continue;
        }

        info!(version = version, "Running migration: {}", filename);
        let start_time = std::time::Instant::now();

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| HackathonError::database(e, "Failed to start migration transaction"))?;

        // raw_sql allows multi-statement migration files
        sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(|e| {
            error!(error = %e, migration = filename, "Migration failed");
            HackathonError::database(e, format!("Migration failed: {}", filename))
        })?;

        let execution_time = start_time.elapsed().as_millis() as i64;

        sqlx::query(
            "INSERT INTO _hackathon_migrations (version, description, execution_time, installed_on) VALUES ($1, $2, $3, $4)",
        )
        .bind(version)
        .bind(filename)
        .bind(execution_time)
        .bind(chrono::Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, migration = filename, "Failed to record migration");
            HackathonError::database(e, format!("Failed to record migration: {}", filename))
        })?;

        tx.commit()
            .await
            .map_err(|e| HackathonError::database(e, "Failed to commit migration transaction"))?;

        migrations_run += 1;
        info!(
            version = version,
            execution_time_ms = execution_time,
            "Migration completed: {}",
            filename
        );
    }

    if migrations_run > 0 {
        info!(count = migrations_run, "Database migrations completed");
    } else {
        info!("No pending migrations");
    }

    Ok(())
}

async fn create_migration_table(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _hackathon_migrations (
            version BIGINT PRIMARY KEY,
            description TEXT NOT NULL,
            execution_time BIGINT NOT NULL,
            installed_on TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
    "#,
    )
    .execute(pool)
    .await
    .map_err(|e| HackathonError::database(e, "Failed to create migration tracking table"))?;

    Ok(())
}

async fn get_applied_migration_versions(pool: &DbPool) -> Result<Vec<i64>> {
    let rows = sqlx::query("SELECT version FROM _hackathon_migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .map_err(|e| HackathonError::database(e, "Failed to get applied migrations"))?;

    Ok(rows.into_iter().map(|row| row.get::<i64, _>("version")).collect())
}

fn extract_version_from_filename(filename: &str) -> Result<i64> {
    let version_str = filename.split('_').next().ok_or_else(|| {
        HackathonError::validation(format!("Invalid migration filename: {}", filename))
    })?;

    version_str.parse::<i64>().map_err(|_| {
        HackathonError::validation(format!("Invalid version in filename: {}", filename))
    })
}

/// List applied migrations, newest last
pub async fn list_applied_migrations(pool: &DbPool) -> Result<Vec<MigrationInfo>> {
    let rows = sqlx::query(
        "SELECT version, description, installed_on, execution_time FROM _hackathon_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| HackathonError::database(e, "Failed to list applied migrations"))?;

    Ok(rows
        .into_iter()
        .map(|row| MigrationInfo {
            version: row.get("version"),
            description: row.get("description"),
            installed_on: row.get("installed_on"),
            execution_time: row.get("execution_time"),
        })
        .collect())
}

/// Whether every embedded migration has been applied. A database that was
/// never migrated has no tracking table and reports `false`.
pub async fn validate_migrations(pool: &DbPool) -> Result<bool> {
    let tracked: bool =
        sqlx::query_scalar("SELECT to_regclass('_hackathon_migrations') IS NOT NULL")
            .fetch_one(pool)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to look up migration table"))?;
    if !tracked {
        warn!("Migration tracking table is missing");
        return Ok(false);
    }

    let applied = get_applied_migration_versions(pool).await?;

    for (filename, _) in MIGRATIONS {
        let version = extract_version_from_filename(filename)?;
        if !applied.contains(&version) {
            warn!(version = version, "Missing migration");
            return Ok(false);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_version() {
        assert_eq!(
            extract_version_from_filename("20250101000001_create_teams").unwrap(),
            20250101000001
        );
        assert!(extract_version_from_filename("create_teams").is_err());
    }

    #[test]
    fn test_migrations_are_ordered() {
        let versions: Vec<i64> = MIGRATIONS
            .iter()
            .map(|(name, _)| extract_version_from_filename(name).unwrap())
            .collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_users_reference_teams() {
        let (_, users_sql) = MIGRATIONS[1];
        assert!(users_sql.contains("REFERENCES teams"));
    }
}
