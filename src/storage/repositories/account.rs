//! Account repository
//!
//! Point lookups and mutations on participant accounts. Team affiliation is
//! only ever changed through [`super::team::TeamRepository`] so that every
//! membership transition happens in one transaction.

use crate::auth::account::{Account, NewAccount, ProfileUpdate, Role};
use crate::domain::{AccountId, TeamId};
use crate::errors::{HackathonError, Result};
use crate::storage::repositories::classify_write_error;
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::instrument;

pub(crate) const ACCOUNT_COLUMNS: &str = "id, email, first_name, last_name, phone_no, gender, \
     reg_no, github_profile, role, team_id, is_leader, is_verified, is_profile_complete, \
     is_banned, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub(crate) struct AccountRow {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_no: Option<String>,
    pub gender: Option<String>,
    pub reg_no: Option<String>,
    pub github_profile: Option<String>,
    pub role: String,
    pub team_id: Option<String>,
    pub is_leader: bool,
    pub is_verified: bool,
    pub is_profile_complete: bool,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct AccountWithPasswordRow {
    #[sqlx(flatten)]
    account: AccountRow,
    password_hash: String,
}

impl TryFrom<AccountRow> for Account {
    type Error = HackathonError;

    fn try_from(row: AccountRow) -> Result<Self> {
        let role = Role::from_str(&row.role)
            .map_err(|e| HackathonError::internal(format!("Corrupt account row: {}", e)))?;

        Ok(Account {
            id: AccountId::from_string(row.id),
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            phone_no: row.phone_no,
            gender: row.gender,
            reg_no: row.reg_no,
            github_profile: row.github_profile,
            role,
            team_id: row.team_id.map(TeamId::from_string),
            is_leader: row.is_leader,
            is_verified: row.is_verified,
            is_profile_complete: row.is_profile_complete,
            is_banned: row.is_banned,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Create a new, unverified account with no team
    async fn create_account(&self, account: NewAccount) -> Result<Account>;

    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>>;

    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Get an account with its password hash for authentication
    async fn get_account_with_password(&self, email: &str) -> Result<Option<(Account, String)>>;

    async fn mark_verified(&self, email: &str) -> Result<Account>;

    /// Store profile fields and flag the profile complete
    async fn complete_profile(&self, id: &AccountId, profile: ProfileUpdate) -> Result<Account>;

    async fn update_password(&self, email: &str, password_hash: String) -> Result<()>;

    async fn set_banned(&self, email: &str, banned: bool) -> Result<Account>;

    /// Cheap round trip used by the health probe
    async fn ping(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SqlxAccountRepository {
    pool: DbPool,
}

impl SqlxAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(&self, column: &str, value: &str, context: &str) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE {column} = $1");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HackathonError::database(e, context))?;

        row.map(Account::try_from).transpose()
    }
}

#[async_trait]
impl AccountRepository for SqlxAccountRepository {
    #[instrument(skip(self, account), fields(account_id = %account.id), name = "db_create_account")]
    async fn create_account(&self, account: NewAccount) -> Result<Account> {
        let sql = format!(
            "INSERT INTO users (id, email, password_hash, role) VALUES ($1, $2, $3, $4) RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(&account.id)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, "Failed to create account"))?;

        Account::try_from(row)
    }

    #[instrument(skip(self), fields(account_id = %id), name = "db_get_account")]
    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        self.fetch_one_by("id", id.as_str(), "Failed to fetch account").await
    }

    #[instrument(skip(self), name = "db_get_account_by_email")]
    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.fetch_one_by("email", email, "Failed to fetch account by email").await
    }

    #[instrument(skip(self), name = "db_get_account_with_password")]
    async fn get_account_with_password(&self, email: &str) -> Result<Option<(Account, String)>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS}, password_hash FROM users WHERE email = $1");
        let row = sqlx::query_as::<_, AccountWithPasswordRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to fetch account credentials"))?;

        row.map(|r| Ok::<_, HackathonError>((Account::try_from(r.account)?, r.password_hash)))
            .transpose()
    }

    #[instrument(skip(self), name = "db_mark_verified")]
    async fn mark_verified(&self, email: &str) -> Result<Account> {
        let sql = format!(
            "UPDATE users SET is_verified = TRUE, updated_at = NOW() WHERE email = $1 RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to mark account verified"))?
            .ok_or_else(|| HackathonError::not_found("account", email))?;

        Account::try_from(row)
    }

    #[instrument(skip(self, profile), fields(account_id = %id), name = "db_complete_profile")]
    async fn complete_profile(&self, id: &AccountId, profile: ProfileUpdate) -> Result<Account> {
        let sql = format!(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, phone_no = $4, gender = $5, reg_no = $6,
                github_profile = $7, is_profile_complete = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.phone_no)
            .bind(&profile.gender)
            .bind(&profile.reg_no)
            .bind(&profile.github_profile)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, "Failed to complete profile"))?
            .ok_or_else(|| HackathonError::not_found("account", id.as_str()))?;

        Account::try_from(row)
    }

    #[instrument(skip(self, password_hash), name = "db_update_password")]
    async fn update_password(&self, email: &str, password_hash: String) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE email = $1",
        )
        .bind(email)
        .bind(&password_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| HackathonError::database(e, "Failed to update password"))?;

        if result.rows_affected() == 0 {
            return Err(HackathonError::not_found("account", email));
        }

        Ok(())
    }

    #[instrument(skip(self), name = "db_set_banned")]
    async fn set_banned(&self, email: &str, banned: bool) -> Result<Account> {
        let sql = format!(
            "UPDATE users SET is_banned = $2, updated_at = NOW() WHERE email = $1 RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(email)
            .bind(banned)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to update ban flag"))?
            .ok_or_else(|| HackathonError::not_found("account", email))?;

        Account::try_from(row)
    }

    async fn ping(&self) -> Result<()> {
        crate::storage::check_connection(&self.pool).await
    }
}
