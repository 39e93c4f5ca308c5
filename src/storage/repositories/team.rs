//! Team repository
//!
//! Every membership transition is one transaction. Locks are always taken in
//! the same order, team row first and then the affected user rows, so two
//! transitions on the same team serialize instead of deadlocking.
//!
//! The account's affiliation is re-read under lock inside the transaction;
//! callers never pass in what they believe the affiliation to be.

use crate::auth::team::{DissolvedTeam, NewTeam, Team, TeamMember};
use crate::domain::{AccountId, TeamId};
use crate::errors::{HackathonError, Result};
use crate::storage::repositories::classify_write_error;
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::instrument;

const TEAM_COLUMNS: &str =
    "id, name, code, member_count, round_qualified, is_banned, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct TeamRow {
    pub id: String,
    pub name: String,
    pub code: String,
    pub member_count: i32,
    pub round_qualified: i32,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TeamRow> for Team {
    fn from(row: TeamRow) -> Self {
        Team {
            id: TeamId::from_string(row.id),
            name: row.name,
            code: row.code,
            member_count: row.member_count,
            round_qualified: row.round_qualified,
            is_banned: row.is_banned,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct TeamMemberRow {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub reg_no: Option<String>,
    pub is_leader: bool,
}

impl From<TeamMemberRow> for TeamMember {
    fn from(row: TeamMemberRow) -> Self {
        TeamMember {
            id: AccountId::from_string(row.id),
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            reg_no: row.reg_no,
            is_leader: row.is_leader,
        }
    }
}

/// Affiliation columns of a user row, read under lock.
#[derive(Debug, Clone, FromRow)]
struct Affiliation {
    pub team_id: Option<String>,
    pub is_leader: bool,
}

/// Result of a member leaving. A leader leaving dissolves the team.
#[derive(Debug, Clone)]
pub enum LeaveOutcome {
    Left(Team),
    Dissolved(DissolvedTeam),
}

pub(crate) fn not_in_team() -> HackathonError {
    HackathonError::conflict("You are not in a team", "team")
}

pub(crate) fn already_in_team() -> HackathonError {
    HackathonError::conflict("You are already in a team", "team")
}

pub(crate) fn team_full() -> HackathonError {
    HackathonError::conflict("Team is full", "team")
}

pub(crate) fn not_leader(action: &str) -> HackathonError {
    HackathonError::forbidden(format!("Only the team leader can {}", action))
}

pub(crate) fn membership_changed() -> HackathonError {
    HackathonError::conflict("Team membership changed, please retry", "team")
}

#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Create a team with `leader` as its founding member (count = 1)
    async fn create_team_with_leader(&self, leader: &AccountId, team: NewTeam) -> Result<Team>;

    /// Join the team identified by `code` if it is not banned and below `capacity`
    async fn join_team(&self, account: &AccountId, code: &str, capacity: i32) -> Result<Team>;

    /// Leave the current team; a leader leaving dissolves it
    async fn leave_team(&self, account: &AccountId) -> Result<LeaveOutcome>;

    /// Dissolve the leader's team, clearing every member's affiliation
    async fn dissolve_team(&self, leader: &AccountId) -> Result<DissolvedTeam>;

    /// Remove `target` from the leader's team
    async fn kick_member(&self, leader: &AccountId, target: &AccountId) -> Result<Team>;

    /// Rename the leader's team
    async fn rename_team(&self, leader: &AccountId, name: &str) -> Result<Team>;

    /// Ban or unban a team. Existing members stay; joins are refused while banned.
    async fn set_team_banned(&self, id: &TeamId, banned: bool) -> Result<Team>;

    async fn get_team(&self, id: &TeamId) -> Result<Option<Team>>;

    async fn list_members(&self, id: &TeamId) -> Result<Vec<TeamMember>>;
}

#[derive(Debug, Clone)]
pub struct SqlxTeamRepository {
    pool: DbPool,
}

impl SqlxTeamRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| HackathonError::database(e, "Failed to start transaction"))
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> Result<()> {
        tx.commit()
            .await
            .map_err(|e| HackathonError::database(e, "Failed to commit transaction"))
    }

    async fn lock_user(
        tx: &mut Transaction<'static, Postgres>,
        id: &AccountId,
    ) -> Result<Affiliation> {
        sqlx::query_as::<_, Affiliation>(
            "SELECT team_id, is_leader FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| HackathonError::database(e, "Failed to lock account"))?
        .ok_or_else(|| HackathonError::not_found("account", id.as_str()))
    }

    async fn lock_team(tx: &mut Transaction<'static, Postgres>, id: &str) -> Result<Option<Team>> {
        let sql = format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, TeamRow>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to lock team"))?;
        Ok(row.map(Team::from))
    }

    /// Unlocked read of the caller's team, then team lock, then user lock.
    /// Fails if the affiliation moved between the read and the lock.
    async fn lock_callers_team(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        account: &AccountId,
    ) -> Result<(Team, Affiliation)> {
        let team_id: Option<String> =
            sqlx::query_scalar("SELECT team_id FROM users WHERE id = $1")
                .bind(account)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| HackathonError::database(e, "Failed to read affiliation"))?
                .ok_or_else(|| HackathonError::not_found("account", account.as_str()))?;

        let team_id = team_id.ok_or_else(not_in_team)?;
        let team = Self::lock_team(tx, &team_id).await?.ok_or_else(membership_changed)?;

        let affiliation = Self::lock_user(tx, account).await?;
        if affiliation.team_id.as_deref() != Some(team.id.as_str()) {
            return Err(membership_changed());
        }

        Ok((team, affiliation))
    }

    async fn dissolve_locked(
        tx: &mut Transaction<'static, Postgres>,
        team: Team,
    ) -> Result<DissolvedTeam> {
        let former_members = sqlx::query_as::<_, TeamMemberRow>(
            r#"
            SELECT id, email, first_name, last_name, reg_no, is_leader
            FROM users WHERE team_id = $1
            ORDER BY is_leader DESC, id
            FOR UPDATE
            "#,
        )
        .bind(&team.id)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| HackathonError::database(e, "Failed to lock team members"))?
        .into_iter()
        .map(TeamMember::from)
        .collect();

        sqlx::query(
            "UPDATE users SET team_id = NULL, is_leader = FALSE, updated_at = NOW() WHERE team_id = $1",
        )
        .bind(&team.id)
        .execute(&mut **tx)
        .await
        .map_err(|e| HackathonError::database(e, "Failed to clear team members"))?;

        sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(&team.id)
            .execute(&mut **tx)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to delete team"))?;

        Ok(DissolvedTeam { team, former_members })
    }

    async fn remove_member_locked(
        tx: &mut Transaction<'static, Postgres>,
        team: &Team,
        member: &AccountId,
    ) -> Result<Team> {
        sqlx::query(
            "UPDATE users SET team_id = NULL, is_leader = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(member)
        .execute(&mut **tx)
        .await
        .map_err(|e| HackathonError::database(e, "Failed to clear affiliation"))?;

        let sql = format!(
            r#"
            UPDATE teams SET member_count = member_count - 1, updated_at = NOW()
            WHERE id = $1 AND member_count > 1
            RETURNING {TEAM_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TeamRow>(&sql)
            .bind(&team.id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to decrement member count"))?
            .ok_or_else(|| HackathonError::internal("Team member count would drop below one"))?;

        Ok(Team::from(row))
    }
}

#[async_trait]
impl TeamRepository for SqlxTeamRepository {
    #[instrument(skip(self, team), fields(account_id = %leader, team_id = %team.id), name = "db_create_team")]
    async fn create_team_with_leader(&self, leader: &AccountId, team: NewTeam) -> Result<Team> {
        let mut tx = self.begin().await?;

        let affiliation = Self::lock_user(&mut tx, leader).await?;
        if affiliation.team_id.is_some() {
            return Err(already_in_team());
        }

        let sql = format!(
            "INSERT INTO teams (id, name, code, member_count) VALUES ($1, $2, $3, 1) RETURNING {TEAM_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TeamRow>(&sql)
            .bind(&team.id)
            .bind(&team.name)
            .bind(&team.code)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify_write_error(e, "Failed to create team"))?;

        sqlx::query(
            "UPDATE users SET team_id = $2, is_leader = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(leader)
        .bind(&team.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| HackathonError::database(e, "Failed to assign team leader"))?;

        Self::commit(tx).await?;
        Ok(Team::from(row))
    }

    #[instrument(skip(self), fields(account_id = %account), name = "db_join_team")]
    async fn join_team(&self, account: &AccountId, code: &str, capacity: i32) -> Result<Team> {
        let mut tx = self.begin().await?;

        let team_id: String = sqlx::query_scalar("SELECT id FROM teams WHERE code = $1 FOR UPDATE")
            .bind(code)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to look up join code"))?
            .ok_or_else(|| HackathonError::not_found("team", code))?;

        let affiliation = Self::lock_user(&mut tx, account).await?;
        if affiliation.team_id.is_some() {
            return Err(already_in_team());
        }

        let sql = format!(
            r#"
            UPDATE teams SET member_count = member_count + 1, updated_at = NOW()
            WHERE id = $1 AND NOT is_banned AND member_count < $2
            RETURNING {TEAM_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TeamRow>(&sql)
            .bind(&team_id)
            .bind(capacity)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to increment member count"))?;

        let row = match row {
            Some(row) => row,
            None => {
                let banned: bool = sqlx::query_scalar("SELECT is_banned FROM teams WHERE id = $1")
                    .bind(&team_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| HackathonError::database(e, "Failed to read team state"))?;
                return Err(if banned {
                    HackathonError::forbidden("This team has been banned")
                } else {
                    team_full()
                });
            }
        };

        sqlx::query(
            "UPDATE users SET team_id = $2, is_leader = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(account)
        .bind(&team_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| HackathonError::database(e, "Failed to set affiliation"))?;

        Self::commit(tx).await?;
        Ok(Team::from(row))
    }

    #[instrument(skip(self), fields(account_id = %account), name = "db_leave_team")]
    async fn leave_team(&self, account: &AccountId) -> Result<LeaveOutcome> {
        let mut tx = self.begin().await?;
        let (team, affiliation) = self.lock_callers_team(&mut tx, account).await?;

        let outcome = if affiliation.is_leader {
            LeaveOutcome::Dissolved(Self::dissolve_locked(&mut tx, team).await?)
        } else {
            LeaveOutcome::Left(Self::remove_member_locked(&mut tx, &team, account).await?)
        };

        Self::commit(tx).await?;
        Ok(outcome)
    }

    #[instrument(skip(self), fields(account_id = %leader), name = "db_dissolve_team")]
    async fn dissolve_team(&self, leader: &AccountId) -> Result<DissolvedTeam> {
        let mut tx = self.begin().await?;
        let (team, affiliation) = self.lock_callers_team(&mut tx, leader).await?;
        if !affiliation.is_leader {
            return Err(not_leader("delete the team"));
        }

        let dissolved = Self::dissolve_locked(&mut tx, team).await?;
        Self::commit(tx).await?;
        Ok(dissolved)
    }

    #[instrument(skip(self), fields(account_id = %leader, target_id = %target), name = "db_kick_member")]
    async fn kick_member(&self, leader: &AccountId, target: &AccountId) -> Result<Team> {
        if leader == target {
            return Err(HackathonError::validation(
                "The team leader cannot be kicked; leave or delete the team instead",
            ));
        }

        let mut tx = self.begin().await?;
        let (team, affiliation) = self.lock_callers_team(&mut tx, leader).await?;
        if !affiliation.is_leader {
            return Err(not_leader("kick members"));
        }

        let target_affiliation = Self::lock_user(&mut tx, target).await?;
        if target_affiliation.team_id.as_deref() != Some(team.id.as_str()) {
            return Err(HackathonError::not_found("team member", target.as_str()));
        }

        let team = Self::remove_member_locked(&mut tx, &team, target).await?;
        Self::commit(tx).await?;
        Ok(team)
    }

    #[instrument(skip(self), fields(account_id = %leader), name = "db_rename_team")]
    async fn rename_team(&self, leader: &AccountId, name: &str) -> Result<Team> {
        let mut tx = self.begin().await?;
        let (team, affiliation) = self.lock_callers_team(&mut tx, leader).await?;
        if !affiliation.is_leader {
            return Err(not_leader("rename the team"));
        }

        let sql = format!(
            "UPDATE teams SET name = $2, updated_at = NOW() WHERE id = $1 RETURNING {TEAM_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TeamRow>(&sql)
            .bind(&team.id)
            .bind(name)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify_write_error(e, "Failed to rename team"))?;

        Self::commit(tx).await?;
        Ok(Team::from(row))
    }

    #[instrument(skip(self), fields(team_id = %id), name = "db_set_team_banned")]
    async fn set_team_banned(&self, id: &TeamId, banned: bool) -> Result<Team> {
        let sql = format!(
            r#"
            UPDATE teams SET is_banned = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {TEAM_COLUMNS}
            "#
        );
        sqlx::query_as::<_, TeamRow>(&sql)
            .bind(id)
            .bind(banned)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to update team ban status"))?
            .map(Team::from)
            .ok_or_else(|| HackathonError::not_found("team", id.as_str()))
    }

    #[instrument(skip(self), fields(team_id = %id), name = "db_get_team")]
    async fn get_team(&self, id: &TeamId) -> Result<Option<Team>> {
        let sql = format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = $1");
        let row = sqlx::query_as::<_, TeamRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to fetch team"))?;

        Ok(row.map(Team::from))
    }

    #[instrument(skip(self), fields(team_id = %id), name = "db_list_team_members")]
    async fn list_members(&self, id: &TeamId) -> Result<Vec<TeamMember>> {
        let rows = sqlx::query_as::<_, TeamMemberRow>(
            r#"
            SELECT id, email, first_name, last_name, reg_no, is_leader
            FROM users WHERE team_id = $1
            ORDER BY is_leader DESC, id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HackathonError::database(e, "Failed to list team members"))?;

        Ok(rows.into_iter().map(TeamMember::from).collect())
    }
}
