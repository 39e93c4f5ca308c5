//! In-memory storage backends
//!
//! Used by `STORAGE_BACKEND=memory` for local development and by the test
//! suite. Each transition holds the store lock for its whole check-and-mutate,
//! which gives the same atomicity as the SQL transactions. The lock is a
//! synchronous mutex and is never held across an await point.

use crate::auth::account::{Account, NewAccount, ProfileUpdate};
use crate::auth::team::{DissolvedTeam, NewTeam, Team, TeamMember};
use crate::domain::{AccountId, TeamId};
use crate::errors::{HackathonError, Result};
use crate::storage::repositories::team::{
    already_in_team, membership_changed, not_in_team, not_leader, team_full,
};
use crate::storage::repositories::{
    conflict_for_constraint, AccountRepository, LeaveOutcome, PasscodeCache, TeamRepository,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredAccount {
    account: Account,
    password_hash: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<AccountId, StoredAccount>,
    teams: HashMap<TeamId, Team>,
}

impl MemoryState {
    fn by_email(&self, email: &str) -> Option<&StoredAccount> {
        self.accounts.values().find(|stored| stored.account.email == email)
    }

    fn by_email_mut(&mut self, email: &str) -> Option<&mut StoredAccount> {
        self.accounts.values_mut().find(|stored| stored.account.email == email)
    }

    fn account(&self, id: &AccountId) -> Result<&Account> {
        self.accounts
            .get(id)
            .map(|stored| &stored.account)
            .ok_or_else(|| HackathonError::not_found("account", id.as_str()))
    }

    fn account_mut(&mut self, id: &AccountId) -> Result<&mut Account> {
        self.accounts
            .get_mut(id)
            .map(|stored| &mut stored.account)
            .ok_or_else(|| HackathonError::not_found("account", id.as_str()))
    }

    /// The caller's team and leader flag, read from the live account.
    fn callers_team(&self, id: &AccountId) -> Result<(TeamId, bool)> {
        let account = self.account(id)?;
        let team_id = account.team_id.clone().ok_or_else(not_in_team)?;
        if !self.teams.contains_key(&team_id) {
            return Err(membership_changed());
        }
        Ok((team_id, account.is_leader))
    }

    fn members(&self, team_id: &TeamId) -> Vec<TeamMember> {
        let mut members: Vec<TeamMember> = self
            .accounts
            .values()
            .filter(|stored| stored.account.team_id.as_ref() == Some(team_id))
            .map(|stored| member_view(&stored.account))
            .collect();
        members.sort_by(|a, b| b.is_leader.cmp(&a.is_leader).then_with(|| a.id.cmp(&b.id)));
        members
    }

    fn name_taken(&self, name: &str, except: Option<&TeamId>) -> bool {
        let lowered = name.to_lowercase();
        self.teams
            .values()
            .any(|team| Some(&team.id) != except && team.name.to_lowercase() == lowered)
    }

    fn clear_affiliation(&mut self, id: &AccountId) -> Result<()> {
        let account = self.account_mut(id)?;
        account.team_id = None;
        account.is_leader = false;
        account.updated_at = Utc::now();
        Ok(())
    }

    fn dissolve(&mut self, team_id: &TeamId) -> Result<DissolvedTeam> {
        let former_members = self.members(team_id);
        for member in &former_members {
            self.clear_affiliation(&member.id)?;
        }
        let team = self
            .teams
            .remove(team_id)
            .ok_or_else(|| HackathonError::not_found("team", team_id.as_str()))?;
        Ok(DissolvedTeam { team, former_members })
    }

    fn remove_member(&mut self, team_id: &TeamId, member: &AccountId) -> Result<Team> {
        let team = self
            .teams
            .get_mut(team_id)
            .ok_or_else(|| HackathonError::not_found("team", team_id.as_str()))?;
        if team.member_count <= 1 {
            return Err(HackathonError::internal("Team member count would drop below one"));
        }
        team.member_count -= 1;
        team.updated_at = Utc::now();
        let team = team.clone();

        self.clear_affiliation(member)?;
        Ok(team)
    }
}

fn member_view(account: &Account) -> TeamMember {
    TeamMember {
        id: account.id.clone(),
        email: account.email.clone(),
        first_name: account.first_name.clone(),
        last_name: account.last_name.clone(),
        reg_no: account.reg_no.clone(),
        is_leader: account.is_leader,
    }
}

fn unique(constraint: &str) -> HackathonError {
    conflict_for_constraint(constraint)
        .unwrap_or_else(|| HackathonError::internal(format!("Unknown constraint {}", constraint)))
}

/// Accounts and teams held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| HackathonError::internal("In-memory store lock poisoned"))
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account> {
        let mut state = self.lock()?;
        if state.by_email(&account.email).is_some() {
            return Err(unique("users_email_key"));
        }

        let now = Utc::now();
        let created = Account {
            id: account.id.clone(),
            email: account.email,
            first_name: None,
            last_name: None,
            phone_no: None,
            gender: None,
            reg_no: None,
            github_profile: None,
            role: account.role,
            team_id: None,
            is_leader: false,
            is_verified: false,
            is_profile_complete: false,
            is_banned: false,
            created_at: now,
            updated_at: now,
        };
        state.accounts.insert(
            account.id,
            StoredAccount { account: created.clone(), password_hash: account.password_hash },
        );
        Ok(created)
    }

    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        Ok(self.lock()?.accounts.get(id).map(|stored| stored.account.clone()))
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self.lock()?.by_email(email).map(|stored| stored.account.clone()))
    }

    async fn get_account_with_password(&self, email: &str) -> Result<Option<(Account, String)>> {
        Ok(self
            .lock()?
            .by_email(email)
            .map(|stored| (stored.account.clone(), stored.password_hash.clone())))
    }

    async fn mark_verified(&self, email: &str) -> Result<Account> {
        let mut state = self.lock()?;
        let stored =
            state.by_email_mut(email).ok_or_else(|| HackathonError::not_found("account", email))?;
        stored.account.is_verified = true;
        stored.account.updated_at = Utc::now();
        Ok(stored.account.clone())
    }

    async fn complete_profile(&self, id: &AccountId, profile: ProfileUpdate) -> Result<Account> {
        let mut state = self.lock()?;
        for stored in state.accounts.values() {
            if &stored.account.id == id {
                continue;
            }
            if stored.account.phone_no.as_deref() == Some(profile.phone_no.as_str()) {
                return Err(unique("users_phone_no_key"));
            }
            if stored.account.reg_no.as_deref() == Some(profile.reg_no.as_str()) {
                return Err(unique("users_reg_no_key"));
            }
        }

        let account = state.account_mut(id)?;
        account.first_name = Some(profile.first_name);
        account.last_name = Some(profile.last_name);
        account.phone_no = Some(profile.phone_no);
        account.gender = Some(profile.gender);
        account.reg_no = Some(profile.reg_no);
        account.github_profile = Some(profile.github_profile);
        account.is_profile_complete = true;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn update_password(&self, email: &str, password_hash: String) -> Result<()> {
        let mut state = self.lock()?;
        let stored =
            state.by_email_mut(email).ok_or_else(|| HackathonError::not_found("account", email))?;
        stored.password_hash = password_hash;
        stored.account.updated_at = Utc::now();
        Ok(())
    }

    async fn set_banned(&self, email: &str, banned: bool) -> Result<Account> {
        let mut state = self.lock()?;
        let stored =
            state.by_email_mut(email).ok_or_else(|| HackathonError::not_found("account", email))?;
        stored.account.is_banned = banned;
        stored.account.updated_at = Utc::now();
        Ok(stored.account.clone())
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }
}

#[async_trait]
impl TeamRepository for MemoryStore {
    async fn create_team_with_leader(&self, leader: &AccountId, team: NewTeam) -> Result<Team> {
        let mut state = self.lock()?;
        if state.account(leader)?.team_id.is_some() {
            return Err(already_in_team());
        }
        if state.name_taken(&team.name, None) {
            return Err(unique("teams_name_lower_key"));
        }
        if state.teams.values().any(|existing| existing.code == team.code) {
            return Err(unique("teams_code_key"));
        }

        let now = Utc::now();
        let created = Team {
            id: team.id.clone(),
            name: team.name,
            code: team.code,
            member_count: 1,
            round_qualified: 0,
            is_banned: false,
            created_at: now,
            updated_at: now,
        };
        state.teams.insert(team.id.clone(), created.clone());

        let account = state.account_mut(leader)?;
        account.team_id = Some(team.id);
        account.is_leader = true;
        account.updated_at = now;
        Ok(created)
    }

    async fn join_team(&self, account: &AccountId, code: &str, capacity: i32) -> Result<Team> {
        let mut state = self.lock()?;
        let team_id = state
            .teams
            .values()
            .find(|team| team.code == code)
            .map(|team| team.id.clone())
            .ok_or_else(|| HackathonError::not_found("team", code))?;

        if state.account(account)?.team_id.is_some() {
            return Err(already_in_team());
        }

        let team = state
            .teams
            .get_mut(&team_id)
            .ok_or_else(|| HackathonError::not_found("team", code))?;
        if team.is_banned {
            return Err(HackathonError::forbidden("This team has been banned"));
        }
        if team.member_count >= capacity {
            return Err(team_full());
        }
        team.member_count += 1;
        team.updated_at = Utc::now();
        let team = team.clone();

        let joined = state.account_mut(account)?;
        joined.team_id = Some(team_id);
        joined.is_leader = false;
        joined.updated_at = Utc::now();
        Ok(team)
    }

    async fn leave_team(&self, account: &AccountId) -> Result<LeaveOutcome> {
        let mut state = self.lock()?;
        let (team_id, is_leader) = state.callers_team(account)?;
        if is_leader {
            Ok(LeaveOutcome::Dissolved(state.dissolve(&team_id)?))
        } else {
            Ok(LeaveOutcome::Left(state.remove_member(&team_id, account)?))
        }
    }

    async fn dissolve_team(&self, leader: &AccountId) -> Result<DissolvedTeam> {
        let mut state = self.lock()?;
        let (team_id, is_leader) = state.callers_team(leader)?;
        if !is_leader {
            return Err(not_leader("delete the team"));
        }
        state.dissolve(&team_id)
    }

    async fn kick_member(&self, leader: &AccountId, target: &AccountId) -> Result<Team> {
        if leader == target {
            return Err(HackathonError::validation(
                "The team leader cannot be kicked; leave or delete the team instead",
            ));
        }

        let mut state = self.lock()?;
        let (team_id, is_leader) = state.callers_team(leader)?;
        if !is_leader {
            return Err(not_leader("kick members"));
        }
        if state.account(target)?.team_id.as_ref() != Some(&team_id) {
            return Err(HackathonError::not_found("team member", target.as_str()));
        }
        state.remove_member(&team_id, target)
    }

    async fn rename_team(&self, leader: &AccountId, name: &str) -> Result<Team> {
        let mut state = self.lock()?;
        let (team_id, is_leader) = state.callers_team(leader)?;
        if !is_leader {
            return Err(not_leader("rename the team"));
        }
        if state.name_taken(name, Some(&team_id)) {
            return Err(unique("teams_name_lower_key"));
        }

        let team = state
            .teams
            .get_mut(&team_id)
            .ok_or_else(|| HackathonError::not_found("team", team_id.as_str()))?;
        team.name = name.to_string();
        team.updated_at = Utc::now();
        Ok(team.clone())
    }

    async fn set_team_banned(&self, id: &TeamId, banned: bool) -> Result<Team> {
        let mut state = self.lock()?;
        let team = state
            .teams
            .get_mut(id)
            .ok_or_else(|| HackathonError::not_found("team", id.as_str()))?;
        team.is_banned = banned;
        team.updated_at = Utc::now();
        Ok(team.clone())
    }

    async fn get_team(&self, id: &TeamId) -> Result<Option<Team>> {
        Ok(self.lock()?.teams.get(id).cloned())
    }

    async fn list_members(&self, id: &TeamId) -> Result<Vec<TeamMember>> {
        Ok(self.lock()?.members(id))
    }
}

#[derive(Debug, Clone)]
struct PasscodeEntry {
    value: String,
    expires_at: Instant,
}

/// TTL map for passcodes. Expired entries are treated as absent on read and
/// removed by [`PasscodeCache::purge_expired`].
#[derive(Debug, Default)]
pub struct MemoryPasscodeCache {
    entries: DashMap<String, PasscodeEntry>,
}

impl MemoryPasscodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PasscodeCache for MemoryPasscodeCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            PasscodeEntry { value: value.to_string(), expires_at: Instant::now() + ttl },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let live = self
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone());
        if live.is_none() {
            debug!("Passcode absent or expired");
        }
        Ok(live)
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str, value: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove_if(key, |_, entry| entry.value == value && entry.expires_at > now)
            .is_some())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}
