//! Team lifecycle: create, join, leave, kick, rename and dissolve.
//!
//! Every transition runs as one storage transaction that re-reads the
//! caller's current affiliation, so a stale session cannot act on a team the
//! caller already left. Dissolution notices go out after the commit.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use validator::Validate;

use crate::auth::account::Account;
use crate::auth::team::{
    normalize_team_name, CreateTeamRequest, DissolvedTeam, JoinTeamRequest, KickMemberRequest,
    NewTeam, RenameTeamRequest, Team, TeamMember,
};
use crate::domain::TeamId;
use crate::errors::{HackathonError, Result};
use crate::observability::metrics;
use crate::services::Notifier;
use crate::storage::{LeaveOutcome, TeamRepository};

/// Fresh join codes tried before a create gives up on collisions.
const JOIN_CODE_ATTEMPTS: usize = 3;

/// What happened when a member left.
#[derive(Debug, Clone)]
pub enum LeaveResult {
    Left(Team),
    /// The leader left, so the team is gone. `notified` counts attempted sends.
    Dissolved { team: Team, notified: usize },
}

#[derive(Clone)]
pub struct TeamService {
    teams: Arc<dyn TeamRepository>,
    notifier: Notifier,
    capacity: i32,
}

fn record<T>(transition: &str, result: &Result<T>) {
    let status = match result {
        Ok(_) => "success",
        Err(HackathonError::Conflict { .. }) => "conflict",
        Err(HackathonError::Forbidden { .. }) => "forbidden",
        Err(_) => "error",
    };
    metrics::record_team_transition(transition, status);
}

impl TeamService {
    pub fn new(teams: Arc<dyn TeamRepository>, notifier: Notifier, capacity: i32) -> Self {
        Self { teams, notifier, capacity }
    }

    pub fn capacity(&self) -> i32 {
        self.capacity
    }

    /// Found a team with `account` as its leader.
    #[instrument(skip(self, account, request), fields(account_id = %account.id))]
    pub async fn create(&self, account: &Account, request: CreateTeamRequest) -> Result<Team> {
        let request = CreateTeamRequest { name: normalize_team_name(&request.name) };
        request.validate()?;
        let mut new_team = NewTeam::new(request.name);

        let mut attempt = 1;
        let result = loop {
            match self.teams.create_team_with_leader(&account.id, new_team.clone()).await {
                Err(HackathonError::Conflict { resource_type, .. })
                    if resource_type == "join_code" && attempt < JOIN_CODE_ATTEMPTS =>
                {
                    warn!(attempt, "Join code collision, regenerating");
                    attempt += 1;
                    new_team = new_team.with_new_code();
                }
                other => break other,
            }
        };

        record("create", &result);
        let team = result?;
        info!(team_id = %team.id, team_name = %team.name, "Team created");
        Ok(team)
    }

    #[instrument(skip(self, account, request), fields(account_id = %account.id))]
    pub async fn join(&self, account: &Account, request: JoinTeamRequest) -> Result<Team> {
        let request = JoinTeamRequest { code: request.code.trim().to_ascii_uppercase() };
        request.validate()?;

        let result = self.teams.join_team(&account.id, &request.code, self.capacity).await;
        record("join", &result);
        let team = result?;
        info!(team_id = %team.id, member_count = team.member_count, "Joined team");
        Ok(team)
    }

    /// Leave the current team. A leader leaving dissolves it.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn leave(&self, account: &Account) -> Result<LeaveResult> {
        let result = self.teams.leave_team(&account.id).await;
        record("leave", &result);

        match result? {
            LeaveOutcome::Left(team) => {
                info!(team_id = %team.id, member_count = team.member_count, "Left team");
                Ok(LeaveResult::Left(team))
            }
            LeaveOutcome::Dissolved(dissolved) => {
                let notified = self.after_dissolution(&dissolved).await;
                Ok(LeaveResult::Dissolved { team: dissolved.team, notified })
            }
        }
    }

    /// Dissolve the caller's team. Leader only.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn delete(&self, account: &Account) -> Result<(Team, usize)> {
        let result = self.teams.dissolve_team(&account.id).await;
        record("delete", &result);
        let dissolved = result?;

        let notified = self.after_dissolution(&dissolved).await;
        Ok((dissolved.team, notified))
    }

    async fn after_dissolution(&self, dissolved: &DissolvedTeam) -> usize {
        info!(
            team_id = %dissolved.team.id,
            former_members = dissolved.former_members.len(),
            "Team dissolved"
        );
        self.notifier.team_dissolved(dissolved).await
    }

    #[instrument(skip(self, account, request), fields(account_id = %account.id, target_id = %request.id))]
    pub async fn kick(&self, account: &Account, request: KickMemberRequest) -> Result<Team> {
        let result = self.teams.kick_member(&account.id, &request.id).await;
        record("kick", &result);
        let team = result?;
        info!(team_id = %team.id, member_count = team.member_count, "Member kicked");
        Ok(team)
    }

    #[instrument(skip(self, account, request), fields(account_id = %account.id))]
    pub async fn rename(&self, account: &Account, request: RenameTeamRequest) -> Result<Team> {
        let request = RenameTeamRequest { name: normalize_team_name(&request.name) };
        request.validate()?;

        let result = self.teams.rename_team(&account.id, &request.name).await;
        record("rename", &result);
        let team = result?;
        info!(team_id = %team.id, team_name = %team.name, "Team renamed");
        Ok(team)
    }

    /// Ban or unban a team on an admin's behalf.
    #[instrument(skip(self, admin), fields(admin_id = %admin.id))]
    pub async fn set_banned(
        &self,
        admin: &Account,
        team_id: &TeamId,
        banned: bool,
    ) -> Result<Team> {
        if !admin.is_admin() {
            return Err(HackathonError::forbidden("Admin role required"));
        }

        let result = self.teams.set_team_banned(team_id, banned).await;
        record(if banned { "ban" } else { "unban" }, &result);
        let team = result?;
        info!(team_id = %team.id, banned, "Team ban status changed");
        Ok(team)
    }

    /// The caller's team and its members, leader first.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn members(&self, account: &Account) -> Result<(Team, Vec<TeamMember>)> {
        let team_id = account
            .team_id
            .as_ref()
            .ok_or_else(|| HackathonError::conflict("You are not in a team", "team"))?;

        let team = self.require_team(team_id).await?;
        let members = self.teams.list_members(team_id).await?;
        Ok((team, members))
    }

    /// Look up a team the caller belongs to, if any.
    pub async fn team_of(&self, account: &Account) -> Result<Option<Team>> {
        match &account.team_id {
            Some(team_id) => self.teams.get_team(team_id).await,
            None => Ok(None),
        }
    }

    async fn require_team(&self, id: &TeamId) -> Result<Team> {
        self.teams.get_team(id).await?.ok_or_else(|| HackathonError::not_found("team", id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::account::{NewAccount, Role};
    use crate::domain::AccountId;
    use crate::mail::ConsoleMailSender;
    use crate::storage::{AccountRepository, MemoryStore};

    struct Harness {
        service: TeamService,
        store: Arc<MemoryStore>,
    }

    fn harness(capacity: i32) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let notifier = Notifier::new(Arc::new(ConsoleMailSender::new()));
        Harness { service: TeamService::new(store.clone(), notifier, capacity), store }
    }

    impl Harness {
        async fn account(&self, email: &str) -> Account {
            self.store
                .create_account(NewAccount {
                    id: AccountId::new(),
                    email: email.to_string(),
                    password_hash: "unused".to_string(),
                    role: Role::Student,
                })
                .await
                .unwrap()
        }

        async fn reload(&self, account: &Account) -> Account {
            self.store.get_account(&account.id).await.unwrap().unwrap()
        }
    }

    fn create(name: &str) -> CreateTeamRequest {
        CreateTeamRequest { name: name.to_string() }
    }

    fn join(team: &Team) -> JoinTeamRequest {
        JoinTeamRequest { code: team.code.to_ascii_lowercase() }
    }

    #[tokio::test]
    async fn create_makes_caller_leader() {
        let h = harness(5);
        let leader = h.account("lead@example.com").await;
        let team = h.service.create(&leader, create("  Alpha   Squad ")).await.unwrap();

        assert_eq!(team.name, "Alpha Squad");
        assert_eq!(team.member_count, 1);
        let leader = h.reload(&leader).await;
        assert!(leader.is_leader);
        assert_eq!(leader.team_id.as_ref(), Some(&team.id));

        let err = h.service.create(&leader, create("Beta")).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn join_is_case_insensitive_and_bounded() {
        let h = harness(2);
        let leader = h.account("lead@example.com").await;
        let team = h.service.create(&leader, create("Alpha")).await.unwrap();

        let second = h.account("two@example.com").await;
        let joined = h.service.join(&second, join(&team)).await.unwrap();
        assert_eq!(joined.member_count, 2);

        let third = h.account("three@example.com").await;
        let err = h.service.join(&third, join(&team)).await.unwrap_err();
        assert!(err.to_string().contains("Team is full"));
    }

    #[tokio::test]
    async fn stale_session_cannot_create_second_team() {
        let h = harness(5);
        let leader = h.account("lead@example.com").await;
        h.service.create(&leader, create("Alpha")).await.unwrap();

        // `leader` still carries the pre-create snapshot with no team.
        assert!(leader.team_id.is_none());
        assert!(h.service.create(&leader, create("Beta")).await.is_err());
    }

    #[tokio::test]
    async fn member_leave_decrements() {
        let h = harness(5);
        let leader = h.account("lead@example.com").await;
        let team = h.service.create(&leader, create("Alpha")).await.unwrap();
        let member = h.account("m@example.com").await;
        h.service.join(&member, join(&team)).await.unwrap();

        match h.service.leave(&member).await.unwrap() {
            LeaveResult::Left(team) => assert_eq!(team.member_count, 1),
            other => panic!("expected plain leave, got {other:?}"),
        }
        assert!(h.reload(&member).await.team_id.is_none());
    }

    #[tokio::test]
    async fn leader_leave_dissolves_and_notifies_everyone() {
        let h = harness(5);
        let leader = h.account("lead@example.com").await;
        let team = h.service.create(&leader, create("Alpha")).await.unwrap();
        let mut members = Vec::new();
        for i in 0..2 {
            let member = h.account(&format!("m{i}@example.com")).await;
            h.service.join(&member, join(&team)).await.unwrap();
            members.push(member);
        }

        match h.service.leave(&leader).await.unwrap() {
            LeaveResult::Dissolved { notified, .. } => assert_eq!(notified, 3),
            other => panic!("expected dissolution, got {other:?}"),
        }

        assert!(h.store.get_team(&team.id).await.unwrap().is_none());
        for account in members.iter().chain(std::iter::once(&leader)) {
            let account = h.reload(account).await;
            assert!(account.team_id.is_none());
            assert!(!account.is_leader);
        }
    }

    #[tokio::test]
    async fn non_leader_cannot_delete_rename_or_kick() {
        let h = harness(5);
        let leader = h.account("lead@example.com").await;
        let team = h.service.create(&leader, create("Alpha")).await.unwrap();
        let member = h.account("m@example.com").await;
        h.service.join(&member, join(&team)).await.unwrap();

        assert_eq!(h.service.delete(&member).await.unwrap_err().status_code(), 403);
        let rename = RenameTeamRequest { name: "Beta".to_string() };
        assert_eq!(h.service.rename(&member, rename).await.unwrap_err().status_code(), 403);
        let kick = KickMemberRequest { id: leader.id.clone() };
        assert_eq!(h.service.kick(&member, kick).await.unwrap_err().status_code(), 403);
    }

    #[tokio::test]
    async fn leader_cannot_kick_self() {
        let h = harness(5);
        let leader = h.account("lead@example.com").await;
        h.service.create(&leader, create("Alpha")).await.unwrap();

        let kick = KickMemberRequest { id: leader.id.clone() };
        assert_eq!(h.service.kick(&leader, kick).await.unwrap_err().status_code(), 400);
    }

    #[tokio::test]
    async fn rename_to_taken_name_is_conflict() {
        let h = harness(5);
        let a = h.account("a@example.com").await;
        let b = h.account("b@example.com").await;
        h.service.create(&a, create("Alpha")).await.unwrap();
        h.service.create(&b, create("Beta")).await.unwrap();

        let err = h.service.rename(&b, RenameTeamRequest { name: "alpha".into() }).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert!(err.to_string().contains("Team name already taken"));
    }

    #[tokio::test]
    async fn members_lists_leader_first() {
        let h = harness(5);
        let leader = h.account("lead@example.com").await;
        let team = h.service.create(&leader, create("Alpha")).await.unwrap();
        let member = h.account("m@example.com").await;
        h.service.join(&member, join(&team)).await.unwrap();

        let (_, members) = h.service.members(&h.reload(&member).await).await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(members[0].is_leader);
    }
}
