//! Team domain models and request DTOs.

use chrono::{DateTime, Utc};
use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::Validate;

use crate::domain::{AccountId, TeamId};

/// Length of the random join code handed to team leaders.
pub const JOIN_CODE_LEN: usize = 6;

static TEAM_NAME_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 ]*$").expect("valid team name regex")
});

static JOIN_CODE_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z0-9]{6}$").expect("valid join code regex"));

/// Stored representation of a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub code: String,
    pub member_count: i32,
    pub round_qualified: i32,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New team creation payload. The founder becomes its leader.
#[derive(Debug, Clone)]
pub struct NewTeam {
    pub id: TeamId,
    pub name: String,
    pub code: String,
}

impl NewTeam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TeamId::new(),
            name: name.into(),
            code: generate_join_code(&mut rand::thread_rng()),
        }
    }

    /// Same team with a fresh join code, used after a code collision.
    pub fn with_new_code(mut self) -> Self {
        self.code = generate_join_code(&mut rand::thread_rng());
        self
    }
}

/// Generate a random alphanumeric join code.
pub fn generate_join_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    Alphanumeric.sample_string(rng, JOIN_CODE_LEN).to_ascii_uppercase()
}

/// Team member as listed to other members of the same team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: AccountId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub reg_no: Option<String>,
    pub is_leader: bool,
}

/// Outcome of a dissolution: the team as it was and everyone who lost it.
#[derive(Debug, Clone)]
pub struct DissolvedTeam {
    pub team: Team,
    pub former_members: Vec<TeamMember>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    #[validate(
        length(min = 1, max = 50, message = "Team name must be between 1 and 50 characters"),
        regex(path = *TEAM_NAME_REGEX, message = "Team name may only contain letters, digits and spaces")
    )]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RenameTeamRequest {
    #[validate(
        length(min = 1, max = 50, message = "Team name must be between 1 and 50 characters"),
        regex(path = *TEAM_NAME_REGEX, message = "Team name may only contain letters, digits and spaces")
    )]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinTeamRequest {
    #[validate(regex(path = *JOIN_CODE_REGEX, message = "Join code must be 6 letters or digits"))]
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickMemberRequest {
    pub id: AccountId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanTeamRequest {
    pub team_id: TeamId,
}

/// Team view returned to its members.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamResponse {
    pub id: TeamId,
    pub name: String,
    pub code: String,
    pub member_count: i32,
    pub round_qualified: i32,
    pub is_banned: bool,
}

impl From<Team> for TeamResponse {
    fn from(team: Team) -> Self {
        Self {
            id: team.id,
            name: team.name,
            code: team.code,
            member_count: team.member_count,
            round_qualified: team.round_qualified,
            is_banned: team.is_banned,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamWithMembersResponse {
    pub team: TeamResponse,
    pub members: Vec<TeamMember>,
}

/// Trim surrounding whitespace and collapse internal runs of spaces.
pub fn normalize_team_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}
