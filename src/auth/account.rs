//! Participant account models and request DTOs.
//!
//! An [`Account`] is always read fresh from storage before an authorization
//! decision; session tokens only carry its id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;
use validator::Validate;

use crate::domain::{AccountId, TeamId};

static PHONE_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[0-9]{10}$").expect("valid phone regex"));

static NAME_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z][A-Za-z .'-]*$").expect("valid name regex"));

static REG_NO_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z0-9]+$").expect("valid reg no regex"));

/// Platform role of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Panel,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Panel => "panel",
            Role::Admin => "admin",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "panel" => Ok(Role::Panel),
            "admin" => Ok(Role::Admin),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

/// Error returned when role parsing fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid role: {0}")]
pub struct RoleParseError(pub String);

/// Lifecycle state derived from an account's flags.
///
/// Derivation order matters: a banned account is `Banned` whatever its
/// verification or profile flags say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    Banned,
    Unverified,
    ProfileIncomplete,
    Active,
}

/// Stored representation of a participant account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_no: Option<String>,
    pub gender: Option<String>,
    pub reg_no: Option<String>,
    pub github_profile: Option<String>,
    pub role: Role,
    pub team_id: Option<TeamId>,
    pub is_leader: bool,
    pub is_verified: bool,
    pub is_profile_complete: bool,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Normalize email to lowercase for consistent storage and comparison.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    pub fn state(&self) -> AccountState {
        if self.is_banned {
            AccountState::Banned
        } else if !self.is_verified {
            AccountState::Unverified
        } else if !self.is_profile_complete {
            AccountState::ProfileIncomplete
        } else {
            AccountState::Active
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// New account creation payload.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: AccountId,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Profile fields supplied by complete-profile.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub phone_no: String,
    pub gender: String,
    pub reg_no: String,
    pub github_profile: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPasscodeRequest {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[serde(alias = "otp")]
    #[validate(length(equal = 6, message = "Passcode must be 6 digits"))]
    pub passcode: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResendPasscodeRequest {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BanRequest {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[serde(alias = "otp")]
    #[validate(length(equal = 6, message = "Passcode must be 6 digits"))]
    pub passcode: String,
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteProfileRequest {
    #[validate(
        length(min = 1, max = 50, message = "First name must be between 1 and 50 characters"),
        regex(path = *NAME_REGEX, message = "First name contains invalid characters")
    )]
    pub first_name: String,
    #[validate(
        length(min = 1, max = 50, message = "Last name must be between 1 and 50 characters"),
        regex(path = *NAME_REGEX, message = "Last name contains invalid characters")
    )]
    pub last_name: String,
    #[validate(regex(path = *PHONE_REGEX, message = "Phone number must be 10 digits"))]
    pub phone_no: String,
    #[validate(custom(function = "validate_gender"))]
    pub gender: String,
    #[validate(
        length(min = 1, max = 20, message = "Registration number must be between 1 and 20 characters"),
        regex(path = *REG_NO_REGEX, message = "Registration number must be alphanumeric")
    )]
    pub reg_no: String,
    #[validate(custom(function = "validate_github_profile"))]
    pub github_profile: String,
}

impl From<CompleteProfileRequest> for ProfileUpdate {
    fn from(req: CompleteProfileRequest) -> Self {
        Self {
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            phone_no: req.phone_no,
            gender: req.gender.to_ascii_uppercase(),
            reg_no: req.reg_no.to_ascii_uppercase(),
            github_profile: req.github_profile,
        }
    }
}

fn validate_gender(gender: &str) -> Result<(), validator::ValidationError> {
    match gender {
        "M" | "F" | "O" | "m" | "f" | "o" => Ok(()),
        _ => {
            let mut err = validator::ValidationError::new("gender");
            err.message = Some("Gender must be one of M, F or O".into());
            Err(err)
        }
    }
}

fn validate_github_profile(profile: &str) -> Result<(), validator::ValidationError> {
    let invalid = || {
        let mut err = validator::ValidationError::new("github_profile");
        err.message = Some("GitHub profile must be a https://github.com/<user> URL".into());
        err
    };

    let parsed = url::Url::parse(profile).map_err(|_| invalid())?;
    let host_ok = matches!(parsed.host_str(), Some("github.com") | Some("www.github.com"));
    let has_user = parsed
        .path_segments()
        .and_then(|mut segments| segments.next())
        .is_some_and(|user| !user.is_empty());

    if parsed.scheme() == "https" && host_ok && has_user {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Account view returned to the account's owner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: AccountId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_no: Option<String>,
    pub gender: Option<String>,
    pub reg_no: Option<String>,
    pub github_profile: Option<String>,
    pub role: Role,
    pub team_id: Option<TeamId>,
    pub is_leader: bool,
    pub is_verified: bool,
    pub is_profile_complete: bool,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            first_name: account.first_name,
            last_name: account.last_name,
            phone_no: account.phone_no,
            gender: account.gender,
            reg_no: account.reg_no,
            github_profile: account.github_profile,
            role: account.role,
            team_id: account.team_id,
            is_leader: account.is_leader,
            is_verified: account.is_verified,
            is_profile_complete: account.is_profile_complete,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_account() -> Account {
    Account {
        id: AccountId::new(),
        email: "student@example.com".to_string(),
        first_name: None,
        last_name: None,
        phone_no: None,
        gender: None,
        reg_no: None,
        github_profile: None,
        role: Role::Student,
        team_id: None,
        is_leader: false,
        is_verified: true,
        is_profile_complete: true,
        is_banned: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
