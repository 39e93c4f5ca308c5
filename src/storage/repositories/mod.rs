//! Repository modules for data access
//!
//! Each repository is a trait with a SQLx implementation here and an
//! in-memory implementation in [`crate::storage::memory`].

pub mod account;
pub mod passcode;
pub mod team;

pub use account::{AccountRepository, SqlxAccountRepository};
pub use passcode::{PasscodeCache, SqlxPasscodeCache};
pub use team::{LeaveOutcome, SqlxTeamRepository, TeamRepository};

use crate::errors::{unique_violation, HackathonError};

/// Translate unique-constraint violations into user-facing conflicts; any
/// other failure stays a database error with `context`.
pub(crate) fn classify_write_error(err: sqlx::Error, context: &str) -> HackathonError {
    let conflict = match unique_violation(&err) {
        Some(constraint) => conflict_for_constraint(constraint),
        None => None,
    };

    conflict.unwrap_or_else(|| HackathonError::database(err, context))
}

pub(crate) fn conflict_for_constraint(constraint: &str) -> Option<HackathonError> {
    let (message, resource) = match constraint {
        "users_email_key" => ("An account with this email already exists", "account"),
        "users_phone_no_key" => ("This phone number is already registered", "account"),
        "users_reg_no_key" => ("This registration number is already registered", "account"),
        "teams_name_lower_key" => ("Team name already taken", "team"),
        "teams_code_key" => ("Join code already taken", "join_code"),
        "users_one_leader_per_team" => ("Team already has a leader", "team"),
        _ => return None,
    };
    Some(HackathonError::conflict(message, resource))
}
