//! Account state gate.
//!
//! Checks run in a fixed order: missing account, banned, unverified,
//! profile incomplete. A ban always wins, so a banned account that never
//! verified is told it is banned rather than asked to verify.

use tracing::{info, instrument};

use crate::auth::account::Account;
use crate::auth::passcode::PasscodeService;
use crate::errors::{AccountStateRejection, AuthErrorType, HackathonError, Result};
use crate::observability::metrics;

/// How much of the gate a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GateLevel {
    /// Authenticated and not banned.
    Session,
    /// Also verified.
    Verified,
    /// Also has a complete profile.
    Active,
}

#[derive(Clone)]
pub struct AccountStateGate {
    passcodes: PasscodeService,
}

impl AccountStateGate {
    pub fn new(passcodes: PasscodeService) -> Self {
        Self { passcodes }
    }

    /// Admit `account` at `level`, or explain why not.
    ///
    /// An unverified account gets a fresh passcode mailed before the
    /// rejection is returned.
    #[instrument(skip(self, account), fields(account_id = ?account.as_ref().map(|a| &a.id)))]
    pub async fn check(&self, account: Option<Account>, level: GateLevel) -> Result<Account> {
        let Some(account) = account else {
            return Err(HackathonError::auth("Account not found", AuthErrorType::InvalidToken));
        };

        if account.is_banned {
            return Err(reject(AccountStateRejection::Banned, "This account has been banned"));
        }

        if level >= GateLevel::Verified && !account.is_verified {
            self.passcodes.issue(&account.email).await?;
            info!(email = %account.email, "Reissued passcode for unverified account");
            return Err(reject(
                AccountStateRejection::Unverified,
                "Account not verified. A passcode has been sent to your email",
            ));
        }

        if level >= GateLevel::Active && !account.is_profile_complete {
            return Err(reject(
                AccountStateRejection::ProfileIncomplete,
                "Profile incomplete. Complete your profile to continue",
            ));
        }

        Ok(account)
    }
}

fn reject(state: AccountStateRejection, message: &str) -> HackathonError {
    metrics::record_gate_rejection(state.as_str());
    HackathonError::account_state(state, message)
}
