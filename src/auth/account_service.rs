//! Account registration, verification and session issuance.

use std::sync::Arc;

use argon2::Argon2;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::auth::account::{
    Account, CompleteProfileRequest, LoginRequest, NewAccount, ResendPasscodeRequest, Role,
    SignupRequest, UpdatePasswordRequest, VerifyPasscodeRequest,
};
use crate::auth::gate::{AccountStateGate, GateLevel};
use crate::auth::hashing;
use crate::auth::passcode::PasscodeService;
use crate::auth::session::{SessionTokenIssuer, TokenPair};
use crate::domain::AccountId;
use crate::errors::{AccountStateRejection, AuthErrorType, HackathonError, Result};
use crate::observability::metrics;
use crate::storage::AccountRepository;

/// Passcode flows run before any session exists, so they repeat the gate's
/// ban check themselves.
fn reject_banned(account: &Account) -> Result<()> {
    if account.is_banned {
        return Err(HackathonError::account_state(
            AccountStateRejection::Banned,
            "This account has been banned",
        ));
    }
    Ok(())
}

fn invalid_credentials() -> HackathonError {
    HackathonError::auth("Invalid email or password", AuthErrorType::InvalidCredentials)
}

#[derive(Clone)]
pub struct AccountService {
    accounts: Arc<dyn AccountRepository>,
    passcodes: PasscodeService,
    gate: AccountStateGate,
    tokens: Arc<SessionTokenIssuer>,
    hasher: Argon2<'static>,
    /// Verified against when the email is unknown so that response time does
    /// not reveal whether an account exists.
    dummy_hash: Arc<str>,
}

impl AccountService {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        passcodes: PasscodeService,
        tokens: Arc<SessionTokenIssuer>,
        hasher: Argon2<'static>,
    ) -> Result<Self> {
        let gate = AccountStateGate::new(passcodes.clone());
        let dummy_hash = hashing::hash_password(&hasher, "dummy_startup_value")?.into();
        Ok(Self { accounts, passcodes, gate, tokens, hasher, dummy_hash })
    }

    async fn require_by_email(&self, email: &str) -> Result<Account> {
        self.accounts
            .get_account_by_email(email)
            .await?
            .ok_or_else(|| HackathonError::not_found("account", email))
    }

    /// Register an unverified account, mail it a passcode and open a session.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn signup(&self, request: SignupRequest) -> Result<(Account, TokenPair)> {
        request.validate()?;
        let email = Account::normalize_email(&request.email);
        let password_hash = hashing::hash_password(&self.hasher, &request.password)?;

        let account = self
            .accounts
            .create_account(NewAccount {
                id: AccountId::new(),
                email: email.clone(),
                password_hash,
                role: Role::Student,
            })
            .await
            .inspect_err(|_| metrics::record_authentication("signup_failed"))?;

        self.passcodes.issue(&email).await?;
        let pair = self.tokens.issue_pair(&account.id)?;

        metrics::record_authentication("signup");
        info!(account_id = %account.id, "Account registered");
        Ok((account, pair))
    }

    /// Confirm control of the email address with a passcode.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn verify_passcode(&self, request: VerifyPasscodeRequest) -> Result<Account> {
        request.validate()?;
        let email = Account::normalize_email(&request.email);
        let account = self.require_by_email(&email).await?;
        reject_banned(&account)?;

        self.passcodes.consume(&email, &request.passcode).await?;
        let account = self.accounts.mark_verified(&email).await?;

        info!(account_id = %account.id, "Account verified");
        Ok(account)
    }

    /// Mail a new passcode, replacing any live one. Banned accounts get none.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn resend_passcode(&self, request: ResendPasscodeRequest) -> Result<()> {
        request.validate()?;
        let email = Account::normalize_email(&request.email);
        let account = self.require_by_email(&email).await?;

        reject_banned(&account)?;

        self.passcodes.issue(&email).await
    }

    /// Check credentials, then the account state, then open a session.
    ///
    /// The gate runs only after the password matched, so passcode reissue for
    /// an unverified account needs the password. A verified account with an
    /// incomplete profile may log in.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<(Account, TokenPair)> {
        request.validate()?;
        let email = Account::normalize_email(&request.email);

        let Some((account, password_hash)) = self.accounts.get_account_with_password(&email).await?
        else {
            let dummy = hashing::verify_password(&self.hasher, &self.dummy_hash, &request.password);
            if let Err(e) = dummy {
                warn!(error = %e, "dummy hash verification failed unexpectedly");
            }
            warn!("login attempt for unknown account");
            metrics::record_authentication("invalid_credentials");
            return Err(invalid_credentials());
        };

        if !hashing::verify_password(&self.hasher, &password_hash, &request.password)? {
            warn!(account_id = %account.id, "login attempt with incorrect password");
            metrics::record_authentication("invalid_credentials");
            return Err(invalid_credentials());
        }

        let account = self.gate.check(Some(account), GateLevel::Verified).await.inspect_err(|e| {
            if let HackathonError::AccountState { state, .. } = e {
                metrics::record_authentication(state.as_str());
            }
        })?;

        let pair = self.tokens.issue_pair(&account.id)?;
        metrics::record_authentication("success");
        info!(account_id = %account.id, "account logged in");
        Ok((account, pair))
    }

    /// Redeem a refresh token. The account must still exist and not be banned.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<(Account, TokenPair)> {
        let (account_id, pair) = self.tokens.rotate(refresh_token)?;
        let account = self.accounts.get_account(&account_id).await?;
        let account = self.gate.check(account, GateLevel::Session).await?;
        Ok((account, pair))
    }

    /// Resolve the account behind an access token and admit it at `level`.
    #[instrument(skip(self, access_token))]
    pub async fn authenticate(&self, access_token: Option<&str>, level: GateLevel) -> Result<Account> {
        let Some(token) = access_token.filter(|t| !t.is_empty()) else {
            return Err(HackathonError::auth("Missing session token", AuthErrorType::MissingToken));
        };

        let account_id = self.tokens.validate_access(token)?;
        let account = self.accounts.get_account(&account_id).await?;
        self.gate.check(account, level).await
    }

    #[instrument(skip(self, account, request), fields(account_id = %account.id))]
    pub async fn complete_profile(
        &self,
        account: &Account,
        request: CompleteProfileRequest,
    ) -> Result<Account> {
        request.validate()?;
        let updated = self.accounts.complete_profile(&account.id, request.into()).await?;
        info!("Profile completed");
        Ok(updated)
    }

    /// Set a new password after proving control of the email with a passcode.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn update_password(&self, request: UpdatePasswordRequest) -> Result<()> {
        request.validate()?;
        let email = Account::normalize_email(&request.email);
        let account = self.require_by_email(&email).await?;

        reject_banned(&account)?;

        self.passcodes.consume(&email, &request.passcode).await?;
        let password_hash = hashing::hash_password(&self.hasher, &request.new_password)?;
        self.accounts.update_password(&email, password_hash).await?;

        info!(account_id = %account.id, "Password updated");
        Ok(())
    }

    /// Ban or unban an account. Takes effect on the account's next request.
    #[instrument(skip(self, admin), fields(admin_id = %admin.id))]
    pub async fn set_banned(&self, admin: &Account, email: &str, banned: bool) -> Result<Account> {
        if !admin.is_admin() {
            return Err(HackathonError::forbidden("Admin role required"));
        }

        let email = Account::normalize_email(email);
        if email == admin.email {
            return Err(HackathonError::validation("Admins cannot change their own ban status"));
        }

        let account = self.accounts.set_banned(&email, banned).await?;
        info!(account_id = %account.id, banned, "Ban status changed");
        Ok(account)
    }

    /// Round-trip to account storage.
    pub async fn ping(&self) -> Result<()> {
        self.accounts.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::mail::ConsoleMailSender;
    use crate::services::Notifier;
    use crate::storage::{MemoryPasscodeCache, MemoryStore, PasscodeCache};
    use chrono::Duration as TokenTtl;
    use std::time::Duration;

    struct Harness {
        service: AccountService,
        store: Arc<MemoryStore>,
        cache: Arc<MemoryPasscodeCache>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryPasscodeCache::new());
        let passcodes = PasscodeService::new(
            cache.clone(),
            Notifier::new(Arc::new(ConsoleMailSender::new())),
            Duration::from_secs(300),
        );
        let tokens = Arc::new(SessionTokenIssuer::new(
            b"account-service-test-secret-0123456789",
            TokenTtl::seconds(3600),
            TokenTtl::seconds(7200),
        ));
        let hasher = hashing::password_hasher(&AuthConfig {
            password_memory_kib: 1024,
            password_iterations: 1,
            ..Default::default()
        })
        .unwrap();
        let service = AccountService::new(store.clone(), passcodes, tokens, hasher).unwrap();
        Harness { service, store, cache }
    }

    fn signup(email: &str) -> SignupRequest {
        SignupRequest { email: email.to_string(), password: "hunter2hunter2".to_string() }
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest { email: email.to_string(), password: password.to_string() }
    }

    async fn verify(h: &Harness, email: &str) {
        let passcode = h.cache.get(email).await.unwrap().unwrap();
        h.service
            .verify_passcode(VerifyPasscodeRequest { email: email.to_string(), passcode })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn signup_leaves_one_consumable_passcode() {
        let h = harness();
        let (account, _) = h.service.signup(signup("New@Example.com")).await.unwrap();
        assert_eq!(account.email, "new@example.com");
        assert!(!account.is_verified);
        assert_eq!(h.cache.len(), 1);

        verify(&h, "new@example.com").await;
        let passcode = "000000".to_string();
        let err = h
            .service
            .verify_passcode(VerifyPasscodeRequest { email: "new@example.com".into(), passcode })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid or expired"));
    }

    #[tokio::test]
    async fn duplicate_signup_is_conflict() {
        let h = harness();
        h.service.signup(signup("a@example.com")).await.unwrap();
        let err = h.service.signup(signup("A@example.com")).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn login_rejects_wrong_password_before_state() {
        let h = harness();
        h.service.signup(signup("a@example.com")).await.unwrap();
        h.cache.del("a@example.com").await.unwrap();

        let err = h.service.login(login("a@example.com", "wrong-password")).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert!(h.cache.get("a@example.com").await.unwrap().is_none());

        let err = h.service.login(login("ghost@example.com", "whatever1")).await.unwrap_err();
        assert_eq!(err.to_string(), invalid_credentials().to_string());
    }

    #[tokio::test]
    async fn unverified_login_reissues_passcode() {
        let h = harness();
        h.service.signup(signup("a@example.com")).await.unwrap();
        h.cache.del("a@example.com").await.unwrap();

        let err = h.service.login(login("a@example.com", "hunter2hunter2")).await.unwrap_err();
        assert_eq!(err.status_code(), 417);
        assert!(h.cache.get("a@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn banned_login_fails_even_with_correct_password() {
        let h = harness();
        h.service.signup(signup("a@example.com")).await.unwrap();
        verify(&h, "a@example.com").await;
        h.store.set_banned("a@example.com", true).await.unwrap();

        let err = h.service.login(login("a@example.com", "hunter2hunter2")).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn incomplete_profile_may_log_in() {
        let h = harness();
        h.service.signup(signup("a@example.com")).await.unwrap();
        verify(&h, "a@example.com").await;

        let (account, pair) =
            h.service.login(login("a@example.com", "hunter2hunter2")).await.unwrap();
        assert!(!account.is_profile_complete);

        let err = h
            .service
            .authenticate(Some(&pair.access_token), GateLevel::Active)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 417);
        assert!(h.service.authenticate(Some(&pair.access_token), GateLevel::Verified).await.is_ok());
    }

    #[tokio::test]
    async fn ban_after_issue_blocks_existing_tokens() {
        let h = harness();
        let (_, pair) = h.service.signup(signup("a@example.com")).await.unwrap();
        h.store.set_banned("a@example.com", true).await.unwrap();

        let err =
            h.service.authenticate(Some(&pair.access_token), GateLevel::Session).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
        let err = h.service.refresh(Some(&pair.refresh_token)).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn update_password_consumes_passcode() {
        let h = harness();
        h.service.signup(signup("a@example.com")).await.unwrap();
        verify(&h, "a@example.com").await;

        h.service
            .resend_passcode(ResendPasscodeRequest { email: "a@example.com".into() })
            .await
            .unwrap();
        let passcode = h.cache.get("a@example.com").await.unwrap().unwrap();
        h.service
            .update_password(UpdatePasswordRequest {
                email: "a@example.com".into(),
                passcode,
                new_password: "correct horse battery".into(),
            })
            .await
            .unwrap();

        assert!(h.service.login(login("a@example.com", "hunter2hunter2")).await.is_err());
        assert!(h.service.login(login("a@example.com", "correct horse battery")).await.is_ok());
    }

    #[tokio::test]
    async fn banned_account_cannot_verify() {
        let h = harness();
        h.service.signup(signup("a@example.com")).await.unwrap();
        h.store.set_banned("a@example.com", true).await.unwrap();
        let passcode = h.cache.get("a@example.com").await.unwrap().unwrap();

        let err = h
            .service
            .verify_passcode(VerifyPasscodeRequest { email: "a@example.com".into(), passcode })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        let account = h.store.get_account_by_email("a@example.com").await.unwrap().unwrap();
        assert!(!account.is_verified);
        assert!(h.cache.get("a@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn only_admins_can_ban() {
        let h = harness();
        let (student, _) = h.service.signup(signup("s@example.com")).await.unwrap();
        let err = h.service.set_banned(&student, "x@example.com", true).await.unwrap_err();
        assert_eq!(err.status_code(), 403);

        let admin = Account { role: Role::Admin, ..crate::auth::account::sample_account() };
        let banned = h.service.set_banned(&admin, "S@example.com", true).await.unwrap();
        assert!(banned.is_banned);
    }
}
