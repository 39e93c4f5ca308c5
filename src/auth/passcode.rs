//! One-time passcodes proving control of an email address.
//!
//! At most one live code exists per email. Issuing overwrites, a successful
//! match deletes, and a mismatch leaves the code in place until it expires.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::Rng;
use subtle::ConstantTimeEq;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{AuthErrorType, HackathonError, Result};
use crate::observability::metrics;
use crate::services::Notifier;
use crate::storage::PasscodeCache;

/// Inclusive bounds keep every code exactly six digits.
const PASSCODE_MIN: u32 = 100_000;
const PASSCODE_MAX: u32 = 999_999;

/// Draw a six digit code from the operating system CSPRNG.
pub fn generate_passcode() -> String {
    OsRng.gen_range(PASSCODE_MIN..=PASSCODE_MAX).to_string()
}

fn codes_match(stored: &str, candidate: &str) -> bool {
    stored.as_bytes().ct_eq(candidate.as_bytes()).into()
}

#[derive(Clone)]
pub struct PasscodeService {
    cache: Arc<dyn PasscodeCache>,
    notifier: Notifier,
    ttl: Duration,
}

impl PasscodeService {
    pub fn new(cache: Arc<dyn PasscodeCache>, notifier: Notifier, ttl: Duration) -> Self {
        Self { cache, notifier, ttl }
    }

    /// Store a fresh code for `email` and mail it.
    ///
    /// If delivery fails the code is deleted again so the account is never
    /// left holding a code it cannot receive.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn issue(&self, email: &str) -> Result<()> {
        let code = generate_passcode();

        self.cache.set(email, &code, self.ttl).await.map_err(|e| {
            error!(error = %e, "Failed to store passcode");
            metrics::record_passcode("store_failed");
            HackathonError::internal("Failed to issue passcode")
        })?;

        if let Err(e) = self.notifier.passcode(email, &code, self.ttl).await {
            warn!(error = %e, "Passcode delivery failed, rolling back");
            if let Err(del_err) = self.cache.del(email).await {
                error!(error = %del_err, "Failed to roll back undelivered passcode");
            }
            metrics::record_passcode("rolled_back");
            return Err(HackathonError::mail("Failed to issue passcode"));
        }

        metrics::record_passcode("issued");
        debug!("Passcode issued");
        Ok(())
    }

    /// Check `candidate` against the live code for `email`, consuming it on a match.
    ///
    /// An unreachable cache counts as an invalid code.
    #[instrument(skip(self, candidate), fields(email = %email))]
    pub async fn consume(&self, email: &str, candidate: &str) -> Result<()> {
        let stored = match self.cache.get(email).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Passcode cache unavailable, treating code as invalid");
                None
            }
        };

        let Some(stored) = stored else {
            metrics::record_passcode("expired");
            return Err(HackathonError::auth(
                "Passcode is invalid or expired",
                AuthErrorType::InvalidPasscode,
            ));
        };

        if !codes_match(&stored, candidate) {
            metrics::record_passcode("mismatch");
            return Err(HackathonError::auth("Invalid passcode", AuthErrorType::InvalidPasscode));
        }

        // A concurrent request may have taken the same code since the read.
        let taken = self.cache.take(email, &stored).await.map_err(|e| {
            warn!(error = %e, "Failed to consume passcode");
            HackathonError::auth("Passcode is invalid or expired", AuthErrorType::InvalidPasscode)
        })?;
        if !taken {
            metrics::record_passcode("expired");
            return Err(HackathonError::auth(
                "Passcode is invalid or expired",
                AuthErrorType::InvalidPasscode,
            ));
        }

        metrics::record_passcode("consumed");
        Ok(())
    }
}

/// Periodically removes expired passcode rows.
///
/// Expired rows are already invisible to lookups; this only reclaims space.
#[derive(Clone)]
pub struct PasscodeCleanup {
    cache: Arc<dyn PasscodeCache>,
}

impl PasscodeCleanup {
    pub fn new(cache: Arc<dyn PasscodeCache>) -> Self {
        Self { cache }
    }

    pub async fn run_once(&self) -> Result<u64> {
        let purged = self.cache.purge_expired().await?;
        if purged > 0 {
            info!(purged, "Purged expired passcodes");
        }
        Ok(purged)
    }

    /// Run [`Self::run_once`] every `interval` until the task is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    warn!(error = %e, "Passcode purge failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::{MailSender, OutboundMail};
    use crate::storage::MemoryPasscodeCache;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct ToggleMailer {
        fail: AtomicBool,
    }

    #[async_trait]
    impl MailSender for ToggleMailer {
        async fn send(&self, _mail: OutboundMail) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(HackathonError::mail("relay down"));
            }
            Ok(())
        }
    }

    fn service(ttl: Duration) -> (PasscodeService, Arc<MemoryPasscodeCache>, Arc<ToggleMailer>) {
        let cache = Arc::new(MemoryPasscodeCache::new());
        let mailer = Arc::new(ToggleMailer::default());
        let service = PasscodeService::new(cache.clone(), Notifier::new(mailer.clone()), ttl);
        (service, cache, mailer)
    }

    async fn stored(cache: &MemoryPasscodeCache, email: &str) -> String {
        cache.get(email).await.unwrap().expect("passcode stored")
    }

    #[tokio::test]
    async fn issued_code_is_consumed_exactly_once() {
        let (service, cache, _) = service(Duration::from_secs(300));
        service.issue("a@example.com").await.unwrap();
        let code = stored(&cache, "a@example.com").await;

        service.consume("a@example.com", &code).await.unwrap();
        let err = service.consume("a@example.com", &code).await.unwrap_err();
        assert!(err.to_string().contains("invalid or expired"));
    }

    #[tokio::test]
    async fn mismatch_keeps_code() {
        let (service, cache, _) = service(Duration::from_secs(300));
        service.issue("a@example.com").await.unwrap();
        let code = stored(&cache, "a@example.com").await;
        let wrong = if code == "111111" { "222222" } else { "111111" };

        let err = service.consume("a@example.com", wrong).await.unwrap_err();
        assert!(matches!(
            err,
            HackathonError::Auth { error_type: AuthErrorType::InvalidPasscode, .. }
        ));
        service.consume("a@example.com", &code).await.unwrap();
    }

    #[tokio::test]
    async fn reissue_invalidates_previous_code() {
        let (service, cache, _) = service(Duration::from_secs(300));
        service.issue("a@example.com").await.unwrap();
        let first = stored(&cache, "a@example.com").await;

        let mut second = first.clone();
        while second == first {
            service.issue("a@example.com").await.unwrap();
            second = stored(&cache, "a@example.com").await;
        }

        assert!(service.consume("a@example.com", &first).await.is_err());
        assert!(service.consume("a@example.com", &second).await.is_ok());
    }

    #[tokio::test]
    async fn delivery_failure_rolls_back() {
        let (service, cache, mailer) = service(Duration::from_secs(300));
        mailer.fail.store(true, Ordering::SeqCst);

        let err = service.issue("a@example.com").await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(cache.get("a@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_code_never_matches() {
        let (service, cache, _) = service(Duration::from_millis(20));
        service.issue("a@example.com").await.unwrap();
        let code = cache.get("a@example.com").await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(service.consume("a@example.com", &code).await.is_err());
    }

    #[tokio::test]
    async fn cleanup_purges_expired_rows() {
        let cache = Arc::new(MemoryPasscodeCache::new());
        cache.set("a@example.com", "123456", Duration::from_millis(1)).await.unwrap();
        cache.set("b@example.com", "654321", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let purged = PasscodeCleanup::new(cache.clone()).run_once().await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn code_comparison() {
        assert!(codes_match("123456", "123456"));
        assert!(!codes_match("123456", "123457"));
        assert!(!codes_match("123456", "12345"));
        assert!(!codes_match("123456", ""));
    }

    /// Cache whose reads all see the same record before any delete lands,
    /// the interleaving two requests can hit against Postgres.
    struct StaleReadCache {
        inner: MemoryPasscodeCache,
        snapshot: String,
    }

    #[async_trait]
    impl PasscodeCache for StaleReadCache {
        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
            self.inner.set(key, value, ttl).await
        }

        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(Some(self.snapshot.clone()))
        }

        async fn del(&self, key: &str) -> Result<()> {
            self.inner.del(key).await
        }

        async fn take(&self, key: &str, value: &str) -> Result<bool> {
            self.inner.take(key, value).await
        }

        async fn purge_expired(&self) -> Result<u64> {
            self.inner.purge_expired().await
        }
    }

    #[tokio::test]
    async fn racing_consumers_share_one_success() {
        let cache = Arc::new(StaleReadCache {
            inner: MemoryPasscodeCache::new(),
            snapshot: "424242".to_string(),
        });
        cache.set("a@example.com", "424242", Duration::from_secs(300)).await.unwrap();
        let service = PasscodeService::new(
            cache.clone(),
            Notifier::new(Arc::new(ToggleMailer::default())),
            Duration::from_secs(300),
        );

        let mut consumers = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let service = service.clone();
            consumers.spawn(async move { service.consume("a@example.com", "424242").await });
        }

        let mut ok = 0;
        while let Some(result) = consumers.join_next().await {
            if result.expect("consume task").is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn take_requires_the_live_value() {
        let cache = MemoryPasscodeCache::new();
        cache.set("a@example.com", "123456", Duration::from_secs(60)).await.unwrap();
        assert!(!cache.take("a@example.com", "654321").await.unwrap());
        assert!(cache.take("a@example.com", "123456").await.unwrap());
        assert!(!cache.take("a@example.com", "123456").await.unwrap());

        cache.set("b@example.com", "111111", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!cache.take("b@example.com", "111111").await.unwrap());
    }

    proptest! {
        #[test]
        fn generated_passcodes_are_six_digits(_seed in any::<u8>()) {
            let code = generate_passcode();
            prop_assert_eq!(code.len(), 6);
            prop_assert!(code.chars().all(|c| c.is_ascii_digit()));
            prop_assert!(!code.starts_with('0'));
        }
    }
}
