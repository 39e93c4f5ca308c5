//! Wiring from configuration to a ready [`ApiState`].
//!
//! Picks the storage backend and mail sender, builds the services on top of
//! them and starts the passcode purge task.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::api::ApiState;
use crate::auth::{
    hashing, AccountService, CookiePolicy, PasscodeCleanup, PasscodeService, SessionTokenIssuer,
};
use crate::config::{AppConfig, StorageBackend};
use crate::errors::Result;
use crate::mail::{ConsoleMailSender, MailSender, SmtpMailPool};
use crate::services::{Notifier, TeamService};
use crate::storage::{
    create_pool, AccountRepository, MemoryPasscodeCache, MemoryStore, PasscodeCache,
    SqlxAccountRepository, SqlxPasscodeCache, SqlxTeamRepository, TeamRepository,
};

/// The three storage collaborators the services are built on.
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountRepository>,
    pub teams: Arc<dyn TeamRepository>,
    pub passcodes: Arc<dyn PasscodeCache>,
}

impl Stores {
    /// Process-local stores sharing one account/team map.
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            accounts: store.clone(),
            teams: store,
            passcodes: Arc::new(MemoryPasscodeCache::new()),
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        match config.database.backend {
            StorageBackend::Memory => {
                info!("Using in-memory storage; data is lost on restart");
                Ok(Self::memory())
            }
            StorageBackend::Postgres => {
                let pool = create_pool(&config.database).await?;
                Ok(Self {
                    accounts: Arc::new(SqlxAccountRepository::new(pool.clone())),
                    teams: Arc::new(SqlxTeamRepository::new(pool.clone())),
                    passcodes: Arc::new(SqlxPasscodeCache::new(pool)),
                })
            }
        }
    }
}

pub fn mail_sender(config: &AppConfig) -> Result<Arc<dyn MailSender>> {
    if config.mail.smtp_enabled() {
        let pool = SmtpMailPool::new(&config.mail)?;
        info!(channels = config.mail.credentials.len(), "SMTP mail delivery enabled");
        Ok(Arc::new(pool))
    } else {
        info!("No SMTP host configured, mail is written to the log");
        Ok(Arc::new(ConsoleMailSender::new()))
    }
}

/// Build the request state from already-constructed collaborators.
pub fn build_state(
    config: &AppConfig,
    stores: &Stores,
    mailer: Arc<dyn MailSender>,
) -> Result<ApiState> {
    let notifier = Notifier::new(mailer);
    let passcodes =
        PasscodeService::new(stores.passcodes.clone(), notifier.clone(), config.passcode.ttl());
    let tokens = Arc::new(SessionTokenIssuer::from_config(&config.auth));
    let hasher = hashing::password_hasher(&config.auth)?;

    Ok(ApiState {
        accounts: AccountService::new(stores.accounts.clone(), passcodes, tokens, hasher)?,
        teams: TeamService::new(stores.teams.clone(), notifier, config.teams.capacity),
        cookies: CookiePolicy::from_config(&config.auth),
    })
}

/// A fully wired application plus its background tasks.
pub struct Application {
    pub state: ApiState,
    pub passcode_cleanup: JoinHandle<()>,
}

impl Application {
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let stores = Stores::from_config(config).await?;
        let mailer = mail_sender(config)?;
        let state = build_state(config, &stores, mailer)?;

        let passcode_cleanup = PasscodeCleanup::new(stores.passcodes.clone())
            .spawn(config.passcode.purge_interval());

        Ok(Self { state, passcode_cleanup })
    }
}
