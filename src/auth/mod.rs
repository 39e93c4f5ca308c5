//! Authentication and account lifecycle.
//!
//! Passcode verification, session tokens and cookies, the account state gate
//! and the axum middleware that applies it.

pub mod account;
pub mod account_service;
pub mod cookies;
pub mod gate;
pub mod hashing;
pub mod middleware;
pub mod passcode;
pub mod session;
pub mod team;

pub use account::{Account, AccountState, Role};
pub use account_service::AccountService;
pub use cookies::{CookiePolicy, ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME};
pub use gate::{AccountStateGate, GateLevel};
pub use middleware::AuthenticatedAccount;
pub use passcode::{PasscodeCleanup, PasscodeService};
pub use session::{SessionTokenIssuer, TokenPair};
