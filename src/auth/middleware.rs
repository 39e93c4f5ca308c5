//! Axum middleware that resolves the session cookie and applies the account
//! state gate.

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{Method, Request},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{field, warn, Instrument};

use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::auth::account::Account;
use crate::auth::cookies::ACCESS_COOKIE_NAME;
use crate::auth::gate::GateLevel;

/// The live account behind the request, inserted as a request extension.
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount(pub Account);

async fn authenticate_at(
    state: ApiState,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
    level: GateLevel,
) -> Result<Response, ApiError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let span = crate::request_span!(request.method(), request.uri().path());
    let token = jar.get(ACCESS_COOKIE_NAME).map(|cookie| cookie.value().to_string());

    let authenticated =
        state.accounts.authenticate(token.as_deref(), level).instrument(span.clone()).await;
    let account = match authenticated {
        Ok(account) => account,
        Err(err) => {
            span.in_scope(|| warn!(error = %err, level = ?level, "authentication failed"));
            return Err(err.into());
        }
    };

    span.record("account_id", field::display(&account.id));
    request.extensions_mut().insert(AuthenticatedAccount(account));
    Ok(next.run(request).instrument(span).await)
}

/// Any authenticated, non-banned account.
pub async fn require_session(
    State(state): State<ApiState>,
    jar: CookieJar,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    authenticate_at(state, jar, request, next, GateLevel::Session).await
}

/// Verified accounts, profile complete or not.
pub async fn require_verified(
    State(state): State<ApiState>,
    jar: CookieJar,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    authenticate_at(state, jar, request, next, GateLevel::Verified).await
}

/// Fully active accounts.
pub async fn require_active(
    State(state): State<ApiState>,
    jar: CookieJar,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    authenticate_at(state, jar, request, next, GateLevel::Active).await
}

/// Must run inside [`require_session`] or a stricter layer.
pub async fn require_admin(
    Extension(AuthenticatedAccount(account)): Extension<AuthenticatedAccount>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if !account.is_admin() {
        warn!(account_id = %account.id, "admin check failed");
        return Err(ApiError::forbidden("Admin role required"));
    }
    Ok(next.run(request).await)
}
