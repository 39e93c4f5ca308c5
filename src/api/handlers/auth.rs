//! Handlers under `/auth`: registration, passcodes and session cookies.

use axum::{extract::State, http::StatusCode, Extension};
use axum_extra::extract::cookie::CookieJar;
use tracing::info;

use crate::api::envelope::{ApiResponse, JsonBody};
use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::auth::account::{
    AccountResponse, CompleteProfileRequest, LoginRequest, ResendPasscodeRequest, SignupRequest,
    UpdatePasswordRequest, VerifyPasscodeRequest,
};
use crate::auth::{AuthenticatedAccount, REFRESH_COOKIE_NAME};

type SessionResponse = (CookieJar, ApiResponse<AccountResponse>);

pub async fn signup_handler(
    State(state): State<ApiState>,
    jar: CookieJar,
    JsonBody(request): JsonBody<SignupRequest>,
) -> Result<SessionResponse, ApiError> {
    let (account, pair) = state.accounts.signup(request).await?;
    let jar = state.cookies.set_session(jar, &pair);
    Ok((
        jar,
        ApiResponse::with_status(
            StatusCode::CREATED,
            "Account created. A passcode has been sent to your email",
            account.into(),
        ),
    ))
}

pub async fn verify_passcode_handler(
    State(state): State<ApiState>,
    JsonBody(request): JsonBody<VerifyPasscodeRequest>,
) -> Result<ApiResponse<AccountResponse>, ApiError> {
    let account = state.accounts.verify_passcode(request).await?;
    Ok(ApiResponse::ok("Account verified", account.into()))
}

pub async fn resend_passcode_handler(
    State(state): State<ApiState>,
    JsonBody(request): JsonBody<ResendPasscodeRequest>,
) -> Result<ApiResponse<Option<()>>, ApiError> {
    state.accounts.resend_passcode(request).await?;
    Ok(ApiResponse::message("A new passcode has been sent to your email"))
}

pub async fn login_handler(
    State(state): State<ApiState>,
    jar: CookieJar,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<SessionResponse, ApiError> {
    let (account, pair) = state.accounts.login(request).await?;
    let jar = state.cookies.set_session(jar, &pair);
    Ok((jar, ApiResponse::ok("Logged in", account.into())))
}

pub async fn logout_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(account)): Extension<AuthenticatedAccount>,
    jar: CookieJar,
) -> (CookieJar, ApiResponse<Option<()>>) {
    info!(account_id = %account.id, "account logged out");
    (state.cookies.clear_session(jar), ApiResponse::message("Logged out"))
}

pub async fn refresh_handler(
    State(state): State<ApiState>,
    jar: CookieJar,
) -> Result<SessionResponse, ApiError> {
    let token = jar.get(REFRESH_COOKIE_NAME).map(|cookie| cookie.value().to_string());
    let (account, pair) = state.accounts.refresh(token.as_deref()).await?;
    let jar = state.cookies.set_session(jar, &pair);
    Ok((jar, ApiResponse::ok("Session refreshed", account.into())))
}

pub async fn complete_profile_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(account)): Extension<AuthenticatedAccount>,
    JsonBody(request): JsonBody<CompleteProfileRequest>,
) -> Result<ApiResponse<AccountResponse>, ApiError> {
    let account = state.accounts.complete_profile(&account, request).await?;
    Ok(ApiResponse::ok("Profile completed", account.into()))
}

pub async fn update_password_handler(
    State(state): State<ApiState>,
    JsonBody(request): JsonBody<UpdatePasswordRequest>,
) -> Result<ApiResponse<Option<()>>, ApiError> {
    state.accounts.update_password(request).await?;
    Ok(ApiResponse::message("Password updated"))
}
