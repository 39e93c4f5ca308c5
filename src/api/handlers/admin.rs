//! Admin-only moderation of accounts and teams.

use axum::{extract::State, Extension};
use validator::Validate;

use crate::api::envelope::{ApiResponse, JsonBody};
use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::auth::account::{Account, AccountResponse, BanRequest};
use crate::auth::team::{BanTeamRequest, TeamResponse};
use crate::auth::AuthenticatedAccount;
use crate::errors::HackathonError;

async fn set_banned(
    state: &ApiState,
    admin: &Account,
    request: BanRequest,
    banned: bool,
) -> Result<AccountResponse, ApiError> {
    request.validate().map_err(HackathonError::from)?;
    let account = state.accounts.set_banned(admin, &request.email, banned).await?;
    Ok(account.into())
}

pub async fn ban_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(admin)): Extension<AuthenticatedAccount>,
    JsonBody(request): JsonBody<BanRequest>,
) -> Result<ApiResponse<AccountResponse>, ApiError> {
    let account = set_banned(&state, &admin, request, true).await?;
    Ok(ApiResponse::ok("Account banned", account))
}

pub async fn unban_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(admin)): Extension<AuthenticatedAccount>,
    JsonBody(request): JsonBody<BanRequest>,
) -> Result<ApiResponse<AccountResponse>, ApiError> {
    let account = set_banned(&state, &admin, request, false).await?;
    Ok(ApiResponse::ok("Account unbanned", account))
}

pub async fn ban_team_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(admin)): Extension<AuthenticatedAccount>,
    JsonBody(request): JsonBody<BanTeamRequest>,
) -> Result<ApiResponse<TeamResponse>, ApiError> {
    let team = state.teams.set_banned(&admin, &request.team_id, true).await?;
    Ok(ApiResponse::ok("Team banned", team.into()))
}

pub async fn unban_team_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(admin)): Extension<AuthenticatedAccount>,
    JsonBody(request): JsonBody<BanTeamRequest>,
) -> Result<ApiResponse<TeamResponse>, ApiError> {
    let team = state.teams.set_banned(&admin, &request.team_id, false).await?;
    Ok(ApiResponse::ok("Team unbanned", team.into()))
}
