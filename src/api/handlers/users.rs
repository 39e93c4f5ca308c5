use axum::{extract::State, Extension};
use serde::Serialize;

use crate::api::envelope::ApiResponse;
use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::auth::account::{AccountResponse, AccountState};
use crate::auth::team::TeamResponse;
use crate::auth::AuthenticatedAccount;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub account: AccountResponse,
    pub state: AccountState,
    pub team: Option<TeamResponse>,
}

/// The caller's profile with a summary of their team, if any.
pub async fn me_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(account)): Extension<AuthenticatedAccount>,
) -> Result<ApiResponse<MeResponse>, ApiError> {
    let team = state.teams.team_of(&account).await?;
    Ok(ApiResponse::ok(
        "Current account",
        MeResponse {
            state: account.state(),
            account: account.into(),
            team: team.map(Into::into),
        },
    ))
}
