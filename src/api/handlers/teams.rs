//! Handlers under `/team`. All of them run behind the active-account gate.

use axum::{extract::State, Extension};
use serde::Serialize;

use crate::api::envelope::{ApiResponse, JsonBody};
use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::auth::team::{
    CreateTeamRequest, JoinTeamRequest, KickMemberRequest, RenameTeamRequest, TeamResponse,
    TeamWithMembersResponse,
};
use crate::auth::AuthenticatedAccount;
use crate::services::LeaveResult;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DissolutionResponse {
    pub team: TeamResponse,
    pub notified: usize,
}

pub async fn create_team_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(account)): Extension<AuthenticatedAccount>,
    JsonBody(request): JsonBody<CreateTeamRequest>,
) -> Result<ApiResponse<TeamResponse>, ApiError> {
    let team = state.teams.create(&account, request).await?;
    Ok(ApiResponse::created("Team created", team.into()))
}

pub async fn join_team_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(account)): Extension<AuthenticatedAccount>,
    JsonBody(request): JsonBody<JoinTeamRequest>,
) -> Result<ApiResponse<TeamResponse>, ApiError> {
    let team = state.teams.join(&account, request).await?;
    Ok(ApiResponse::ok("Joined team", team.into()))
}

/// A leader leaving dissolves the team; the response says which happened.
pub async fn leave_team_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(account)): Extension<AuthenticatedAccount>,
) -> Result<ApiResponse<DissolutionResponse>, ApiError> {
    let response = match state.teams.leave(&account).await? {
        LeaveResult::Left(team) => {
            ApiResponse::ok("Left team", DissolutionResponse { team: team.into(), notified: 0 })
        }
        LeaveResult::Dissolved { team, notified } => ApiResponse::ok(
            "Team dissolved",
            DissolutionResponse { team: team.into(), notified },
        ),
    };
    Ok(response)
}

pub async fn kick_member_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(account)): Extension<AuthenticatedAccount>,
    JsonBody(request): JsonBody<KickMemberRequest>,
) -> Result<ApiResponse<TeamResponse>, ApiError> {
    let team = state.teams.kick(&account, request).await?;
    Ok(ApiResponse::ok("Member removed", team.into()))
}

pub async fn delete_team_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(account)): Extension<AuthenticatedAccount>,
) -> Result<ApiResponse<DissolutionResponse>, ApiError> {
    let (team, notified) = state.teams.delete(&account).await?;
    Ok(ApiResponse::ok("Team deleted", DissolutionResponse { team: team.into(), notified }))
}

pub async fn rename_team_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(account)): Extension<AuthenticatedAccount>,
    JsonBody(request): JsonBody<RenameTeamRequest>,
) -> Result<ApiResponse<TeamResponse>, ApiError> {
    let team = state.teams.rename(&account, request).await?;
    Ok(ApiResponse::ok("Team renamed", team.into()))
}

pub async fn list_members_handler(
    State(state): State<ApiState>,
    Extension(AuthenticatedAccount(account)): Extension<AuthenticatedAccount>,
) -> Result<ApiResponse<TeamWithMembersResponse>, ApiError> {
    let (team, members) = state.teams.members(&account).await?;
    Ok(ApiResponse::ok("Team members", TeamWithMembersResponse { team: team.into(), members }))
}
