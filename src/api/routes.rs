use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::auth::{
    middleware::{require_active, require_admin, require_session, require_verified},
    AccountService, CookiePolicy,
};
use crate::api::error::ApiError;
use crate::config::ServerConfig;
use crate::errors::HackathonError;
use crate::services::TeamService;

use super::handlers::{
    ban_handler, ban_team_handler, complete_profile_handler, create_team_handler,
    delete_team_handler, join_team_handler, kick_member_handler, leave_team_handler,
    list_members_handler, login_handler, logout_handler, me_handler, ping_handler,
    refresh_handler, rename_team_handler, resend_passcode_handler, signup_handler,
    unban_handler, unban_team_handler, update_password_handler, verify_passcode_handler,
};

#[derive(Clone)]
pub struct ApiState {
    pub accounts: AccountService,
    pub teams: TeamService,
    pub cookies: CookiePolicy,
}

pub fn build_router(state: ApiState, config: &ServerConfig) -> Router {
    let session_layer = || middleware::from_fn_with_state(state.clone(), require_session);

    let public_auth = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/verify-passcode", post(verify_passcode_handler))
        .route("/auth/resend-passcode", post(resend_passcode_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/update-password", post(update_password_handler));

    let session_routes = Router::new()
        .route("/auth/logout", post(logout_handler))
        .route("/user/me", get(me_handler))
        .route_layer(session_layer());

    let verified_routes = Router::new()
        .route("/auth/complete-profile", post(complete_profile_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_verified));

    let team_routes = Router::new()
        .route("/team/create", post(create_team_handler))
        .route("/team/join", post(join_team_handler))
        .route("/team/leave", post(leave_team_handler))
        .route("/team/kick", post(kick_member_handler))
        .route("/team/delete", post(delete_team_handler))
        .route("/team/rename", put(rename_team_handler))
        .route("/team/members", get(list_members_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_active));

    // Layers run bottom-up: the session check must see the request first.
    let admin_routes = Router::new()
        .route("/admin/ban", post(ban_handler))
        .route("/admin/unban", post(unban_handler))
        .route("/admin/team/ban", post(ban_team_handler))
        .route("/admin/team/unban", post(unban_team_handler))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(session_layer());

    let mut router = Router::new()
        .route("/ping", get(ping_handler))
        .merge(public_auth)
        .merge(session_routes)
        .merge(verified_routes)
        .merge(team_routes)
        .merge(admin_routes)
        .with_state(state)
        .layer(middleware::from_fn_with_state(config.timeout(), enforce_deadline))
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(&config.cors_origins) {
        router = router.layer(cors);
    }

    router
}

/// Answer 503 in the envelope when a request outlives `limit`.
async fn enforce_deadline(State(limit): State<Duration>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            let limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
            ApiError::from(HackathonError::timeout(path, limit_ms)).into_response()
        }
    }
}

/// Credentialed CORS for the configured origins. `None` keeps the API
/// same-origin.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn deadline_router(limit: Duration) -> Router {
        Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    "done"
                }),
            )
            .route("/fast", get(|| async { "done" }))
            .layer(middleware::from_fn_with_state(limit, enforce_deadline))
    }

    #[tokio::test]
    async fn overrun_answers_in_the_envelope() {
        let request = Request::builder().uri("/slow").body(Body::empty()).unwrap();
        let response = deadline_router(Duration::from_millis(20)).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "fail");
        assert_eq!(value["message"], "Service temporarily unavailable");
    }

    #[tokio::test]
    async fn requests_within_the_deadline_pass_through() {
        let request = Request::builder().uri("/fast").body(Body::empty()).unwrap();
        let response = deadline_router(Duration::from_secs(5)).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn cors_disabled_without_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_none());
    }

    #[test]
    fn cors_enabled_for_valid_origin() {
        assert!(cors_layer(&["https://hack.example.com".to_string()]).is_some());
    }
}
