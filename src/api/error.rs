use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use tracing::error;

use crate::api::envelope::{Envelope, EnvelopeStatus};
use crate::errors::{AccountStateRejection, HackathonError};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    /// Account must be verified or have a complete profile first.
    ExpectationFailed { message: String, data: Value },
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::ExpectationFailed { .. } => StatusCode::EXPECTATION_FAILED,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn service_unavailable<S: Into<String>>(msg: S) -> Self {
        ApiError::ServiceUnavailable(msg.into())
    }

    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        ApiError::Forbidden(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let error_kind = match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::NotFound(_) => "not_found",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::ExpectationFailed { .. } => "expectation_failed",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal_error",
        };

        let (message, data) = match self {
            ApiError::ExpectationFailed { message, mut data } => {
                if let Value::Object(fields) = &mut data {
                    fields.insert("error".to_string(), Value::from(error_kind));
                }
                (message, data)
            }
            ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::NotFound(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::Internal(msg) => (msg, json!({ "error": error_kind })),
        };

        let envelope = Envelope { status: EnvelopeStatus::Fail, message, data };
        (status, Json(envelope)).into_response()
    }
}

impl From<HackathonError> for ApiError {
    fn from(err: HackathonError) -> Self {
        match err {
            HackathonError::Validation { message, .. } => ApiError::BadRequest(message),
            HackathonError::Auth { message, .. } => ApiError::Unauthorized(message),
            HackathonError::Forbidden { message } => ApiError::Forbidden(message),
            HackathonError::AccountState { message, state } => match state {
                AccountStateRejection::Banned => ApiError::Forbidden(message),
                AccountStateRejection::Unverified => ApiError::ExpectationFailed {
                    message,
                    data: json!({ "isVerified": false }),
                },
                AccountStateRejection::ProfileIncomplete => ApiError::ExpectationFailed {
                    message,
                    data: json!({ "isVerified": true, "isProfileComplete": false }),
                },
            },
            HackathonError::NotFound { resource_type, .. } => {
                ApiError::NotFound(format!("{} not found", capitalize(&resource_type)))
            }
            HackathonError::Conflict { message, .. } => ApiError::Conflict(message),
            HackathonError::Timeout { .. } => {
                error!(error = %err, "request dependency timed out");
                ApiError::ServiceUnavailable("Service temporarily unavailable".to_string())
            }
            HackathonError::Mail { ref message, .. } => {
                error!(error = ?err, "mail delivery failed");
                ApiError::Internal(message.clone())
            }
            HackathonError::Config { .. }
            | HackathonError::Database { .. }
            | HackathonError::Io { .. }
            | HackathonError::Internal { .. } => {
                error!(error = ?err, "request failed");
                ApiError::Internal("Internal server error".to_string())
            }
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AuthErrorType;
    use axum::body::to_bytes;

    async fn body(err: HackathonError) -> (StatusCode, Value) {
        let response = ApiError::from(err).into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn failures_use_the_envelope() {
        let (status, value) =
            body(HackathonError::auth("Invalid email or password", AuthErrorType::InvalidCredentials))
                .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(value["status"], "fail");
        assert_eq!(value["message"], "Invalid email or password");
        assert_eq!(value["data"]["error"], "unauthorized");
    }

    #[tokio::test]
    async fn gate_rejections_carry_state_flags() {
        let (status, value) = body(HackathonError::account_state(
            AccountStateRejection::Unverified,
            "Account not verified",
        ))
        .await;
        assert_eq!(status, StatusCode::EXPECTATION_FAILED);
        assert_eq!(value["data"]["isVerified"], false);

        let (status, value) = body(HackathonError::account_state(
            AccountStateRejection::ProfileIncomplete,
            "Profile incomplete",
        ))
        .await;
        assert_eq!(status, StatusCode::EXPECTATION_FAILED);
        assert_eq!(value["data"]["isProfileComplete"], false);

        let (status, _) =
            body(HackathonError::account_state(AccountStateRejection::Banned, "banned")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn internal_detail_is_redacted() {
        let (status, value) = body(HackathonError::database(
            sqlx::Error::PoolTimedOut,
            "Failed to load account from pool host db-primary:5432",
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(value["message"], "Internal server error");
    }

    #[tokio::test]
    async fn not_found_names_the_resource_only() {
        let (status, value) = body(HackathonError::not_found("team", "0192-secret-id")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(value["message"], "Team not found");
    }
}
