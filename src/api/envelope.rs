//! Uniform response envelope: `{status, message, data}`.

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::api::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Fail,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: EnvelopeStatus,
    pub message: String,
    pub data: T,
}

/// A successful response wrapped in the envelope.
#[derive(Debug)]
pub struct ApiResponse<T> {
    code: StatusCode,
    envelope: Envelope<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::OK, message, data)
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::CREATED, message, data)
    }

    pub fn with_status(code: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self {
            code,
            envelope: Envelope { status: EnvelopeStatus::Success, message: message.into(), data },
        }
    }
}

impl ApiResponse<Option<()>> {
    /// Success with `data: null`.
    pub fn message(message: impl Into<String>) -> Self {
        Self::ok(message, None)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.code, Json(self.envelope)).into_response()
    }
}

/// JSON request body whose rejections are reported through the envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn success_envelope_shape() {
        let response = ApiResponse::created("Team created", serde_json::json!({"id": 7}))
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["message"], "Team created");
        assert_eq!(value["data"]["id"], 7);
    }

    #[tokio::test]
    async fn message_only_has_null_data() {
        let response = ApiResponse::message("Logged out").into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(value["data"].is_null());
    }
}
