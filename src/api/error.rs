use crate::errors::MalguardError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Structured `{success: false, error, detail}` response
#[derive(Debug)]
pub struct ApiError(MalguardError);

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self(MalguardError::InvalidInput(detail.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            MalguardError::NotFound(_) => StatusCode::NOT_FOUND,
            MalguardError::Ambiguous { .. }
            | MalguardError::InvalidInput(_)
            | MalguardError::AlreadyExists(_)
            | MalguardError::Json(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn inner(&self) -> &MalguardError {
        &self.0
    }
}

impl<E> From<E> for ApiError
where
    E: Into<MalguardError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }

        let mut body = json!({
            "success": false,
            "error": self.0.kind(),
            "detail": self.0.to_string(),
        });
        if let MalguardError::Ambiguous { candidates, .. } = &self.0 {
            body["candidates"] = json!(candidates);
        }
        (status, Json(body)).into_response()
    }
}
