use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::ServiceError;

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.kind(), "message": self.to_string() }))).into_response()
    }
}

/// Webhook payload and signature problems answer 400 instead of 422.
pub(crate) fn webhook_rejection(err: ServiceError) -> Response {
    match err {
        ServiceError::ValidationFailed(message) => {
            tracing::warn!(message = %message, "webhook rejected");
            (StatusCode::BAD_REQUEST, Json(json!({ "error": "validation_failed", "message": message }))).into_response()
        }
        other => other.into_response(),
    }
}
