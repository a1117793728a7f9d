//! Request handlers for the `/api` surface.

pub(crate) mod ops;
pub(crate) mod records;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tkb_core::RegistryError;

/// JSON error response: `{"error": "<message>"}` with a mapped status.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub(crate) fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let status = match &err {
            RegistryError::NotReady
            | RegistryError::ConfigurationMissing { .. }
            | RegistryError::NodeUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RegistryError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            RegistryError::DeploymentInProgress => StatusCode::CONFLICT,
            RegistryError::DeploymentFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RegistryError::RecordAccessDenied { .. } => StatusCode::FORBIDDEN,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// GET /api/hello – liveness check for the frontend.
pub(crate) async fn hello() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Hello from the TKB backend!" }))
}

/// Any other `/api/*` path.
pub(crate) async fn api_not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_map_to_statuses() {
        let cases = [
            (RegistryError::NotReady, StatusCode::SERVICE_UNAVAILABLE),
            (RegistryError::UpstreamUnavailable("reset".into()), StatusCode::BAD_GATEWAY),
            (RegistryError::DeploymentInProgress, StatusCode::CONFLICT),
            (RegistryError::DeploymentFailed { code: Some(1) }, StatusCode::INTERNAL_SERVER_ERROR),
            (
                RegistryError::NodeUnavailable { endpoints: Vec::new() },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
