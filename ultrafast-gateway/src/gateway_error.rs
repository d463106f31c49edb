//! HTTP-facing error wrapper (§7). Maps
//! [`ultrafast_models_sdk::gateway::GatewayCoreError`] and the handful of
//! errors that can occur before routing even starts (body parsing,
//! config) onto the status codes and OpenAI-style error envelope the
//! ambient binary's clients expect.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use ultrafast_models_sdk::gateway::GatewayCoreError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Core(#[from] GatewayCoreError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            GatewayError::Core(GatewayCoreError::ModelNotAvailable(_)) => {
                (StatusCode::BAD_REQUEST, "model_not_available")
            }
            GatewayError::Core(GatewayCoreError::NoProvider(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "no_provider_available")
            }
            GatewayError::Core(GatewayCoreError::UpstreamAuthError) => {
                (StatusCode::BAD_GATEWAY, "upstream_auth_error")
            }
            GatewayError::Core(GatewayCoreError::UpstreamBadRequest { .. }) => {
                (StatusCode::BAD_REQUEST, "upstream_bad_request")
            }
            GatewayError::Core(GatewayCoreError::UpstreamServerError) => {
                (StatusCode::BAD_GATEWAY, "upstream_server_error")
            }
            GatewayError::Core(GatewayCoreError::PoolWaitTimeout) => {
                (StatusCode::SERVICE_UNAVAILABLE, "pool_wait_timeout")
            }
            GatewayError::Core(GatewayCoreError::NotSupported(_)) => {
                (StatusCode::BAD_REQUEST, "not_supported")
            }
            GatewayError::Core(GatewayCoreError::Cancelled) => {
                (StatusCode::BAD_REQUEST, "cancelled")
            }
            GatewayError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            GatewayError::Json(_) => (StatusCode::BAD_REQUEST, "invalid_json"),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_kind();
        let message = self.to_string();
        tracing::warn!(status = %status, error_type, %message, "request failed");
        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
            }
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_not_available_maps_to_400() {
        let err = GatewayError::Core(GatewayCoreError::ModelNotAvailable("gpt-5".to_string()));
        assert_eq!(err.status_and_kind().0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn pool_wait_timeout_maps_to_503() {
        let err = GatewayError::Core(GatewayCoreError::PoolWaitTimeout);
        assert_eq!(err.status_and_kind().0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn not_supported_maps_to_400() {
        let err = GatewayError::Core(GatewayCoreError::NotSupported("embeddings".to_string()));
        assert_eq!(err.status_and_kind().0, StatusCode::BAD_REQUEST);
    }
}
