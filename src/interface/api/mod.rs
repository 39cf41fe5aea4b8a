//! API interface implementations

pub mod credentials_handler;
pub mod events_ws;
pub mod metrics_handler;
pub mod presence_handler;
pub mod router;

pub use metrics_handler::init_metrics;
pub use router::{build_router, AppState};

use crate::domain::shared::error::SignalingError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Maps domain errors onto HTTP responses
pub struct ApiError(pub SignalingError);

impl From<SignalingError> for ApiError {
    fn from(e: SignalingError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SignalingError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SignalingError::NotFound(_) => StatusCode::NOT_FOUND,
            SignalingError::TargetBusy(_) | SignalingError::TransitionConflict(_) => {
                StatusCode::CONFLICT
            }
            SignalingError::ValidationError(_) | SignalingError::InvalidOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            SignalingError::MintFailure(_) => StatusCode::BAD_GATEWAY,
            SignalingError::NetworkTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SignalingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
