//! Domain errors

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SignalingError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Target busy: {0}")]
    TargetBusy(String),

    #[error("Credential mint failure: {0}")]
    MintFailure(String),

    #[error("Transition conflict: {0}")]
    TransitionConflict(String),

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    /// Failures the user may retry without the orchestrator changing state first
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SignalingError::NetworkTimeout(_) | SignalingError::MintFailure(_)
        )
    }
}
