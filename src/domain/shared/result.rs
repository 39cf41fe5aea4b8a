//! Domain result type

use super::error::SignalingError;

/// Standard result type for domain operations
pub type Result<T> = std::result::Result<T, SignalingError>;
