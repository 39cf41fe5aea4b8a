//! Heartline - real-time call signaling for a campus dating platform
//!
//! Covers the one genuinely protocol-shaped subsystem of the app:
//! establishing a live audio/video session between two matched users,
//! coordinating accept/reject/timeout across two independent delivery
//! paths, minting time-boxed media credentials, and preventing
//! duplicate or stale sessions under races. Profiles, matching, chat
//! and push delivery are external collaborators.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::SignalingError;
pub use domain::shared::result::Result;
