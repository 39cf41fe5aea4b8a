//! Interface layer - External surfaces
//!
//! This layer handles:
//! - REST API endpoints (credential minting, presence)
//! - WebSocket streaming of call lifecycle events
//! - Request/response formatting

pub mod api;
