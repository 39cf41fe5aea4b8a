//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Repository implementations (in-memory and Postgres)
//! - The ephemeral per-user signal broadcaster
//! - Media credential minting
//! - Database connection management

pub mod broadcast;
pub mod credential;
pub mod persistence;
