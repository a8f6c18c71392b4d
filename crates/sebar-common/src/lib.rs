//! Sebar Common - Shared types and utilities
//!
//! This crate provides the foundational pieces used by every Sebar component:
//! - Error types
//! - Node defaults
//! - Admission secret generation

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{NetworkError, Result, SebarError};
pub use utils::random_secret;

/// Default listen port of a node
pub const DEFAULT_PORT: u16 = 6789;

/// Default period between health-check emissions, in milliseconds
pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 1000;

/// Length of an auto-generated admission secret
pub const SECRET_LENGTH: usize = 32;

/// Local account registered on every listener, authenticated by the node secret
pub const ROOT_ACCOUNT: &str = "root";

/// Event fired by the run loop on every health-check tick
pub const HEALTHCHECK_EVENT: &str = "healthcheck";
