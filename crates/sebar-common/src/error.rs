//! Error types for Sebar
//!
//! This module defines:
//! - `SebarError`: the error taxonomy shared by the node core and the server
//! - `NetworkError`: the opaque error returned by network endpoint implementations

/// Error produced by a network endpoint (listener start, outbound connect).
///
/// Endpoints are external collaborators, so their failures are carried opaquely
/// and attached as the `source` of the node-level error.
pub type NetworkError = Box<dyn std::error::Error + Send + Sync>;

/// Node-level error types
#[derive(thiserror::Error, Debug)]
pub enum SebarError {
    #[error("failed to read config file '{path}': {message}")]
    ConfigRead { path: String, message: String },

    #[error("config field '{key}' has the wrong type: {message}")]
    ConfigType { key: String, message: String },

    #[error("node has no configuration attached")]
    ConfigMissing,

    #[error("illegal node state: {0}")]
    IllegalState(String),

    #[error("failed to start listener on {address}")]
    ListenerStart {
        address: String,
        #[source]
        source: NetworkError,
    },

    #[error("failed to join cluster {cluster}")]
    Join {
        cluster: String,
        #[source]
        source: NetworkError,
    },

    #[error("event '{0}' is not registered")]
    UnknownEvent(String),
}

impl SebarError {
    /// Whether the error should terminate the node process.
    ///
    /// Only `UnknownEvent` is recoverable: the node keeps running and the
    /// failure is reported to the dispatcher.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SebarError::UnknownEvent(_))
    }
}

pub type Result<T> = std::result::Result<T, SebarError>;
