//! Process startup helpers: logging and shutdown signal handling

pub mod logging;
pub mod shutdown;

pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::{close_on, close_on_shutdown_signal, shutdown_signal};
