//! Graceful shutdown handling for the node daemon
//!
//! Translates Ctrl+C / SIGTERM into the node's close signal.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use sebar_core::Node;

/// Resolve once Ctrl+C or SIGTERM is received.
///
/// A signal that cannot be installed is logged and never fires, so the other
/// one still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Send the node's close signal once `signal` resolves
pub fn close_on<F>(node: Arc<Node>, signal: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        signal.await;
        node.send_close_signal().await;
    })
}

/// Send the node's close signal on Ctrl+C or SIGTERM
pub fn close_on_shutdown_signal(node: Arc<Node>) -> JoinHandle<()> {
    close_on(node, shutdown_signal())
}
