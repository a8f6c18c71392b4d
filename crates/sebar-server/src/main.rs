use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use tracing::{debug, error, info};

use sebar_common::HEALTHCHECK_EVENT;
use sebar_core::Node;
use sebar_server::{
    Cli, TcpEndpoint,
    startup::{LoggingConfig, close_on_shutdown_signal, init_logging},
};

/// Exit status for configuration, listener and join failures
const FATAL_EXIT_CODE: u8 = 100;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = LoggingConfig::from_env();
    let logging_guard = match init_logging(&logging) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize file logging, using console only: {}", e);
            match init_logging(&logging.console_only()) {
                Ok(guard) => Some(guard),
                Err(e) => {
                    eprintln!("Failed to initialize logging: {}", e);
                    None
                }
            }
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if logging_guard.is_none() {
                eprintln!("{:#}", e);
            }
            error!("{:#}", e);
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.node_config()?;
    info!(config = ?config, "Starting Sebar node");

    let node = Arc::new(Node::with_config(Arc::new(TcpEndpoint::new()), config));
    node.add_event(HEALTHCHECK_EVENT, |ctx| {
        debug!(
            "Health check {} state: {}",
            ctx.server.host_address().unwrap_or_default(),
            ctx.server.state()
        );
        None
    });

    node.start().await?;
    info!(
        "Sebar node {} is running",
        node.host_address().unwrap_or_default()
    );

    let signal_handle = close_on_shutdown_signal(node.clone());
    node.wait().await;
    node.close().await;
    signal_handle.abort();

    Ok(())
}
