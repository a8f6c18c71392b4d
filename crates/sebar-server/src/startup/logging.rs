//! File-based logging for the node daemon.
//!
//! Events go to the console and, when file logging is on, to rolling log files:
//!
//! | Log File     | Component                   | Target Prefixes                               |
//! |--------------|-----------------------------|-----------------------------------------------|
//! | sebard.log   | Root logger (all events)    | (all)                                         |
//! | node.log     | Lifecycle and membership    | sebar_core::node, sebar_core::membership      |
//! | event.log    | Event registry              | sebar_core::event                             |
//! | network.log  | Network endpoints           | sebar_core::network, sebar_server::network    |
//!
//! Log files are stored in `~/sebar/logs` by default.
//! Override with the `SEBAR_LOG_DIR` environment variable.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Root log file capturing every event
const ROOT_LOG_FILE: &str = "sebard.log";

/// A component log file and the targets routed to it
struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "node.log",
        targets: &["sebar_core::node", "sebar_core::membership"],
    },
    ComponentLogDef {
        file_name: "event.log",
        targets: &["sebar_core::event"],
    },
    ComponentLogDef {
        file_name: "network.log",
        targets: &["sebar_core::network", "sebar_server::network"],
    },
];

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

impl std::str::FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(LogRotation::Daily),
            "hourly" => Ok(LogRotation::Hourly),
            "never" => Ok(LogRotation::Never),
            _ => Err(format!("Invalid log rotation: {}", s)),
        }
    }
}

/// Logging configuration of the daemon
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub console_level: Level,
    pub file_logging: bool,
    pub file_level: Level,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            console_level: Level::INFO,
            file_logging: true,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/sebar/logs", home))
}

impl LoggingConfig {
    /// Create from `SEBAR_LOG_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_dir = lookup("SEBAR_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_log_dir);

        let console_output = lookup("SEBAR_LOG_CONSOLE")
            .map(|v| v.to_lowercase() != "false" && v != "0")
            .unwrap_or(true);

        let file_logging = lookup("SEBAR_LOG_FILE")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(true);

        let console_level = lookup("SEBAR_LOG_LEVEL")
            .and_then(|v| v.parse().ok())
            .unwrap_or(Level::INFO);

        let file_level = lookup("SEBAR_LOG_FILE_LEVEL")
            .and_then(|v| v.parse().ok())
            .unwrap_or(console_level);

        let rotation = lookup("SEBAR_LOG_ROTATION")
            .and_then(|v| v.parse().ok())
            .unwrap_or(LogRotation::Daily);

        Self {
            log_dir,
            console_output,
            console_level,
            file_logging,
            file_level,
            rotation,
        }
    }
}

impl LoggingConfig {
    /// Same levels, console output only
    pub fn console_only(&self) -> Self {
        Self {
            console_output: true,
            file_logging: false,
            ..self.clone()
        }
    }
}

/// Keeps the non-blocking file writers alive; dropping it flushes buffered output.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// Initialize the global subscriber with console and file layers.
///
/// `RUST_LOG` overrides the configured levels of the console and root file
/// layers. Component files capture every level of their targets.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, Box<dyn std::error::Error>> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        let root_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, ROOT_LOG_FILE);
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);

        let root_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        let root_layer = fmt::layer()
            .with_writer(root_nb)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_filter(root_filter);
        layers.push(Box::new(root_layer));

        for component in COMPONENT_LOGS {
            let appender = RollingFileAppender::new(
                config.rotation.into(),
                &config.log_dir,
                component.file_name,
            );
            let (nb, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let mut targets = Targets::new();
            for target in component.targets {
                targets = targets.with_target(*target, LevelFilter::TRACE);
            }

            let layer = fmt::layer()
                .with_writer(nb)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .with_filter(targets);
            layers.push(Box::new(layer));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            "File logging initialized: {} (root) + {} component log files",
            ROOT_LOG_FILE,
            COMPONENT_LOGS.len()
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}
