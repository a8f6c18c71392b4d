//! Node configuration
//!
//! Values are merged from three sources, lowest precedence first:
//! 1. compiled-in defaults (`NodeConfig::default()`)
//! 2. a config file read through the `config` crate (only keys present override)
//! 3. explicit caller overrides (`ConfigOverrides`, usually CLI flags)

pub mod join;

use std::{path::Path, time::Duration};

use config::{Config, ConfigError, File};
use tracing::info;

use sebar_common::{DEFAULT_HEALTH_CHECK_INTERVAL_MS, DEFAULT_PORT, Result, SebarError};

pub use join::{JoinAddress, parse_join_address};

// File keys
pub const KEY_HOST: &str = "host";
pub const KEY_PORT: &str = "port";
pub const KEY_CLUSTER: &str = "cluster";
pub const KEY_CLUSTER_USER_ID: &str = "clusteruserid";
pub const KEY_CLUSTER_SECRET: &str = "clustersecret";
pub const KEY_SECRET: &str = "secret";
pub const KEY_USER: &str = "user";
pub const KEY_DATA_PATH: &str = "datapath";
pub const KEY_AUTH_SERVER: &str = "authserver";
pub const KEY_HEALTH_CHECK_INTERVAL: &str = "healthcheckinterval";

/// Resolved identity and settings of a node
#[derive(Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    /// Address of the cluster to join; empty or equal to `host_address()` for a seed
    pub cluster: String,
    pub cluster_user_id: String,
    pub cluster_secret: String,
    /// Admission secret of this node, generated at start when empty
    pub secret: String,
    pub user: String,
    pub data_path: String,
    pub auth_server: String,
    pub health_check_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            cluster: String::new(),
            cluster_user_id: String::new(),
            cluster_secret: String::new(),
            secret: String::new(),
            user: String::new(),
            data_path: String::new(),
            auth_server: String::new(),
            health_check_interval: Duration::from_millis(DEFAULT_HEALTH_CHECK_INTERVAL_MS),
        }
    }
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("cluster", &self.cluster)
            .field("cluster_user_id", &self.cluster_user_id)
            .field("cluster_secret", &redact(&self.cluster_secret))
            .field("secret", &redact(&self.secret))
            .field("user", &self.user)
            .field("data_path", &self.data_path)
            .field("auth_server", &self.auth_server)
            .field("health_check_interval", &self.health_check_interval)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "" } else { "***" }
}

/// Explicit overrides applied on top of defaults and the config file
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Join string in `user:secret@host:port` form
    pub join_address: Option<String>,
    pub data_path: Option<String>,
}

impl NodeConfig {
    /// Defaults overlaid with the values of a config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        config.merge_file(path.as_ref())?;
        Ok(config)
    }

    /// Defaults, then the optional config file, then `overrides`
    pub fn load(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = file {
            config.merge_file(path)?;
            info!("Successfully read config file {}", path.display());
        }
        config.apply_overrides(overrides);
        Ok(config)
    }

    /// Overwrite fields with the keys present in a config file.
    ///
    /// The format is inferred from the file extension.
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let source = Config::builder()
            .add_source(File::from(path).required(true))
            .build()
            .map_err(|e| SebarError::ConfigRead {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        read_string(&source, KEY_HOST, &mut self.host)?;
        if let Some(port) = read_int(&source, KEY_PORT)? {
            self.port = u16::try_from(port).map_err(|_| SebarError::ConfigType {
                key: KEY_PORT.to_string(),
                message: format!("{} is not a valid port", port),
            })?;
        }
        read_string(&source, KEY_USER, &mut self.user)?;
        read_string(&source, KEY_SECRET, &mut self.secret)?;
        read_string(&source, KEY_CLUSTER, &mut self.cluster)?;
        read_string(&source, KEY_CLUSTER_USER_ID, &mut self.cluster_user_id)?;
        read_string(&source, KEY_CLUSTER_SECRET, &mut self.cluster_secret)?;
        read_string(&source, KEY_DATA_PATH, &mut self.data_path)?;
        read_string(&source, KEY_AUTH_SERVER, &mut self.auth_server)?;
        if let Some(interval) = read_int(&source, KEY_HEALTH_CHECK_INTERVAL)? {
            let millis = u64::try_from(interval)
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| SebarError::ConfigType {
                    key: KEY_HEALTH_CHECK_INTERVAL.to_string(),
                    message: format!("{} is not a positive number of milliseconds", interval),
                })?;
            self.health_check_interval = Duration::from_millis(millis);
        }

        Ok(())
    }

    /// Apply the overrides that are set; unset fields keep their value
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(host) = &overrides.host {
            self.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(join) = &overrides.join_address {
            let JoinAddress {
                host,
                user_id,
                secret,
            } = parse_join_address(join);
            info!(cluster = %host, user = %user_id, "Join address configured");
            self.cluster = host;
            self.cluster_user_id = user_id;
            self.cluster_secret = secret;
        }
        if let Some(data_path) = &overrides.data_path {
            self.data_path = data_path.clone();
        }
    }

    /// Bind address of this node, recomputed from `host` and `port` on every call
    pub fn host_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether this node seeds its own cluster instead of joining one
    pub fn is_seed(&self) -> bool {
        self.cluster.is_empty() || self.cluster == self.host_address()
    }
}

fn read_string(source: &Config, key: &str, target: &mut String) -> Result<()> {
    match source.get_string(key) {
        Ok(value) => {
            *target = value;
            Ok(())
        }
        Err(ConfigError::NotFound(_)) => Ok(()),
        Err(e) => Err(type_error(key, e)),
    }
}

fn read_int(source: &Config, key: &str) -> Result<Option<i64>> {
    match source.get_int(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(type_error(key, e)),
    }
}

fn type_error(key: &str, e: ConfigError) -> SebarError {
    SebarError::ConfigType {
        key: key.to_string(),
        message: e.to_string(),
    }
}
