//! Command line interface of the `sebard` daemon
//!
//! Usage:
//! ```text
//! sebard                               # seed a cluster on :6789
//! sebard -p 9090                       # seed a cluster on port 9090
//! sebard -j user:secret@10.0.0.1:6789  # join the node at 10.0.0.1:6789
//! sebard -c conf/node0.json            # read settings from a config file
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use sebar_core::{ConfigOverrides, NodeConfig, Result};

/// Command line arguments for the node
#[derive(Debug, Parser)]
#[command(name = "sebard", version, about = "Sebar cluster node", disable_help_flag = true)]
pub struct Cli {
    /// Path to the config file
    #[arg(short = 'c', long = "config", env = "SEBAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen host
    #[arg(short = 'h', long = "host")]
    pub host: Option<String>,

    /// Listen port [default: 6789]
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Cluster to join, as user:secret@host:port
    #[arg(short = 'j', long = "join")]
    pub join: Option<String>,

    /// Data path
    #[arg(long = "data-path", visible_alias = "dp")]
    pub data_path: Option<String>,

    /// Print help
    #[arg(long = "help", action = ArgAction::Help)]
    pub help: Option<bool>,
}

impl Cli {
    /// Flags given on the command line, as config overrides
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            join_address: self.join.clone(),
            data_path: self.data_path.clone(),
        }
    }

    /// Resolve the node configuration: defaults, config file, then flags
    pub fn node_config(&self) -> Result<NodeConfig> {
        NodeConfig::load(self.config.as_deref(), &self.overrides())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_no_flags() {
        let cli = Cli::try_parse_from(["sebard"]).unwrap();
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());

        let config = cli.node_config().unwrap();
        assert_eq!(config.port, 6789);
        assert!(config.cluster.is_empty());
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::try_parse_from([
            "sebard",
            "-h",
            "localhost",
            "-p",
            "9090",
            "-j",
            "arief:darmawan@localhost:8888",
            "--dp",
            "/var/lib/sebar",
        ])
        .unwrap();

        let config = cli.node_config().unwrap();
        assert_eq!(config.host_address(), "localhost:9090");
        assert_eq!(config.cluster, "localhost:8888");
        assert_eq!(config.cluster_user_id, "arief");
        assert_eq!(config.cluster_secret, "darmawan");
        assert_eq!(config.data_path, "/var/lib/sebar");
    }

    #[test]
    fn test_long_flags() {
        let cli = Cli::try_parse_from([
            "sebard",
            "--host",
            "127.0.0.1",
            "--port",
            "7000",
            "--data-path",
            "/data",
        ])
        .unwrap();
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(7000));
        assert_eq!(cli.data_path.as_deref(), Some("/data"));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(Cli::try_parse_from(["sebard", "-p", "not-a-port"]).is_err());
        assert!(Cli::try_parse_from(["sebard", "-p", "70000"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node0.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"{ "host": "localhost", "port": 8888, "secret": "abc" }"#)
            .unwrap();

        let cli = Cli::try_parse_from([
            "sebard",
            "-c",
            path.to_str().unwrap(),
            "-p",
            "8890",
        ])
        .unwrap();

        let config = cli.node_config().unwrap();
        assert_eq!(config.host_address(), "localhost:8890");
        assert_eq!(config.secret, "abc");
    }
}
