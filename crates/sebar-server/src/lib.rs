//! Sebar node daemon: command line, logging, shutdown and the TCP endpoint

pub mod cli;
pub mod network;
pub mod startup;

pub use cli::Cli;
pub use network::TcpEndpoint;
