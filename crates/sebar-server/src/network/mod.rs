//! Network endpoints available to the daemon

pub mod tcp;

pub use tcp::{DEFAULT_CONNECT_TIMEOUT, TcpClusterClient, TcpEndpoint, TcpNodeListener};
