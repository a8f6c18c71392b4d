//! Network endpoint contract
//!
//! The node never speaks a wire protocol itself. Listening, admission checks
//! and outbound connections are delegated to a [`NetworkEndpoint`], which hands
//! out a server role ([`Listener`]) and client role ([`ClusterClient`]).

pub mod memory;

use async_trait::async_trait;

pub use sebar_common::NetworkError;

pub use memory::MemoryNetwork;

/// Factory for the listener and client roles of a transport
#[async_trait]
pub trait NetworkEndpoint: Send + Sync {
    /// Create an unstarted listener
    fn listener(&self) -> Box<dyn Listener>;

    /// Open an outbound connection to `address`, authenticating with
    /// `secret` and `user_id`
    async fn connect(
        &self,
        address: &str,
        secret: &str,
        user_id: &str,
    ) -> Result<Box<dyn ClusterClient>, NetworkError>;
}

/// Server role: accepts connections from peers and clients
#[async_trait]
pub trait Listener: Send + Sync {
    /// Admission secret peers present when connecting
    fn set_secret(&mut self, secret: &str);

    /// Register a local account
    fn add_account(&mut self, name: &str, secret: &str);

    /// Start listening on `bind_address` (`host:port`)
    async fn start(&mut self, bind_address: &str) -> Result<(), NetworkError>;

    /// Stop listening; a listener that never started is left as is
    async fn stop(&mut self);
}

/// Client role: an outbound connection held by a joining node
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Address this client is connected to
    fn remote_address(&self) -> &str;

    /// Close the connection
    async fn close(&mut self);
}
