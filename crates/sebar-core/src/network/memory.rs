// In-process network endpoint
// Lets several nodes share one address book inside a single process

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use tracing::debug;

use super::{ClusterClient, Listener, NetworkEndpoint, NetworkError};

/// Admission state of a running in-process listener
#[derive(Debug, Default)]
struct ListenerEntry {
    secret: String,
    accounts: HashMap<String, String>,
    connections: AtomicUsize,
}

impl ListenerEntry {
    fn admits(&self, secret: &str, user_id: &str) -> bool {
        (!self.secret.is_empty() && self.secret == secret)
            || self.accounts.get(user_id).is_some_and(|s| s == secret)
    }
}

/// Network endpoint backed by a process-local address book.
///
/// Clones share the same address book, so a node started on one clone is
/// reachable from nodes using another. A connect succeeds when a listener is
/// running at the address and the presented secret is either the listener's
/// admission secret or the secret of the named account.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    listeners: Arc<DashMap<String, Arc<ListenerEntry>>>,
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("listener_count", &self.listeners.len())
            .finish()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a listener is running at `address`
    pub fn is_listening(&self, address: &str) -> bool {
        self.listeners.contains_key(address)
    }

    /// Number of open client connections to the listener at `address`
    pub fn connection_count(&self, address: &str) -> usize {
        self.listeners
            .get(address)
            .map(|e| e.connections.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl NetworkEndpoint for MemoryNetwork {
    fn listener(&self) -> Box<dyn Listener> {
        Box::new(MemoryListener {
            network: self.clone(),
            secret: String::new(),
            accounts: HashMap::new(),
            bound: None,
        })
    }

    async fn connect(
        &self,
        address: &str,
        secret: &str,
        user_id: &str,
    ) -> Result<Box<dyn ClusterClient>, NetworkError> {
        let entry = self
            .listeners
            .get(address)
            .map(|e| e.value().clone())
            .ok_or_else(|| format!("connection refused: no listener at {}", address))?;

        if !entry.admits(secret, user_id) {
            return Err(format!("authentication failed for user '{}'", user_id).into());
        }

        entry.connections.fetch_add(1, Ordering::SeqCst);
        debug!(address = %address, user = %user_id, "In-process client connected");

        Ok(Box::new(MemoryClient {
            address: address.to_string(),
            entry: Some(entry),
        }))
    }
}

/// Listener role of [`MemoryNetwork`]
pub struct MemoryListener {
    network: MemoryNetwork,
    secret: String,
    accounts: HashMap<String, String>,
    bound: Option<String>,
}

#[async_trait]
impl Listener for MemoryListener {
    fn set_secret(&mut self, secret: &str) {
        self.secret = secret.to_string();
    }

    fn add_account(&mut self, name: &str, secret: &str) {
        self.accounts.insert(name.to_string(), secret.to_string());
    }

    async fn start(&mut self, bind_address: &str) -> Result<(), NetworkError> {
        if let Some(bound) = &self.bound {
            return Err(format!("listener already running on {}", bound).into());
        }

        match self.network.listeners.entry(bind_address.to_string()) {
            Entry::Occupied(_) => {
                return Err(format!("address {} already in use", bind_address).into());
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(ListenerEntry {
                    secret: self.secret.clone(),
                    accounts: self.accounts.clone(),
                    connections: AtomicUsize::new(0),
                }));
            }
        }

        self.bound = Some(bind_address.to_string());
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(address) = self.bound.take() {
            self.network.listeners.remove(&address);
        }
    }
}

/// Client role of [`MemoryNetwork`]
pub struct MemoryClient {
    address: String,
    entry: Option<Arc<ListenerEntry>>,
}

#[async_trait]
impl ClusterClient for MemoryClient {
    fn remote_address(&self) -> &str {
        &self.address
    }

    async fn close(&mut self) {
        if let Some(entry) = self.entry.take() {
            entry.connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
