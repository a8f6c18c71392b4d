//! Node lifecycle
//!
//! A [`Node`] owns its configuration, one listener, at most one outbound
//! client and an event registry. Its lifecycle is
//! `Uninitialized -> Starting -> Running -> Stopping -> Stopped`:
//!
//! - [`Node::start`] provisions the admission secret, starts the listener and
//!   resolves cluster membership. It never blocks on the run loop.
//! - [`Node::wait`] runs the loop that fires `healthcheck` every
//!   `health_check_interval` until the close signal is raised.
//! - [`Node::send_close_signal`] and [`Node::close`] tear the node down; both
//!   are safe to call repeatedly and while `wait` is running.

use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;
use serde_json::Value;
use tokio::{
    sync::{Mutex, watch},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use sebar_common::{
    DEFAULT_HEALTH_CHECK_INTERVAL_MS, ROOT_ACCOUNT, Result, SECRET_LENGTH, SebarError,
    random_secret,
};

use crate::{
    config::NodeConfig,
    event::{EventContext, EventName, EventRegistry, EventResult},
    membership::{self, Membership},
    network::{ClusterClient, Listener, NetworkEndpoint},
};

/// Lifecycle state of a node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeState {
    #[default]
    Uninitialized,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Uninitialized => write!(f, "UNINITIALIZED"),
            NodeState::Starting => write!(f, "STARTING"),
            NodeState::Running => write!(f, "RUNNING"),
            NodeState::Stopping => write!(f, "STOPPING"),
            NodeState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// One running instance of the service
pub struct Node {
    config: RwLock<Option<NodeConfig>>,
    state: RwLock<NodeState>,
    network: Arc<dyn NetworkEndpoint>,
    listener: Mutex<Option<Box<dyn Listener>>>,
    client: Mutex<Option<Box<dyn ClusterClient>>>,
    events: EventRegistry,
    close_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("state", &self.state())
            .field("config", &*self.config.read())
            .field("events", &self.events)
            .finish()
    }
}

impl Node {
    /// Create an unconfigured node using `network` for listener and client roles
    pub fn new(network: Arc<dyn NetworkEndpoint>) -> Self {
        let (close_tx, _) = watch::channel(false);
        Self {
            config: RwLock::new(None),
            state: RwLock::new(NodeState::Uninitialized),
            network,
            listener: Mutex::new(None),
            client: Mutex::new(None),
            events: EventRegistry::new(),
            close_tx,
        }
    }

    pub fn with_config(network: Arc<dyn NetworkEndpoint>, config: NodeConfig) -> Self {
        let node = Self::new(network);
        *node.config.write() = Some(config);
        node
    }

    /// Attach a configuration; only allowed before `start`
    pub fn configure(&self, config: NodeConfig) -> Result<()> {
        let state = self.state();
        if state != NodeState::Uninitialized {
            return Err(SebarError::IllegalState(format!(
                "cannot configure a node in state {}",
                state
            )));
        }
        *self.config.write() = Some(config);
        Ok(())
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> Option<NodeConfig> {
        self.config.read().clone()
    }

    pub fn host_address(&self) -> Option<String> {
        self.config.read().as_ref().map(NodeConfig::host_address)
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    /// Whether the node holds a connection to another cluster node
    pub async fn is_joined(&self) -> bool {
        self.client.lock().await.is_some()
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    /// Register a handler for `name`, replacing any previous one
    pub fn add_event<F>(&self, name: impl Into<EventName>, handler: F)
    where
        F: Fn(&EventContext<'_>) -> Option<EventResult> + Send + Sync + 'static,
    {
        self.events.register(name, handler);
    }

    pub fn remove_event(&self, name: impl Into<EventName>) -> bool {
        self.events.unregister(name)
    }

    /// Dispatch an event with this node as the context's `server`
    pub fn dispatch(&self, name: impl Into<EventName>, payload: Value) -> EventResult {
        self.events.dispatch(self, name, payload)
    }

    /// Start the listener and resolve cluster membership.
    ///
    /// On failure everything opened so far is released, the node ends up
    /// `Stopped` and the error is returned to the caller.
    pub async fn start(&self) -> Result<()> {
        let mut config = self.config().ok_or(SebarError::ConfigMissing)?;
        self.transition(NodeState::Uninitialized, NodeState::Starting)?;

        if let Err(e) = self.bring_up(&mut config).await {
            error!(error = %e, "Failed to start node on {}", config.host_address());
            self.release_handles().await;
            self.set_state(NodeState::Stopped);
            return Err(e);
        }

        let address = config.host_address();
        *self.config.write() = Some(config);

        if let Err(e) = self.transition(NodeState::Starting, NodeState::Running) {
            // Closed while starting
            self.release_handles().await;
            self.set_state(NodeState::Stopped);
            return Err(e);
        }

        info!(address = %address, "Server {} is running", address);
        Ok(())
    }

    async fn bring_up(&self, config: &mut NodeConfig) -> Result<()> {
        let generated = config.secret.is_empty();
        if generated {
            config.secret = random_secret(SECRET_LENGTH);
        }

        let address = config.host_address();
        if generated {
            info!(
                "Preparing server to run on [{}], secret: {}",
                address, config.secret
            );
        } else {
            info!("Preparing server to run on [{}]", address);
        }

        let mut listener = self.network.listener();
        listener.set_secret(&config.secret);
        listener.add_account(ROOT_ACCOUNT, &config.secret);
        listener
            .start(&address)
            .await
            .map_err(|source| SebarError::ListenerStart {
                address: address.clone(),
                source,
            })?;
        *self.listener.lock().await = Some(listener);

        if let Membership::Joined(client) = membership::resolve(config, self.network.as_ref()).await? {
            *self.client.lock().await = Some(client);
        }

        Ok(())
    }

    /// Run loop: fire `healthcheck` every interval until the close signal.
    ///
    /// Returns at once when the node is not running or the signal was already
    /// raised. Handler results are ignored.
    pub async fn wait(&self) {
        let mut close_rx = self.close_tx.subscribe();
        if *close_rx.borrow_and_update() {
            return;
        }

        let state = self.state();
        if state != NodeState::Running {
            warn!(state = %state, "Run loop requested on a node that is not running");
            return;
        }

        let period = self.health_check_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?period, "Entering run loop");

        let healthcheck = EventName::healthcheck();

        loop {
            tokio::select! {
                biased;

                changed = close_rx.changed() => {
                    if changed.is_err() || *close_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.events.try_dispatch(self, &healthcheck, Value::Null) {
                        Some(result) if result.is_error() => {
                            debug!(message = %result.message, "Health check handler failed");
                        }
                        Some(_) => {}
                        None => debug!("No health check handler registered"),
                    }
                }
            }
        }

        info!("Run loop stopped");
    }

    /// Raise the close signal and tear the node down.
    ///
    /// Never blocks on `wait`: the signal is retained until observed.
    pub async fn send_close_signal(&self) {
        self.close_tx.send_replace(true);
        self.close().await;
    }

    /// Close the client, stop the listener and mark the node stopped.
    ///
    /// Idempotent. An in-flight event dispatch is not interrupted.
    pub async fn close(&self) {
        let previous = {
            let mut state = self.state.write();
            let previous = *state;
            if previous != NodeState::Stopped {
                *state = NodeState::Stopping;
            }
            previous
        };
        self.close_tx.send_replace(true);

        if previous == NodeState::Stopped {
            return;
        }

        self.release_handles().await;
        self.set_state(NodeState::Stopped);

        match self.host_address() {
            Some(address) => info!(address = %address, "Server {} is stopped", address),
            None => info!("Server is stopped"),
        }
    }

    async fn release_handles(&self) {
        let client = self.client.lock().await.take();
        if let Some(mut client) = client {
            client.close().await;
            info!(cluster = %client.remote_address(), "Closed cluster connection");
        }

        let listener = self.listener.lock().await.take();
        if let Some(mut listener) = listener {
            info!("Closing node listener");
            listener.stop().await;
        }
    }

    fn health_check_interval(&self) -> Duration {
        self.config
            .read()
            .as_ref()
            .map(|c| c.health_check_interval)
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_millis(DEFAULT_HEALTH_CHECK_INTERVAL_MS))
    }

    fn transition(&self, from: NodeState, to: NodeState) -> Result<()> {
        let mut state = self.state.write();
        if *state != from {
            return Err(SebarError::IllegalState(format!(
                "expected node state {}, found {}",
                from, *state
            )));
        }
        *state = to;
        debug!(from = %from, to = %to, "Node state changed");
        Ok(())
    }

    fn set_state(&self, to: NodeState) {
        let mut state = self.state.write();
        debug!(from = %*state, to = %to, "Node state changed");
        *state = to;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::network::MemoryNetwork;

    fn seed_config(port: u16) -> NodeConfig {
        NodeConfig {
            host: "localhost".to_string(),
            port,
            health_check_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_without_config() {
        let node = Node::new(Arc::new(MemoryNetwork::new()));
        assert!(matches!(
            node.start().await.unwrap_err(),
            SebarError::ConfigMissing
        ));
        assert_eq!(node.state(), NodeState::Uninitialized);
    }

    #[tokio::test]
    async fn test_seed_start_normalizes_cluster_and_secret() {
        let network = MemoryNetwork::new();
        let node = Node::with_config(Arc::new(network.clone()), seed_config(8888));

        node.start().await.unwrap();
        assert_eq!(node.state(), NodeState::Running);
        assert!(network.is_listening("localhost:8888"));

        let config = node.config().unwrap();
        assert_eq!(config.cluster, config.host_address());
        assert_eq!(config.secret.len(), SECRET_LENGTH);
        assert!(!node.is_joined().await);

        node.close().await;
    }

    #[tokio::test]
    async fn test_configured_secret_is_kept() {
        let node = Node::new(Arc::new(MemoryNetwork::new()));
        let mut config = seed_config(8888);
        config.secret = "given".to_string();
        node.configure(config).unwrap();

        node.start().await.unwrap();
        assert_eq!(node.config().unwrap().secret, "given");
        node.close().await;
    }

    #[tokio::test]
    async fn test_start_twice_is_illegal() {
        let node = Node::with_config(Arc::new(MemoryNetwork::new()), seed_config(8888));
        node.start().await.unwrap();

        assert!(matches!(
            node.start().await.unwrap_err(),
            SebarError::IllegalState(_)
        ));
        assert!(node.configure(seed_config(9999)).is_err());
        node.close().await;
    }

    #[tokio::test]
    async fn test_listener_start_failure() {
        let network = Arc::new(MemoryNetwork::new());
        let first = Node::with_config(network.clone(), seed_config(8888));
        first.start().await.unwrap();

        let second = Node::with_config(network.clone(), seed_config(8888));
        match second.start().await.unwrap_err() {
            SebarError::ListenerStart { address, .. } => assert_eq!(address, "localhost:8888"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(second.state(), NodeState::Stopped);
        assert!(network.is_listening("localhost:8888"));

        first.close().await;
    }

    #[tokio::test]
    async fn test_join_failure_releases_listener() {
        let network = MemoryNetwork::new();
        let mut config = seed_config(8889);
        config.cluster = "localhost:8888".to_string();

        let node = Node::with_config(Arc::new(network.clone()), config);
        assert!(matches!(
            node.start().await.unwrap_err(),
            SebarError::Join { .. }
        ));
        assert_eq!(node.state(), NodeState::Stopped);
        assert!(!network.is_listening("localhost:8889"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let network = MemoryNetwork::new();
        let node = Node::with_config(Arc::new(network.clone()), seed_config(8888));
        node.start().await.unwrap();

        node.close().await;
        node.close().await;
        assert_eq!(node.state(), NodeState::Stopped);
        assert!(!network.is_listening("localhost:8888"));
    }

    #[tokio::test]
    async fn test_close_unstarted_node() {
        let node = Node::new(Arc::new(MemoryNetwork::new()));
        node.close().await;
        node.close().await;
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[tokio::test]
    async fn test_wait_on_unstarted_node_returns() {
        let node = Node::with_config(Arc::new(MemoryNetwork::new()), seed_config(8888));
        tokio::time::timeout(Duration::from_secs(1), node.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_signal_before_wait() {
        let node = Node::with_config(Arc::new(MemoryNetwork::new()), seed_config(8888));
        node.start().await.unwrap();

        node.send_close_signal().await;
        tokio::time::timeout(Duration::from_secs(1), node.wait())
            .await
            .unwrap();
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[tokio::test]
    async fn test_wait_fires_healthcheck_until_closed() {
        let node = Arc::new(Node::with_config(
            Arc::new(MemoryNetwork::new()),
            seed_config(8888),
        ));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        node.add_event("HealthCheck", move |ctx| {
            if ctx.server.host_address().as_deref() == Some("localhost:8888") {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            None
        });
        node.start().await.unwrap();

        let runner = node.clone();
        let handle = tokio::spawn(async move { runner.wait().await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        node.send_close_signal().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(hits.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_wait_without_healthcheck_handler() {
        let node = Arc::new(Node::with_config(
            Arc::new(MemoryNetwork::new()),
            seed_config(8888),
        ));
        node.start().await.unwrap();

        let runner = node.clone();
        let handle = tokio::spawn(async move { runner.wait().await });
        tokio::time::sleep(Duration::from_millis(60)).await;

        node.close().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_during_healthcheck_dispatch() {
        let network = MemoryNetwork::new();
        let node = Arc::new(Node::with_config(
            Arc::new(network.clone()),
            seed_config(8888),
        ));
        let entered = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (entered_flag, finished_flag) = (entered.clone(), finished.clone());
        node.add_event("healthcheck", move |_ctx| {
            if !entered_flag.swap(true, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(300));
                finished_flag.store(true, Ordering::SeqCst);
            }
            None
        });
        node.start().await.unwrap();

        let runner = node.clone();
        let handle = tokio::spawn(async move { runner.wait().await });

        tokio::time::timeout(Duration::from_secs(1), async {
            while !entered.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_millis(200), node.send_close_signal())
            .await
            .unwrap();
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(node.state(), NodeState::Stopped);
        assert!(!network.is_listening("localhost:8888"));

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[test]
    fn test_node_state_display() {
        assert_eq!(NodeState::Running.to_string(), "RUNNING");
        assert_eq!(NodeState::default(), NodeState::Uninitialized);
    }
}
