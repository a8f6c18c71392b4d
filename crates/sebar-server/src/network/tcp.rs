// TCP network endpoint
// Binds a real socket for the listener role and opens TCP streams for the client role

use std::{
    borrow::Cow,
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::watch,
    task::{JoinHandle, JoinSet},
    time::timeout,
};
use tracing::{debug, info, warn};

use sebar_core::{ClusterClient, Listener, NetworkEndpoint, NetworkError};

/// Default timeout for outbound connects
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed accept, e.g. when the process is out of descriptors
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// An empty host (`:6789`) listens on every interface
fn bind_address(address: &str) -> Cow<'_, str> {
    if address.starts_with(':') {
        Cow::Owned(format!("0.0.0.0{}", address))
    } else {
        Cow::Borrowed(address)
    }
}

/// Network endpoint over plain TCP.
///
/// Inbound connections are accepted and held until the peer hangs up or the
/// listener stops.
/// Credentials are handed to the transport but not verified here; admission
/// checks belong to a full session protocol.
#[derive(Clone, Debug)]
pub struct TcpEndpoint {
    connect_timeout: Duration,
}

impl Default for TcpEndpoint {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl TcpEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl NetworkEndpoint for TcpEndpoint {
    fn listener(&self) -> Box<dyn Listener> {
        Box::new(TcpNodeListener::new())
    }

    async fn connect(
        &self,
        address: &str,
        _secret: &str,
        user_id: &str,
    ) -> Result<Box<dyn ClusterClient>, NetworkError> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| format!("connect to {} timed out", address))??;

        debug!(address = %address, user = %user_id, "Connected to cluster node");
        Ok(Box::new(TcpClusterClient {
            address: address.to_string(),
            stream: Some(stream),
        }))
    }
}

/// Listener role of [`TcpEndpoint`]
#[derive(Default)]
pub struct TcpNodeListener {
    secret: String,
    accounts: HashMap<String, String>,
    local_addr: Option<SocketAddr>,
    live_connections: Arc<AtomicUsize>,
    shutdown_tx: Option<watch::Sender<bool>>,
    accept_task: Option<JoinHandle<()>>,
}

/// Counts an accepted connection for as long as it is alive
struct LiveConnection(Arc<AtomicUsize>);

impl LiveConnection {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TcpNodeListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address actually bound, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Inbound connections currently open
    pub fn connection_count(&self) -> usize {
        self.live_connections.load(Ordering::SeqCst)
    }

    async fn accept_loop(
        listener: TcpListener,
        live: Arc<AtomicUsize>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => break,
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined
                        && e.is_panic()
                    {
                        warn!("Connection task panicked: {}", e);
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "Accepted connection");
                        let guard = LiveConnection::new(live.clone());
                        connections.spawn(Self::hold_connection(stream, peer, guard));
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        debug!(open = connections.len(), "Closing accepted connections");
        connections.shutdown().await;
    }

    /// Drain the peer until it hangs up, then release the socket
    async fn hold_connection(mut stream: TcpStream, peer: SocketAddr, _live: LiveConnection) {
        let mut buf = [0u8; 1024];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(peer = %peer, "Connection error: {}", e);
                    break;
                }
            }
        }
        debug!(peer = %peer, "Connection closed");
    }
}

#[async_trait]
impl Listener for TcpNodeListener {
    fn set_secret(&mut self, secret: &str) {
        self.secret = secret.to_string();
    }

    fn add_account(&mut self, name: &str, secret: &str) {
        self.accounts.insert(name.to_string(), secret.to_string());
    }

    async fn start(&mut self, bind: &str) -> Result<(), NetworkError> {
        if let Some(addr) = self.local_addr {
            return Err(format!("listener already running on {}", addr).into());
        }

        let listener = TcpListener::bind(&*bind_address(bind)).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.accept_task = Some(tokio::spawn(Self::accept_loop(
            listener,
            self.live_connections.clone(),
            shutdown_rx,
        )));
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        info!(
            address = %local_addr,
            accounts = self.accounts.len(),
            admission_secret = !self.secret.is_empty(),
            "Listening on {}",
            local_addr
        );
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            shutdown_tx.send_replace(true);
        }
        if let Some(task) = self.accept_task.take()
            && let Err(e) = task.await
        {
            warn!("Accept loop ended abnormally: {}", e);
        }
        if let Some(addr) = self.local_addr.take() {
            info!(address = %addr, "Stopped listening on {}", addr);
        }
    }
}

/// Client role of [`TcpEndpoint`]
pub struct TcpClusterClient {
    address: String,
    stream: Option<TcpStream>,
}

#[async_trait]
impl ClusterClient for TcpClusterClient {
    fn remote_address(&self) -> &str {
        &self.address
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take()
            && let Err(e) = stream.shutdown().await
        {
            debug!("Error shutting down connection to {}: {}", self.address, e);
        }
    }
}
