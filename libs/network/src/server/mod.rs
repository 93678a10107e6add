//! Multiplexed Server
//!
//! One thread serves every client. [`Server::start`] binds the listener and
//! runs the readiness loop until [`ServerHandle::stop`] flips the running
//! flag; the flag is checked at least once per poll timeout.
//!
//! Lifecycle: `STOPPED -> LISTENING -> STOPPED`. [`Server::cleanup`] (also
//! run on drop) closes every registered connection, the listener and, for a
//! Unix endpoint, removes the socket file.

mod event_loop;
pub mod handler;
pub mod registry;

pub use handler::{MessageHandler, NoopHandler};
pub use registry::{ClientId, ConnectionRegistry};

use crate::address::{Endpoint, SocketMode};
use crate::metrics::{MetricsSnapshot, ServerMetrics};
use crate::transport::tls::{self, CredentialProvider, SelfSignedProvider};
use crate::transport::{remove_socket_file, Connection, Listener};
use crate::{Result, TransportError};
use framelink_codec::FrameDecoder;
use parking_lot::Mutex;
use rustls::ServerConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Upper bound on how long a stop request can go unnoticed
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Deadline for a TLS handshake or an ACK write on one connection
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// State visible to other threads while the loop runs
#[derive(Debug)]
struct Shared {
    running: AtomicBool,
    client_count: AtomicUsize,
    metrics: Mutex<ServerMetrics>,
}

/// Cloneable control and observation handle
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// Ask the loop to exit; it notices within one poll timeout
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Currently registered connections
    pub fn client_count(&self) -> usize {
        self.shared.client_count.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.lock().snapshot(Instant::now())
    }
}

/// Registry entry: the connection and its partially assembled frame
#[derive(Debug)]
struct ClientEntry {
    connection: Connection,
    decoder: FrameDecoder,
}

/// Framed-message server
pub struct Server {
    endpoint: Endpoint,
    address: String,
    tls: Option<Arc<ServerConfig>>,
    listener: Option<Listener>,
    registry: ConnectionRegistry<ClientEntry>,
    shared: Arc<Shared>,
    poll_timeout: Duration,
    io_timeout: Duration,
}

impl Server {
    /// Create a server; with TLS on, a self-signed identity is generated now
    ///
    /// TLS requested on a Unix endpoint is turned off with a warning.
    pub fn new(mode: SocketMode, address: &str, tls: bool) -> Result<Self> {
        Self::with_credentials(mode, address, tls, &SelfSignedProvider::default())
    }

    /// Create a server whose TLS identity comes from `credentials`
    pub fn with_credentials(
        mode: SocketMode,
        address: &str,
        tls: bool,
        credentials: &dyn CredentialProvider,
    ) -> Result<Self> {
        let endpoint = Endpoint::parse(mode, address)?;

        let (tls, corrected) = mode.effective_tls(tls);
        if corrected {
            warn!(address, "TLS is not supported over Unix sockets; disabling TLS");
        }
        let tls = if tls {
            Some(tls::server_config(credentials)?)
        } else {
            None
        };

        Ok(Self {
            endpoint,
            address: address.to_string(),
            tls,
            listener: None,
            registry: ConnectionRegistry::new(),
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                client_count: AtomicUsize::new(0),
                metrics: Mutex::new(ServerMetrics::new(Instant::now())),
            }),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        })
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Bind and listen without entering the loop
    pub fn bind(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Err(TransportError::invalid_argument("Server is already listening"));
        }
        let listener = Listener::bind(&self.endpoint)?;
        info!(
            mode = %self.endpoint.mode(),
            address = %self.endpoint,
            tls = self.tls.is_some(),
            "Server listening"
        );
        self.listener = Some(listener);
        self.shared.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Bind, then serve until stopped
    pub fn start<H: MessageHandler>(&mut self, handler: H) -> Result<()> {
        self.bind()?;
        self.run(handler)
    }

    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.lock().snapshot(Instant::now())
    }

    pub fn mode(&self) -> SocketMode {
        self.endpoint.mode()
    }

    /// Address as configured
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Bound inet address, resolving port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(Listener::local_addr)
    }

    /// Close every connection and the listener; safe to call repeatedly
    pub fn cleanup(&mut self) {
        self.shared.running.store(false, Ordering::Release);

        let mut closed = 0usize;
        for (_, mut entry) in self.registry.drain() {
            entry.connection.shutdown();
            closed += 1;
        }
        self.shared.client_count.store(0, Ordering::Release);

        if let Some(listener) = self.listener.take() {
            let path = listener.socket_path().map(|p| p.to_path_buf());
            drop(listener);
            if let Some(path) = path {
                remove_socket_file(&path);
            }
            info!(address = %self.endpoint, closed, "Server cleaned up");
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.cleanup();
    }
}
