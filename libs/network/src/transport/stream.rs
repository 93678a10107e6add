//! Raw socket streams
//!
//! Unix and TCP sockets behind one type so the rest of the transport never
//! branches on the address family.

use crate::address::Endpoint;
use crate::{Result, TransportError};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Connected byte stream
#[derive(Debug)]
pub enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    /// Open a connection to `endpoint`
    ///
    /// `timeout` bounds each TCP connect attempt; Unix connects complete or fail
    /// immediately.
    pub fn connect(endpoint: &Endpoint, timeout: Option<Duration>) -> Result<Self> {
        match endpoint {
            Endpoint::Unix(path) => UnixStream::connect(path).map(Stream::Unix).map_err(|e| {
                TransportError::network_with_source(
                    format!("Failed to connect to Unix socket {}", path.display()),
                    e,
                )
            }),
            Endpoint::Inet { .. } => {
                let mut last_error = None;
                for addr in endpoint.socket_addrs()? {
                    let attempt = match timeout {
                        Some(t) => TcpStream::connect_timeout(&addr, t),
                        None => TcpStream::connect(addr),
                    };
                    match attempt {
                        Ok(stream) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(peer = %addr, error = %e, "Failed to set TCP_NODELAY");
                            }
                            return Ok(Stream::Tcp(stream));
                        }
                        Err(e) => last_error = Some(e),
                    }
                }
                Err(match last_error {
                    Some(e) => TransportError::network_with_source(
                        format!("Failed to connect to {endpoint}"),
                        e,
                    ),
                    None => TransportError::network(format!("No address to connect to for {endpoint}")),
                })
            }
        }
    }

    /// Apply read and write deadlines; `None` blocks indefinitely
    pub fn set_timeouts(&self, timeout: Option<Duration>) -> Result<()> {
        let applied = match self {
            Stream::Unix(s) => s
                .set_read_timeout(timeout)
                .and_then(|_| s.set_write_timeout(timeout)),
            Stream::Tcp(s) => s
                .set_read_timeout(timeout)
                .and_then(|_| s.set_write_timeout(timeout)),
        };
        applied.map_err(|e| TransportError::network_with_source("Failed to set socket timeout", e))
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        let applied = match self {
            Stream::Unix(s) => s.set_nonblocking(nonblocking),
            Stream::Tcp(s) => s.set_nonblocking(nonblocking),
        };
        applied.map_err(|e| TransportError::network_with_source("Failed to set socket blocking mode", e))
    }

    /// Close both directions; a peer that already left is not an error
    pub fn shutdown(&self) {
        let result = match self {
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
        };
        if let Err(e) = result {
            if e.kind() != io::ErrorKind::NotConnected {
                debug!(error = %e, "Socket shutdown failed");
            }
        }
    }

    /// Peer description for logs
    pub fn peer_label(&self) -> String {
        match self {
            Stream::Unix(_) => "unix-peer".to_string(),
            Stream::Tcp(s) => s
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Unix(s) => s.read(buf),
            Stream::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Unix(s) => s.write(buf),
            Stream::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Unix(s) => s.flush(),
            Stream::Tcp(s) => s.flush(),
        }
    }
}

impl AsFd for Stream {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Stream::Unix(s) => s.as_fd(),
            Stream::Tcp(s) => s.as_fd(),
        }
    }
}

/// Listening socket
#[derive(Debug)]
pub enum Listener {
    Unix { listener: UnixListener, path: PathBuf },
    Tcp(TcpListener),
}

impl Listener {
    /// Bind `endpoint` and switch the socket to non-blocking mode
    ///
    /// A stale socket file left by an earlier run is removed first.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        let listener = match endpoint {
            Endpoint::Unix(path) => {
                remove_socket_file(path);
                let listener = UnixListener::bind(path).map_err(|e| {
                    TransportError::network_with_source(
                        format!("Failed to bind Unix socket {}", path.display()),
                        e,
                    )
                })?;
                Listener::Unix {
                    listener,
                    path: path.clone(),
                }
            }
            Endpoint::Inet { .. } => {
                let addrs = endpoint.socket_addrs()?;
                let listener = TcpListener::bind(&addrs[..]).map_err(|e| {
                    TransportError::network_with_source(format!("Failed to bind {endpoint}"), e)
                })?;
                Listener::Tcp(listener)
            }
        };

        let nonblocking = match &listener {
            Listener::Unix { listener, .. } => listener.set_nonblocking(true),
            Listener::Tcp(listener) => listener.set_nonblocking(true),
        };
        nonblocking.map_err(|e| {
            TransportError::network_with_source("Failed to make listener non-blocking", e)
        })?;

        Ok(listener)
    }

    /// Accept one pending connection
    ///
    /// Returns the raw I/O error so callers can tell `WouldBlock` apart.
    pub fn accept(&self) -> io::Result<Stream> {
        match self {
            Listener::Unix { listener, .. } => listener.accept().map(|(s, _)| Stream::Unix(s)),
            Listener::Tcp(listener) => listener.accept().map(|(s, _)| Stream::Tcp(s)),
        }
    }

    /// Bound address of an inet listener (resolves port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Unix { .. } => None,
            Listener::Tcp(listener) => listener.local_addr().ok(),
        }
    }

    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            Listener::Unix { path, .. } => Some(path),
            Listener::Tcp(_) => None,
        }
    }
}

impl AsFd for Listener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Listener::Unix { listener, .. } => listener.as_fd(),
            Listener::Tcp(listener) => listener.as_fd(),
        }
    }
}

/// Remove a socket file, tolerating its absence
pub(crate) fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed socket file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove socket file"),
    }
}
