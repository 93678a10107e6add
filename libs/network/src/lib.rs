//! Framelink Network Transport
//!
//! Moves [`framelink_codec`] frames over Unix or TCP sockets, optionally
//! inside TLS.
//!
//! - [`transport`]: plain/TLS channels with whole-frame `send`/`receive`
//! - [`server`]: single-threaded poll loop over a registry of connections
//! - [`client`]: blocking session with connection retry and ACK waiting
//! - [`metrics`]: counters the server updates once per received message
//!
//! Diagnostics go through `tracing`; nothing here installs a subscriber.
//!
//! ```no_run
//! use framelink_network::{ClientSession, SocketMode};
//! use std::time::Duration;
//!
//! let mut client = ClientSession::new(SocketMode::Unix, "/tmp/server.sock", false)?;
//! client.connect(Duration::from_secs(5))?;
//! client.send_text_and_await_ack("ping")?;
//! client.disconnect();
//! # Ok::<(), framelink_network::TransportError>(())
//! ```

pub mod address;
pub mod client;
pub mod error;
pub mod metrics;
pub mod server;
pub mod transport;

pub use address::{Endpoint, SocketMode, DEFAULT_PORT};
pub use client::{ClientSession, RetryPolicy, DEFAULT_TIMEOUT};
pub use error::{Result, TransportError};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use server::{ClientId, MessageHandler, NoopHandler, Server, ServerHandle};
pub use transport::tls::{CredentialProvider, Credentials, SelfSignedProvider, StaticCredentials};
pub use transport::{Channel, Connection};

pub use framelink_codec::{Message, MessageFlags, MessageHeader, MessageType, HEADER_SIZE};
