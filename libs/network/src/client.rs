//! Client Session
//!
//! Blocking request/acknowledge client. `DISCONNECTED -> CONNECTED ->
//! DISCONNECTED`, any number of times over the session's life.
//!
//! Connection establishment (raw connect, socket deadlines, optional TLS
//! handshake) is the only retried step: up to five attempts with delays of
//! 1, 2, 4 and 8 seconds between them. Sends and receives on an open
//! connection are never retried.

use crate::address::{Endpoint, SocketMode};
use crate::transport::{deadline, tls, Connection, Stream};
use crate::{Result, TransportError};
use framelink_codec::Message;
use rustls::ClientConfig;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default socket deadline for a new session
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Exponential backoff for connection establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds or attempts run out
    ///
    /// `sleep` is called between attempts. Errors that cannot be fixed by
    /// retrying end the loop early.
    pub fn run<T>(
        &self,
        target: &str,
        mut op: impl FnMut(u32) -> Result<T>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let error = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(error);
            }
            if attempt + 1 >= attempts {
                return Err(TransportError::connection_with_source(
                    format!("Failed to connect to {target} after {attempts} attempts"),
                    error,
                ));
            }

            let delay = self.delay_for(attempt);
            warn!(
                target_address = target,
                attempt = attempt + 1,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Connection attempt failed, retrying"
            );
            sleep(delay);
            attempt += 1;
        }
    }
}

/// Client side of one logical conversation with a server
pub struct ClientSession {
    endpoint: Endpoint,
    address: String,
    tls: Option<Arc<ClientConfig>>,
    connection: Option<Connection>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ClientSession {
    /// Create a disconnected session
    ///
    /// TLS requested on a Unix endpoint is turned off with a warning. The TLS
    /// context, when needed, is built once here and reused by every connect.
    pub fn new(mode: SocketMode, address: &str, tls: bool) -> Result<Self> {
        let endpoint = Endpoint::parse(mode, address)?;

        let (tls, corrected) = mode.effective_tls(tls);
        if corrected {
            warn!(address, "TLS is not supported over Unix sockets; disabling TLS");
        }
        let tls = if tls { Some(tls::client_config()?) } else { None };

        Ok(Self {
            endpoint,
            address: address.to_string(),
            tls,
            connection: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Connect, retrying with backoff; `Duration::ZERO` disables deadlines
    pub fn connect(&mut self, timeout: Duration) -> Result<()> {
        self.connect_with(timeout, thread::sleep)
    }

    /// [`connect`](Self::connect) with a caller-supplied sleep between attempts
    pub fn connect_with(&mut self, timeout: Duration, sleep: impl FnMut(Duration)) -> Result<()> {
        if self.connection.is_some() {
            debug!(address = %self.endpoint, "Already connected");
            return Ok(());
        }
        self.timeout = timeout;

        let retry = self.retry;
        let target = self.endpoint.to_string();
        let connection = retry.run(&target, |_| self.connect_once(), sleep)?;

        info!(address = %self.endpoint, tls = connection.is_tls(), "Connected to server");
        self.connection = Some(connection);
        Ok(())
    }

    /// One establishment attempt; a partial connection is closed on failure
    fn connect_once(&self) -> Result<Connection> {
        let timeout = deadline(self.timeout);
        let stream = Stream::connect(&self.endpoint, timeout)?;
        stream.set_timeouts(timeout)?;

        match &self.tls {
            Some(config) => {
                Connection::tls_client(stream, Arc::clone(config), self.endpoint.tls_host(), timeout)
            }
            None => Ok(Connection::plain(stream, timeout)),
        }
    }

    /// Close the connection if there is one
    pub fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.shutdown();
            info!(address = %self.endpoint, "Disconnected from server");
        }
    }

    /// Send `text` as a TEXT frame and wait for the server's ACK
    ///
    /// An I/O failure closes the connection; a reply that is not an ACK is a
    /// protocol error and leaves it open.
    pub fn send_text_and_await_ack(&mut self, text: &str) -> Result<()> {
        let connection = self.connected()?;

        let exchange = connection
            .send(&Message::text(text))
            .and_then(|_| connection.receive());

        match exchange {
            Ok(reply) if reply.is_ack() => {
                debug!(bytes = text.len(), "Message acknowledged");
                Ok(())
            }
            Ok(reply) => Err(TransportError::protocol(format!(
                "Expected ACK, received message type {:#x}",
                reply.header().message_type
            ))),
            Err(e) => {
                self.disconnect();
                Err(e)
            }
        }
    }

    /// Read one frame without the send/ack pairing
    pub fn receive_message(&mut self) -> Result<Message> {
        let result = self.connected()?.receive();
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    /// Change the socket deadline, live if a connection is open
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        match self.connection.as_mut() {
            Some(connection) => connection.set_timeout(deadline(timeout)),
            None => Ok(()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn mode(&self) -> SocketMode {
        self.endpoint.mode()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    fn connected(&mut self) -> Result<&mut Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| TransportError::connection("Not connected"))
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (0..4).map(|a| policy.delay_for(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[test]
    fn test_retry_exhausts_after_five_attempts() {
        let policy = RetryPolicy::default();
        let mut attempts = 0;
        let mut slept = Vec::new();

        let result: Result<()> = policy.run(
            "/tmp/nowhere.sock",
            |_| {
                attempts += 1;
                Err(TransportError::network("refused"))
            },
            |d| slept.push(d),
        );

        let err = result.unwrap_err();
        assert_eq!(err.category(), "connection");
        assert!(err.to_string().contains("after 5 attempts"), "{err}");
        assert_eq!(attempts, 5);
        assert_eq!(
            slept,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[test]
    fn test_retry_stops_on_success() {
        let policy = RetryPolicy::default();
        let mut slept = 0;
        let value = policy
            .run(
                "x",
                |attempt| {
                    if attempt < 2 {
                        Err(TransportError::network("not yet"))
                    } else {
                        Ok(attempt)
                    }
                },
                |_| slept += 1,
            )
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(slept, 2);
    }

    #[test]
    fn test_invalid_argument_is_not_retried() {
        let policy = RetryPolicy::default();
        let mut attempts = 0;
        let err = policy
            .run::<()>(
                "x",
                |_| {
                    attempts += 1;
                    Err(TransportError::invalid_argument("bad"))
                },
                |_| {},
            )
            .unwrap_err();
        assert_eq!(attempts, 1);
        assert_eq!(err.category(), "invalid_argument");
    }

    #[test]
    fn test_unix_tls_is_normalized_off() {
        let session = ClientSession::new(SocketMode::Unix, "/tmp/framelink-test.sock", true).unwrap();
        assert!(!session.tls_enabled());
        assert!(!session.is_connected());
    }

    #[test]
    fn test_send_while_disconnected_fails() {
        let mut session = ClientSession::new(SocketMode::Unix, "/tmp/framelink-test.sock", false).unwrap();
        let err = session.send_text_and_await_ack("hello").unwrap_err();
        assert_eq!(err.category(), "connection");
        // disconnect is idempotent
        session.disconnect();
        session.disconnect();
    }
}
