//! Readiness loop
//!
//! Each iteration rebuilds the poll set from the listener plus every
//! registered connection, waits up to the poll timeout, and records which
//! handles fired before touching the registry. Servicing then works from
//! that owned list, so evictions never invalidate what is left to visit.

use super::{ClientEntry, ClientId, MessageHandler, Server};
use crate::transport::{deadline, Connection};
use crate::{Result, TransportError};
use framelink_codec::{FrameDecoder, Message};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use std::io;
use std::os::fd::AsFd;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Handles that fired during one poll
#[derive(Debug, Default)]
struct Readiness {
    listener: bool,
    clients: Vec<(ClientId, PollFlags)>,
}

impl Server {
    /// Serve until stopped or until polling itself fails
    pub fn run<H: MessageHandler>(&mut self, mut handler: H) -> Result<()> {
        if self.listener.is_none() {
            return Err(TransportError::invalid_argument("Server is not bound"));
        }

        while self.shared.running.load(Ordering::Acquire) {
            let ready = match self.wait_for_readiness() {
                Ok(ready) => ready,
                Err(e) => {
                    error!(error = %e, "Event loop cannot continue");
                    self.shared.running.store(false, Ordering::Release);
                    return Err(e);
                }
            };

            if ready.listener {
                if let Some(id) = self.accept_one() {
                    // frames that arrived with the TLS Finished message are
                    // already decrypted inside the session, where poll cannot see them
                    if self.registry.get(id).is_some_and(|e| e.connection.is_tls()) {
                        self.service(id, PollFlags::POLLIN, &mut handler);
                    }
                }
            }
            for (id, revents) in ready.clients {
                self.service(id, revents, &mut handler);
            }
        }

        info!(address = %self.endpoint, "Server stopped");
        Ok(())
    }

    fn wait_for_readiness(&mut self) -> Result<Readiness> {
        let Some(listener) = self.listener.as_ref() else {
            return Err(TransportError::invalid_argument("Server is not bound"));
        };

        let capacity = self.registry.len() + 1;
        let mut fds: Vec<PollFd<'_>> = Vec::new();
        let mut ids: Vec<ClientId> = Vec::new();
        fds.try_reserve(capacity)
            .and_then(|_| ids.try_reserve(capacity))
            .map_err(|e| TransportError::system_with_source("Cannot allocate poll set", e))?;

        fds.push(PollFd::new(listener.as_fd(), PollFlags::POLLIN));
        for (id, entry) in self.registry.iter() {
            fds.push(PollFd::new(entry.connection.as_fd(), PollFlags::POLLIN));
            ids.push(id);
        }

        let timeout_ms = u16::try_from(self.poll_timeout.as_millis()).unwrap_or(u16::MAX);
        match poll(&mut fds, timeout_ms) {
            Ok(0) => return Ok(Readiness::default()),
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(Readiness::default()),
            Err(e) => return Err(TransportError::system_with_source("poll failed", e)),
        }

        let listener_ready = fds[0]
            .revents()
            .is_some_and(|r| r.contains(PollFlags::POLLIN));
        let clients = fds[1..]
            .iter()
            .zip(ids)
            .filter_map(|(fd, id)| match fd.revents() {
                Some(r) if !r.is_empty() => Some((id, r)),
                _ => None,
            })
            .collect();

        Ok(Readiness {
            listener: listener_ready,
            clients,
        })
    }

    /// Accept one pending connection and register it
    ///
    /// A failed TLS handshake drops only the new connection.
    fn accept_one(&mut self) -> Option<ClientId> {
        let listener = self.listener.as_ref()?;

        let stream = match listener.accept() {
            Ok(stream) => stream,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                return None;
            }
        };

        let peer = stream.peer_label();
        let connection = match &self.tls {
            Some(config) => {
                Connection::accepted_tls(stream, Arc::clone(config), deadline(self.io_timeout))
            }
            None => Connection::accepted(stream),
        };
        let connection = match connection {
            Ok(connection) => connection,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Dropping connection during setup");
                return None;
            }
        };

        let tls = connection.is_tls();
        let id = self.registry.insert(ClientEntry {
            connection,
            decoder: FrameDecoder::new(),
        });
        self.shared
            .client_count
            .store(self.registry.len(), Ordering::Release);
        self.shared.metrics.lock().record_client();

        info!(client_id = %id, peer = %peer, tls, clients = self.registry.len(), "Client connected");
        Some(id)
    }

    fn service<H: MessageHandler>(&mut self, id: ClientId, revents: PollFlags, handler: &mut H) {
        let Some(entry) = self.registry.get_mut(id) else {
            return;
        };

        if revents.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) && !revents.contains(PollFlags::POLLIN) {
            self.evict(id, "socket error");
            return;
        }

        let drained = match entry.connection.read_available(&mut entry.decoder) {
            Ok(drained) => drained,
            Err(e) => {
                warn!(client_id = %id, error = %e, "Read failed");
                self.evict(id, "read failure");
                return;
            }
        };

        for message in &drained.messages {
            if !self.dispatch(id, message, handler) {
                return;
            }
        }

        if drained.closed {
            self.evict(id, "peer closed connection");
        } else if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL) {
            self.evict(id, "hang-up");
        }
    }

    /// Account for one inbound frame, hand it off and acknowledge it
    ///
    /// Returns false when the connection was evicted.
    fn dispatch<H: MessageHandler>(&mut self, id: ClientId, message: &Message, handler: &mut H) -> bool {
        self.shared
            .metrics
            .lock()
            .record_message(message.payload_len(), Instant::now());

        debug!(
            client_id = %id,
            message_type = message.header().message_type,
            bytes = message.payload_len(),
            "Message received"
        );
        handler.on_message(id, message);

        if message.is_ack() {
            return true;
        }

        let timeout = deadline(self.io_timeout);
        let sent = match self.registry.get_mut(id) {
            Some(entry) => entry.connection.send_blocking(&Message::ack(), timeout),
            None => return false,
        };
        if let Err(e) = sent {
            warn!(client_id = %id, error = %e, "Failed to send ACK");
            self.evict(id, "ACK send failure");
            return false;
        }
        true
    }

    fn evict(&mut self, id: ClientId, reason: &str) {
        let Some(mut entry) = self.registry.remove(id) else {
            return;
        };
        if entry.decoder.has_partial() {
            debug!(client_id = %id, buffered = entry.decoder.buffered(), "Discarding partial frame");
        }
        entry.connection.shutdown();
        self.shared
            .client_count
            .store(self.registry.len(), Ordering::Release);

        info!(client_id = %id, reason, clients = self.registry.len(), "Client disconnected");
    }
}
