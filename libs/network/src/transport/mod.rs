//! Transport Abstraction
//!
//! A [`Connection`] moves whole frames over a [`Channel`], which is either a
//! plain socket or a TLS session wrapping one. The variant is fixed when the
//! connection is built; callers only see `send` and `receive`.
//!
//! Wire contract: `send` writes the 16-byte header and then the payload, and
//! both must complete. `receive` reads exactly 16 header bytes and, when the
//! header declares a payload, exactly that many more. A short read at either
//! stage, an orderly close included, is a connection failure.

mod stream;
pub mod tls;

pub use stream::{Listener, Stream};
pub(crate) use stream::remove_socket_file;

use crate::{Result, TransportError};
use bytes::Bytes;
use framelink_codec::{FrameDecoder, Message, MessageHeader, HEADER_SIZE};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, ServerConfig, ServerConnection, StreamOwned};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Bytes pulled from the socket per non-blocking read
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Map a configured timeout to a socket deadline; zero means none
pub(crate) fn deadline(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

/// Plain or TLS byte channel
#[derive(Debug)]
pub enum Channel {
    Plain(Stream),
    TlsClient(Box<StreamOwned<ClientConnection, Stream>>),
    TlsServer(Box<StreamOwned<ServerConnection, Stream>>),
}

impl Channel {
    pub fn stream(&self) -> &Stream {
        match self {
            Channel::Plain(s) => s,
            Channel::TlsClient(tls) => &tls.sock,
            Channel::TlsServer(tls) => &tls.sock,
        }
    }

    pub fn is_tls(&self) -> bool {
        !matches!(self, Channel::Plain(_))
    }
}

impl Read for Channel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Channel::Plain(s) => s.read(buf),
            Channel::TlsClient(tls) => tls.read(buf),
            Channel::TlsServer(tls) => tls.read(buf),
        }
    }
}

impl Write for Channel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Channel::Plain(s) => s.write(buf),
            Channel::TlsClient(tls) => tls.write(buf),
            Channel::TlsServer(tls) => tls.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Channel::Plain(s) => s.flush(),
            Channel::TlsClient(tls) => tls.flush(),
            Channel::TlsServer(tls) => tls.flush(),
        }
    }
}

/// Frames decoded by one non-blocking drain
#[derive(Debug, Default)]
pub struct Drained {
    pub messages: Vec<Message>,
    /// Peer closed its side; nothing more will arrive
    pub closed: bool,
}

/// One open connection, exclusively owned by its creator
#[derive(Debug)]
pub struct Connection {
    channel: Channel,
    timeout: Option<Duration>,
}

impl Connection {
    /// Wrap a connected stream without TLS
    pub fn plain(stream: Stream, timeout: Option<Duration>) -> Self {
        Self {
            channel: Channel::Plain(stream),
            timeout,
        }
    }

    /// Run the client TLS handshake over a connected stream
    ///
    /// The stream must already carry its blocking deadlines.
    pub fn tls_client(
        stream: Stream,
        config: Arc<ClientConfig>,
        server_name: &str,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TransportError::tls(format!("Invalid TLS server name '{server_name}'")))?;
        let session = ClientConnection::new(config, name)
            .map_err(|e| TransportError::tls_with_source("Failed to create TLS client session", e))?;

        let mut tls = StreamOwned::new(session, stream);
        while tls.conn.is_handshaking() {
            tls.conn
                .complete_io(&mut tls.sock)
                .map_err(|e| handshake_error(timeout, e))?;
        }
        debug!(peer = %tls.sock.peer_label(), "TLS client handshake complete");

        Ok(Self {
            channel: Channel::TlsClient(Box::new(tls)),
            timeout,
        })
    }

    /// Prepare an accepted stream for the server's readiness loop
    pub fn accepted(stream: Stream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self::plain(stream, None))
    }

    /// Run the server TLS handshake on an accepted stream
    ///
    /// The handshake runs blocking, bounded by `timeout`; the socket is
    /// switched to non-blocking once it completes.
    pub fn accepted_tls(stream: Stream, config: Arc<ServerConfig>, timeout: Option<Duration>) -> Result<Self> {
        stream.set_nonblocking(false)?;
        stream.set_timeouts(timeout)?;

        let session = ServerConnection::new(config)
            .map_err(|e| TransportError::tls_with_source("Failed to create TLS server session", e))?;
        let mut tls = StreamOwned::new(session, stream);
        while tls.conn.is_handshaking() {
            tls.conn
                .complete_io(&mut tls.sock)
                .map_err(|e| handshake_error(timeout, e))?;
        }

        tls.sock.set_timeouts(None)?;
        tls.sock.set_nonblocking(true)?;

        Ok(Self {
            channel: Channel::TlsServer(Box::new(tls)),
            timeout: None,
        })
    }

    pub fn is_tls(&self) -> bool {
        self.channel.is_tls()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn peer_label(&self) -> String {
        self.channel.stream().peer_label()
    }

    /// Reconfigure the socket deadlines of an open connection
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.channel.stream().set_timeouts(timeout)?;
        self.timeout = timeout;
        Ok(())
    }

    /// Write one frame: header, then payload
    pub fn send(&mut self, message: &Message) -> Result<()> {
        let timeout = self.timeout;
        let header = message.header().to_bytes();

        self.channel
            .write_all(&header)
            .map_err(|e| TransportError::from_stream_io("Sending header", timeout, e))?;
        if message.payload_len() > 0 {
            self.channel
                .write_all(message.payload())
                .map_err(|e| TransportError::from_stream_io("Sending payload", timeout, e))?;
        }
        self.channel
            .flush()
            .map_err(|e| TransportError::from_stream_io("Flushing frame", timeout, e))
    }

    /// Send on a non-blocking server socket, blocking for at most `timeout`
    pub fn send_blocking(&mut self, message: &Message, timeout: Option<Duration>) -> Result<()> {
        let stream = self.channel.stream();
        stream.set_nonblocking(false)?;
        stream.set_timeouts(timeout)?;

        let saved = std::mem::replace(&mut self.timeout, timeout);
        let result = self.send(message);
        self.timeout = saved;

        let stream = self.channel.stream();
        stream.set_timeouts(None)?;
        stream.set_nonblocking(true)?;
        result
    }

    /// Blocking read of exactly one frame
    pub fn receive(&mut self) -> Result<Message> {
        let timeout = self.timeout;
        let mut header_bytes = [0u8; HEADER_SIZE];
        self.channel
            .read_exact(&mut header_bytes)
            .map_err(|e| TransportError::from_stream_io("Receiving header", timeout, e))?;

        let header = MessageHeader::from_bytes(&header_bytes)?;
        let len = header.payload_len()?;

        let payload = if len == 0 {
            Bytes::new()
        } else {
            let mut buf = Vec::new();
            buf.try_reserve_exact(len).map_err(|e| {
                TransportError::system_with_source(format!("Cannot allocate {len}-byte payload"), e)
            })?;
            buf.resize(len, 0);
            self.channel
                .read_exact(&mut buf)
                .map_err(|e| TransportError::from_stream_io("Receiving payload", timeout, e))?;
            Bytes::from(buf)
        };

        Ok(Message::from_parts(header, payload)?)
    }

    /// Read everything the socket has without blocking
    ///
    /// Only complete frames are returned; a partial frame stays in `decoder`.
    pub fn read_available(&mut self, decoder: &mut FrameDecoder) -> Result<Drained> {
        let mut drained = Drained::default();
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            match self.channel.read(&mut chunk) {
                Ok(0) => {
                    drained.closed = true;
                    break;
                }
                Ok(n) => drained.messages.extend(decoder.feed(&chunk[..n])?),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // TLS peer vanished without close_notify
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    drained.closed = true;
                    break;
                }
                Err(e) => return Err(TransportError::from_stream_io("Receiving", None, e)),
            }
        }

        Ok(drained)
    }

    /// Tear down TLS (if any), then close the socket
    pub fn shutdown(&mut self) {
        match &mut self.channel {
            Channel::Plain(_) => {}
            Channel::TlsClient(tls) => {
                tls.conn.send_close_notify();
                let _ = tls.conn.complete_io(&mut tls.sock);
            }
            Channel::TlsServer(tls) => {
                tls.conn.send_close_notify();
                let _ = tls.conn.complete_io(&mut tls.sock);
            }
        }
        self.channel.stream().shutdown();
    }
}

impl AsFd for Connection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.channel.stream().as_fd()
    }
}

fn handshake_error(timeout: Option<Duration>, error: io::Error) -> TransportError {
    match error.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            let message = match timeout {
                Some(t) => format!("TLS handshake timed out after {}ms", t.as_millis()),
                None => "TLS handshake timed out".to_string(),
            };
            TransportError::tls_with_source(message, error)
        }
        _ => TransportError::tls_with_source("TLS handshake failed", error),
    }
}
