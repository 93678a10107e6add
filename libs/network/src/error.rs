//! Transport Error Types
//!
//! Error taxonomy for sockets, framing and TLS. Timed-out socket I/O has no
//! variant of its own: it surfaces as [`TransportError::Network`] and the
//! message names the deadline that expired.

use framelink_codec::CodecError;
use std::time::Duration;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket creation, bind, connect or accept failures and socket timeouts
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Malformed or unexpected message at the framing level
    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// TLS context or handshake failures
    #[error("TLS error: {message}")]
    Tls {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Peer closed the connection or the socket became unusable
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Caller misuse
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// OS resource exhaustion
    #[error("System error: {message}")]
    System {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Generic I/O errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a network error for an I/O deadline that expired
    pub fn timed_out(operation: &str, timeout: Option<Duration>, source: std::io::Error) -> Self {
        let message = match timeout {
            Some(t) => format!("{operation} timed out after {}ms", t.as_millis()),
            None => format!("{operation} timed out"),
        };
        Self::network_with_source(message, source)
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Create a protocol error with source
    pub fn protocol_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Protocol {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a TLS error
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
            source: None,
        }
    }

    /// Create a TLS error with source
    pub fn tls_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Tls {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a system error
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
            source: None,
        }
    }

    /// Create a system error with source
    pub fn system_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::System {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Classify an I/O failure observed while moving frame bytes
    ///
    /// Orderly close and reset become `Connection`; expired deadlines become
    /// `Network`; everything else stays `Io`.
    pub fn from_stream_io(operation: &str, timeout: Option<Duration>, error: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match error.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => Self::timed_out(operation, timeout, error),
            ErrorKind::UnexpectedEof => {
                Self::connection_with_source(format!("{operation}: peer closed connection"), error)
            }
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => {
                Self::connection_with_source(format!("{operation}: connection lost"), error)
            }
            ErrorKind::OutOfMemory => Self::system_with_source(format!("{operation}: out of memory"), error),
            _ => Self::Io { source: error },
        }
    }

    /// Whether connection establishment may retry after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { .. } => true,
            TransportError::Connection { .. } => true,
            TransportError::Tls { .. } => true,
            TransportError::Io { .. } => true,
            TransportError::System { .. } => true,
            TransportError::Protocol { .. } => false,
            TransportError::InvalidArgument { .. } => false,
        }
    }

    /// Get error category for logs
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Network { .. } => "network",
            TransportError::Protocol { .. } => "protocol",
            TransportError::Tls { .. } => "tls",
            TransportError::Connection { .. } => "connection",
            TransportError::InvalidArgument { .. } => "invalid_argument",
            TransportError::System { .. } => "system",
            TransportError::Io { .. } => "io",
        }
    }
}

/// Convert codec errors to transport errors
impl From<CodecError> for TransportError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::AllocationFailed { .. } | CodecError::LengthOverflow { .. } => {
                TransportError::system_with_source("Cannot hold payload in memory", error)
            }
            _ => TransportError::protocol_with_source("Malformed frame", error),
        }
    }
}

/// Convert rustls errors to transport errors
impl From<rustls::Error> for TransportError {
    fn from(error: rustls::Error) -> Self {
        TransportError::tls_with_source("TLS session failure", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_error_categorization() {
        assert_eq!(TransportError::network("x").category(), "network");
        assert_eq!(TransportError::protocol("x").category(), "protocol");
        assert_eq!(TransportError::tls("x").category(), "tls");
        assert_eq!(TransportError::connection("x").category(), "connection");
        assert_eq!(TransportError::invalid_argument("x").category(), "invalid_argument");
        assert_eq!(TransportError::system("x").category(), "system");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TransportError::network("refused").is_retryable());
        assert!(TransportError::tls("handshake").is_retryable());
        assert!(!TransportError::invalid_argument("bad port").is_retryable());
        assert!(!TransportError::protocol("expected ack").is_retryable());
    }

    #[test]
    fn test_timeout_surfaces_as_network() {
        let err = TransportError::from_stream_io(
            "receive",
            Some(Duration::from_secs(5)),
            Error::new(ErrorKind::WouldBlock, "resource temporarily unavailable"),
        );
        match err {
            TransportError::Network { message, .. } => {
                assert!(message.contains("timed out after 5000ms"), "{message}");
            }
            other => panic!("Expected Network error, got {other:?}"),
        }
    }

    #[test]
    fn test_eof_surfaces_as_connection() {
        let err = TransportError::from_stream_io(
            "receive header",
            None,
            Error::new(ErrorKind::UnexpectedEof, "eof"),
        );
        assert_eq!(err.category(), "connection");
    }

    #[test]
    fn test_codec_error_conversion() {
        let err = TransportError::from(CodecError::TruncatedHeader { need: 16, got: 3 });
        assert_eq!(err.category(), "protocol");

        let err = TransportError::from(CodecError::AllocationFailed { length: 1 << 40 });
        assert_eq!(err.category(), "system");
    }
}
