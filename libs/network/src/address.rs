//! Transport addressing
//!
//! A [`SocketMode`] picks between a named local socket (address is a
//! filesystem path) and a network socket (address is `host[:port]`).

use crate::{Result, TransportError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Port used when an inet address carries none
pub const DEFAULT_PORT: u16 = 8080;

/// `sun_path` is 104 bytes on macOS and 108 on Linux; use the smaller limit
const MAX_SOCKET_PATH: usize = 104;

/// Socket mode selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketMode {
    /// Unix domain socket
    Unix,
    /// Internet socket
    #[default]
    Inet,
}

impl SocketMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocketMode::Unix => "unix",
            SocketMode::Inet => "inet",
        }
    }

    /// Apply the local-socket TLS policy
    ///
    /// TLS is never used over a Unix socket. Returns the effective flag and
    /// whether the request was corrected.
    pub fn effective_tls(&self, requested: bool) -> (bool, bool) {
        match self {
            SocketMode::Unix if requested => (false, true),
            SocketMode::Unix => (false, false),
            SocketMode::Inet => (requested, false),
        }
    }
}

impl fmt::Display for SocketMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SocketMode {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "unix" => Ok(SocketMode::Unix),
            "inet" => Ok(SocketMode::Inet),
            other => Err(TransportError::invalid_argument(format!(
                "unknown socket mode '{other}' (expected 'unix' or 'inet')"
            ))),
        }
    }
}

/// Parsed transport address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Named local socket
    Unix(PathBuf),
    /// Network socket
    Inet { host: String, port: u16 },
}

impl Endpoint {
    /// Parse an address for the given mode
    pub fn parse(mode: SocketMode, address: &str) -> Result<Self> {
        match mode {
            SocketMode::Unix => {
                if address.is_empty() {
                    return Err(TransportError::invalid_argument("empty Unix socket path"));
                }
                if address.len() >= MAX_SOCKET_PATH {
                    return Err(TransportError::invalid_argument(format!(
                        "Unix socket path too long ({} bytes, max {}): {address}",
                        address.len(),
                        MAX_SOCKET_PATH - 1
                    )));
                }
                Ok(Endpoint::Unix(PathBuf::from(address)))
            }
            SocketMode::Inet => {
                let (host, port) = split_host_port(address.trim())?;
                Ok(Endpoint::Inet {
                    host: host.trim().to_string(),
                    port,
                })
            }
        }
    }

    pub fn mode(&self) -> SocketMode {
        match self {
            Endpoint::Unix(_) => SocketMode::Unix,
            Endpoint::Inet { .. } => SocketMode::Inet,
        }
    }

    pub fn unix_path(&self) -> Option<&Path> {
        match self {
            Endpoint::Unix(path) => Some(path),
            Endpoint::Inet { .. } => None,
        }
    }

    /// Host name presented for TLS server-name indication
    pub fn tls_host(&self) -> &str {
        match self {
            Endpoint::Inet { host, .. } if !host.is_empty() => host,
            _ => "localhost",
        }
    }

    /// Resolve an inet endpoint; `localhost` and an empty host map to loopback
    pub fn socket_addrs(&self) -> Result<Vec<SocketAddr>> {
        match self {
            Endpoint::Unix(path) => Err(TransportError::invalid_argument(format!(
                "{} is a Unix socket path, not a network address",
                path.display()
            ))),
            Endpoint::Inet { host, port } => {
                if host.is_empty() || host == "localhost" {
                    return Ok(vec![SocketAddr::from((Ipv4Addr::LOCALHOST, *port))]);
                }
                let addrs: Vec<SocketAddr> = (host.as_str(), *port)
                    .to_socket_addrs()
                    .map_err(|e| {
                        TransportError::network_with_source(
                            format!("Failed to resolve {host}:{port}"),
                            e,
                        )
                    })?
                    .collect();
                if addrs.is_empty() {
                    return Err(TransportError::network(format!(
                        "No addresses found for {host}:{port}"
                    )));
                }
                Ok(addrs)
            }
        }
    }
}

/// Split `host[:port]`, `[v6]:port` or a bare IPv6 literal
fn split_host_port(address: &str) -> Result<(&str, u16)> {
    let parse_port = |port: &str| {
        port.trim().parse::<u16>().map_err(|_| {
            TransportError::invalid_argument(format!("invalid port in address '{address}'"))
        })
    };

    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| {
            TransportError::invalid_argument(format!("unterminated '[' in address '{address}'"))
        })?;
        return match tail {
            "" => Ok((host, DEFAULT_PORT)),
            _ => match tail.strip_prefix(':') {
                Some(port) => Ok((host, parse_port(port)?)),
                None => Err(TransportError::invalid_argument(format!(
                    "unexpected text after ']' in address '{address}'"
                ))),
            },
        };
    }

    // more than one colon without brackets: IPv6 literal, no port
    if address.matches(':').count() > 1 {
        return Ok((address, DEFAULT_PORT));
    }

    match address.rsplit_once(':') {
        Some((host, port)) => Ok((host, parse_port(port)?)),
        None => Ok((address, DEFAULT_PORT)),
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
            Endpoint::Inet { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Endpoint::Inet { host, port } => write!(f, "{host}:{port}"),
        }
    }
}
