use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::TransportError;

/// Where a message socket connects to or listens on.
///
/// Accepted textual forms:
/// - `tcp://host:port` or a bare `host:port`
/// - `unix:/path/to.sock`, `unix:///path/to.sock`, or any string containing `/`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// TCP endpoint in `host:port` form.
    Tcp(String),
    /// Filesystem-path Unix domain socket.
    Unix(PathBuf),
}

impl Address {
    /// TCP endpoint from a host and port.
    pub fn tcp(host: &str, port: u16) -> Self {
        if host.contains(':') && !host.starts_with('[') {
            // Bare IPv6 literal.
            Address::Tcp(format!("[{host}]:{port}"))
        } else {
            Address::Tcp(format!("{host}:{port}"))
        }
    }

    /// Unix domain socket at `path`.
    pub fn unix(path: impl AsRef<Path>) -> Self {
        Address::Unix(path.as_ref().to_path_buf())
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Address::Tcp(_) => "tcp",
            Address::Unix(_) => "unix-domain-socket",
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp(host_port) => write!(f, "tcp://{host_port}"),
            Address::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl FromStr for Address {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TransportError::InvalidAddress("empty address".to_string()));
        }

        if let Some(rest) = input.strip_prefix("unix:") {
            let path = rest.strip_prefix("//").unwrap_or(rest);
            if path.is_empty() {
                return Err(TransportError::InvalidAddress(input.to_string()));
            }
            return Ok(Address::Unix(PathBuf::from(path)));
        }

        if let Some(rest) = input.strip_prefix("tcp://") {
            return parse_host_port(rest).map(Address::Tcp);
        }

        if input.contains('/') {
            return Ok(Address::Unix(PathBuf::from(input)));
        }

        parse_host_port(input).map(Address::Tcp)
    }
}

fn parse_host_port(input: &str) -> Result<String, TransportError> {
    let (host, port) = input
        .rsplit_once(':')
        .ok_or_else(|| TransportError::InvalidAddress(format!("missing port: {input}")))?;
    if host.is_empty() {
        return Err(TransportError::InvalidAddress(format!("missing host: {input}")));
    }
    port.parse::<u16>()
        .map_err(|_| TransportError::InvalidAddress(format!("invalid port: {input}")))?;
    Ok(input.to_string())
}
