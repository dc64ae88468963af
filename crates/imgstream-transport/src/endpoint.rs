use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

use crate::error::{Result, TransportError};

const TCP_SCHEME: &str = "tcp://";

/// Which side of the connection a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Listen on a local port and wait for the peer to dial in.
    Bind,
    /// Dial out to a listening peer.
    Connect,
}

/// Where a session attaches to the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Listen on a local socket address.
    Bind(SocketAddr),
    /// Dial `host:port`, optionally prefixed with `tcp://`.
    Connect(String),
}

impl Endpoint {
    /// Listen on all interfaces at `port`. Port 0 picks an ephemeral port.
    pub fn bind_port(port: u16) -> Self {
        Endpoint::Bind(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)))
    }

    /// Listen on an explicit local address.
    pub fn bind_addr(addr: SocketAddr) -> Self {
        Endpoint::Bind(addr)
    }

    /// Dial the given address.
    pub fn connect(addr: impl Into<String>) -> Self {
        Endpoint::Connect(addr.into())
    }

    pub fn role(&self) -> Role {
        match self {
            Endpoint::Bind(_) => Role::Bind,
            Endpoint::Connect(_) => Role::Connect,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Bind(addr) => write!(f, "bind {TCP_SCHEME}{addr}"),
            Endpoint::Connect(addr) => write!(f, "connect {TCP_SCHEME}{}", strip_scheme(addr)),
        }
    }
}

/// Drop a leading `tcp://` if present.
pub fn strip_scheme(addr: &str) -> &str {
    addr.strip_prefix(TCP_SCHEME).unwrap_or(addr)
}

/// Resolve a dial address into candidate socket addresses.
pub(crate) fn resolve(addr: &str) -> Result<Vec<SocketAddr>> {
    let host_port = strip_scheme(addr);
    let resolved: Vec<SocketAddr> = host_port
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            addr: addr.to_string(),
            source,
        })?
        .collect();

    if resolved.is_empty() {
        return Err(TransportError::Resolve {
            addr: addr.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "address resolved to no candidates",
            ),
        });
    }
    Ok(resolved)
}
