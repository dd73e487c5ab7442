//! # Address Resolution
//!
//! Purpose: Turn a `host`/`port` pair into one socket address, classifying
//! literals before falling back to name resolution.
//!
//! ## Design Principles
//! 1. **Cheap Classification**: Literal checks are a single character scan.
//! 2. **First Match Wins**: Resolution takes the first address of either family.
//! 3. **Typed Failures**: Resolution problems are `ConnectFailure`.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

use respc_common::{RespError, RespResult};
use tracing::debug;

/// Host used when the caller passes an empty one.
pub const DEFAULT_HOST: &str = "localhost";

/// Port used when the caller passes zero.
pub const DEFAULT_PORT: u16 = 6379;

/// How a host string was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    /// Only digits and `.`.
    Ipv4Literal,
    /// Only hex digits and `:`.
    Ipv6Literal,
    /// Anything else; needs name resolution.
    Hostname,
}

/// Classifies `host` by its character set.
pub fn classify_host(host: &str) -> HostKind {
    if host.is_empty() {
        return HostKind::Hostname;
    }
    if host.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        HostKind::Ipv4Literal
    } else if host.bytes().all(|b| b.is_ascii_hexdigit() || b == b':') {
        HostKind::Ipv6Literal
    } else {
        HostKind::Hostname
    }
}

/// Resolves `host`/`port`, substituting the defaults for empty/zero values.
pub fn resolve(host: &str, port: u16) -> RespResult<SocketAddr> {
    let host = if host.is_empty() { DEFAULT_HOST } else { host };
    let port = if port == 0 { DEFAULT_PORT } else { port };

    let literal = match classify_host(host) {
        HostKind::Ipv4Literal => host.parse::<Ipv4Addr>().ok().map(IpAddr::V4),
        HostKind::Ipv6Literal => host.parse::<Ipv6Addr>().ok().map(IpAddr::V6),
        HostKind::Hostname => None,
    };
    if let Some(ip) = literal {
        return Ok(SocketAddr::new(ip, port));
    }

    // Strings such as "cafe" look like hex but are ordinary host names.
    let mut addrs = (host, port).to_socket_addrs().map_err(|err| {
        debug!(host, port, error = %err, "name resolution failed");
        RespError::ConnectFailure(err)
    })?;
    addrs.next().ok_or_else(|| {
        debug!(host, port, "name resolution returned no address");
        RespError::ConnectFailure(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no address for {}", host),
        ))
    })
}
