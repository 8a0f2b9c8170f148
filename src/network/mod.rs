//! Network module - Handles UDP exchanges with Hexabus devices
//!
//! Provides:
//! - Client issuing one request per socket (query, endpoint query, write)
//! - Address normalization and resolution

mod client;

pub use client::*;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Configuration for network operations
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Port used when an address does not name one
    pub port: u16,
    /// Local address to send from (default: unspecified address of the remote's family)
    pub bind_address: Option<IpAddr>,
    /// Bound for the dial step and for each send and receive, in milliseconds
    pub timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: crate::protocol::DEFAULT_PORT,
            bind_address: None,
            timeout_ms: 3000,
        }
    }
}

impl NetworkConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_bind_address(mut self, addr: IpAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Append `default_port` to an address that does not carry one.
///
/// Accepts `host`, `host:port`, IPv4 and IPv6 literals, and bracketed IPv6
/// with or without a port.
pub fn normalize_address(address: &str, default_port: u16) -> String {
    let address = address.trim();

    if address.parse::<SocketAddr>().is_ok() {
        return address.to_string();
    }

    if let Ok(ip) = address.parse::<IpAddr>() {
        return SocketAddr::new(ip, default_port).to_string();
    }

    if let Some(inner) = address.strip_prefix('[').and_then(|a| a.strip_suffix(']')) {
        return format!("[{}]:{}", inner, default_port);
    }

    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => {
            address.to_string()
        }
        // Unbracketed IPv6 with a zone, e.g. fe80::1%eth0
        Some((host, _)) if host.contains(':') => format!("[{}]:{}", address, default_port),
        _ => format!("{}:{}", address, default_port),
    }
}

/// Resolve a host name or address to a socket address
pub async fn resolve_host(address: &str, default_port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = normalize_address(address, default_port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", address),
        )
    })
}
