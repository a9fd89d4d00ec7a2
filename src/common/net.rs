//! Network utility functions
//!
//! This module provides utility functions for network operations.

use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use socket2::{SockRef, TcpKeepalive};
use std::time::Duration;
use tokio::net::TcpStream;

use super::error::{SyslogError, Result};

/// Keepalive idle time applied to accepted connections
const KEEPALIVE_TIME: Duration = Duration::from_secs(60);

/// Parse a socket address
///
/// # Arguments
///
/// * `addr` - The address string to parse
///
/// # Returns
///
/// The parsed `SocketAddr`
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    // Try direct parsing first
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    // Try using ToSocketAddrs trait
    match addr.to_socket_addrs() {
        Ok(mut addrs) => {
            if let Some(addr) = addrs.next() {
                Ok(addr)
            } else {
                Err(SyslogError::Config(format!("Failed to parse address: {}", addr)))
            }
        }
        Err(e) => Err(SyslogError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Apply TCP_NODELAY and keepalive to an accepted connection
///
/// Failures are logged and otherwise ignored; the connection stays usable.
pub fn configure_stream(stream: &TcpStream) {
    let socket = SockRef::from(stream);

    if let Err(e) = socket.set_nodelay(true) {
        log::debug!("Failed to set TCP_NODELAY: {}", e);
    }

    let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_TIME);
    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        log::debug!("Failed to set TCP keepalive: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_socket_addr() {
        // Test valid address
        let addr = parse_socket_addr("127.0.0.1:601");
        assert!(addr.is_ok(), "Should be able to parse a valid address");

        if let Ok(socket_addr) = addr {
            assert_eq!(socket_addr.port(), 601);
        }

        // Test invalid address
        let addr = parse_socket_addr("invalid-address");
        assert!(addr.is_err(), "Should fail to parse an invalid address");
    }

    #[tokio::test]
    async fn test_configure_stream() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();

        configure_stream(&client);
        assert!(client.nodelay().unwrap());
    }
}
