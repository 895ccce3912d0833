//! Socket options for the feed listener and accepted overlay connections.

use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use tokio::net::{TcpListener, TcpStream};

/// Options applied to the listener and every accepted stream.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Disable Nagle's algorithm. Entity frames are latency sensitive. Default: true.
    pub nodelay: bool,
    /// Keepalive idle time, `None` to leave keepalive off. Default: 30s.
    pub keepalive: Option<Duration>,
    /// `SO_REUSEADDR` on the listener, so a restart can rebind the port while
    /// old sockets sit in TIME_WAIT. Default: true except on Windows.
    pub reuse_addr: bool,
    /// Listen backlog. Default: 16.
    pub backlog: i32,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: Some(Duration::from_secs(30)),
            reuse_addr: !cfg!(target_os = "windows"),
            backlog: 16,
        }
    }
}

/// Apply per-stream options to an accepted connection.
pub fn configure_stream(stream: &TcpStream, config: &SocketConfig) -> std::io::Result<()> {
    stream.set_nodelay(config.nodelay)?;

    if let Some(idle) = config.keepalive {
        let keepalive = TcpKeepalive::new().with_time(idle);
        SockRef::from(stream).set_tcp_keepalive(&keepalive)?;
    }

    Ok(())
}

/// Bind a non-blocking listener with the configured options.
///
/// Must be called inside a tokio runtime.
pub fn create_listener(addr: SocketAddr, config: &SocketConfig) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    if config.reuse_addr {
        socket.set_reuse_address(true)?;
    }
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(config.backlog)?;

    TcpListener::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_accepts_on_loopback() {
        let listener =
            create_listener("127.0.0.1:0".parse().unwrap(), &SocketConfig::default()).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let _client = TcpStream::connect(addr).await.unwrap();
        let (server_side, _) = listener.accept().await.unwrap();
        configure_stream(&server_side, &SocketConfig::default()).unwrap();
        assert!(server_side.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_keepalive_enabled_when_configured() {
        let listener =
            create_listener("127.0.0.1:0".parse().unwrap(), &SocketConfig::default()).unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        configure_stream(&client, &SocketConfig::default()).unwrap();
        assert!(SockRef::from(&client).keepalive().unwrap());
    }

    #[tokio::test]
    async fn test_nodelay_disabled_when_configured() {
        let config = SocketConfig {
            nodelay: false,
            keepalive: None,
            ..Default::default()
        };
        let listener =
            create_listener("127.0.0.1:0".parse().unwrap(), &SocketConfig::default()).unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        configure_stream(&client, &config).unwrap();
        assert!(!client.nodelay().unwrap());
    }

    #[cfg(not(target_os = "windows"))]
    #[tokio::test]
    async fn test_rebind_after_close() {
        let config = SocketConfig::default();
        let listener = create_listener("127.0.0.1:0".parse().unwrap(), &config).unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();
        drop(accepted);
        drop(client);
        drop(listener);

        // The port is immediately reusable for a restarted feed.
        let again = create_listener(addr, &config);
        assert!(again.is_ok(), "rebind failed: {:?}", again.err());
    }

    #[tokio::test]
    async fn test_second_bind_on_same_port_fails() {
        let config = SocketConfig::default();
        let first = create_listener("127.0.0.1:0".parse().unwrap(), &config).unwrap();
        let addr = first.local_addr().unwrap();
        assert!(create_listener(addr, &config).is_err());
    }
}
