//! Consumer-side client for the feed.
//!
//! Connects to a running feed, decodes everything it sends into
//! [`ServerMessage`]s, and sends [`ClientMessage`] commands back. State
//! changes are published on a [`watch`] channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use scry_protocol::{ClientMessage, ProtocolError, ServerMessage, WireLimits, read_server_message};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, watch};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP handshake in progress.
    Connecting,
    /// Connected and decoding.
    Connected,
    /// Closed by either side, or the stream carried something undecodable.
    Disconnected,
}

/// Observable connection state backed by a [`watch`] channel.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a watch initialized to [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, rx }
    }

    /// Set the current state, notifying all subscribers.
    pub fn set(&self, state: ConnectionState) {
        let _ = self.tx.send(state);
    }

    /// Return a new subscriber.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Current state.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

/// A connection to a feed, as the overlay sees it.
pub struct FeedClient {
    writer: Mutex<OwnedWriteHalf>,
    incoming: mpsc::UnboundedReceiver<ServerMessage>,
    state: Arc<ConnectionStateWatch>,
    shutdown_tx: watch::Sender<bool>,
}

impl FeedClient {
    /// Connect to the feed at `addr` and start decoding.
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        Self::connect_with_limits(addr, WireLimits::default()).await
    }

    /// Connect with custom decoder limits.
    pub async fn connect_with_limits(
        addr: SocketAddr,
        limits: WireLimits,
    ) -> std::io::Result<Self> {
        let state = Arc::new(ConnectionStateWatch::new());
        state.set(ConnectionState::Connecting);

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                state.set(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        stream.set_nodelay(true)?;
        state.set(ConnectionState::Connected);

        let (reader, writer) = stream.into_split();
        let (tx, incoming) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reader_state = Arc::clone(&state);
        tokio::spawn(async move {
            Self::read_loop(reader, tx, limits, &reader_state, shutdown_rx).await;
        });

        Ok(Self {
            writer: Mutex::new(writer),
            incoming,
            state,
            shutdown_tx,
        })
    }

    /// Connection state watch.
    pub fn state(&self) -> &Arc<ConnectionStateWatch> {
        &self.state
    }

    /// Send a command to the feed.
    pub async fn send(&self, message: &ClientMessage) -> std::io::Result<()> {
        let bytes = message.encode();
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await
    }

    /// Next message from the feed; `None` once disconnected and drained.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.incoming.recv().await
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<ServerMessage> {
        tokio::time::timeout(timeout, self.incoming.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next already-received message, if any.
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        self.incoming.try_recv().ok()
    }

    /// Stop decoding and mark the client disconnected.
    pub fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
        self.state.set(ConnectionState::Disconnected);
    }

    async fn read_loop(
        reader: OwnedReadHalf,
        tx: mpsc::UnboundedSender<ServerMessage>,
        limits: WireLimits,
        state: &ConnectionStateWatch,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut reader = BufReader::new(reader);
        loop {
            let result = tokio::select! {
                r = read_server_message(&mut reader, &limits) => r,
                _ = shutdown_rx.wait_for(|stopped| *stopped) => break,
            };
            match result {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                Err(ProtocolError::ConnectionClosed) => break,
                Err(e) => {
                    tracing::warn!("Feed sent an undecodable message: {e}");
                    break;
                }
            }
        }
        state.set(ConnectionState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_protocol::read_client_message;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connection_state_transitions() {
        let watch = ConnectionStateWatch::new();
        assert_eq!(watch.current(), ConnectionState::Disconnected);
        watch.set(ConnectionState::Connecting);
        assert_eq!(watch.current(), ConnectionState::Connecting);
        watch.set(ConnectionState::Connected);
        assert_eq!(watch.current(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_client_decodes_feed_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(&ServerMessage::ChunkUnload { x: 1, z: -1 }.encode())
                .await
                .unwrap();
            stream
                .write_all(&ServerMessage::HotkeyPressed { key: 9 }.encode())
                .await
                .unwrap();
            // Keep the socket open until the client goes away.
            let mut sink = [0u8; 16];
            let _ = tokio::io::AsyncReadExt::read(&mut stream, &mut sink).await;
        });

        let mut client = FeedClient::connect(addr).await.unwrap();
        assert_eq!(client.state().current(), ConnectionState::Connected);
        assert_eq!(
            client.recv().await,
            Some(ServerMessage::ChunkUnload { x: 1, z: -1 })
        );
        assert_eq!(
            client.recv().await,
            Some(ServerMessage::HotkeyPressed { key: 9 })
        );
    }

    #[tokio::test]
    async fn test_client_sends_commands() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_client_message(&mut stream, &WireLimits::default())
                .await
                .unwrap()
        });

        let client = FeedClient::connect(addr).await.unwrap();
        let command = ClientMessage::WatchList(vec!["diamond_ore".into()]);
        client.send(&command).await.unwrap();
        assert_eq!(server.await.unwrap(), command);
    }

    #[tokio::test]
    async fn test_server_close_marks_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut client = FeedClient::connect(addr).await.unwrap();
        let mut rx = client.state().subscribe();
        assert_eq!(client.recv().await, None);
        rx.wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_garbage_from_feed_disconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(&[0xAB; 4]).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut client = FeedClient::connect(addr).await.unwrap();
        assert_eq!(client.recv_timeout(Duration::from_secs(2)).await, None);
        assert_eq!(client.state().current(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_immediate() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = FeedClient::connect(addr).await.unwrap();
        client.disconnect();
        assert_eq!(client.state().current(), ConnectionState::Disconnected);
    }
}
