//! Feed server: accept loop plus one reader and one writer task per connection.
//!
//! Accepted connections start out *pending*: their writer task is running but
//! they are not in the [`ConnectionRegistry`] yet, so broadcasts skip them.
//! The [`SessionHandler`] decides when to [`activate`](PendingConnection::activate)
//! them, queueing the initial snapshot first so that it always precedes every
//! broadcast the connection will see.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use scry_protocol::{ClientMessage, ProtocolError, WireLimits, read_client_message};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use crate::platform::{SocketConfig, configure_stream, create_listener};
use crate::registry::{
    ConnectionHandle, ConnectionId, ConnectionRegistry, Outbound, SlotReservation,
};

/// Errors raised while starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The bind address is not a literal IP address.
    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),

    /// The listener could not be created.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Configuration for [`FeedServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Default: `127.0.0.1:25566`.
    pub bind_addr: SocketAddr,
    /// Listener and stream options.
    pub socket: SocketConfig,
    /// Decoder limits for inbound commands.
    pub limits: WireLimits,
}

impl ServerConfig {
    /// Build a config from a textual IP address and a port.
    pub fn from_host_port(host: &str, port: u16) -> Result<Self, ServerError> {
        let ip: IpAddr = host
            .parse()
            .map_err(|_| ServerError::InvalidAddress(host.to_string()))?;
        Ok(Self {
            bind_addr: SocketAddr::new(ip, port),
            ..Self::default()
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 25566)),
            socket: SocketConfig::default(),
            limits: WireLimits::default(),
        }
    }
}

/// Callbacks from the server into the application.
///
/// All methods are called from runtime tasks and must not block.
pub trait SessionHandler: Send + Sync + 'static {
    /// A connection was accepted. Call [`PendingConnection::activate`] (now or
    /// later, from any thread) to start broadcasting to it; dropping it closes
    /// the outbound side.
    fn on_connect(&self, pending: PendingConnection);

    /// A complete command arrived on `id`.
    fn on_message(&self, id: ConnectionId, message: ClientMessage);

    /// The reader for `id` stopped. The connection is already out of the
    /// registry.
    fn on_disconnect(&self, _id: ConnectionId) {}
}

/// An accepted connection that broadcasts do not reach yet.
pub struct PendingConnection {
    id: ConnectionId,
    handle: ConnectionHandle,
    reservation: SlotReservation,
    registry: Arc<ConnectionRegistry>,
    shutdown_rx: watch::Receiver<bool>,
    /// Cleared by the reader task before it removes the connection.
    reader_alive: Arc<AtomicBool>,
}

impl PendingConnection {
    /// The connection's id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.handle.peer
    }

    /// Queue `snapshot` (if any) and then join the registry.
    ///
    /// Returns `false` when the server has shut down or either connection
    /// task already exited; the connection is discarded in that case.
    pub fn activate(self, snapshot: Option<Bytes>) -> bool {
        if *self.shutdown_rx.borrow() || !self.reader_alive.load(Ordering::SeqCst) {
            return false;
        }
        if let Some(bytes) = snapshot
            && !self.handle.enqueue(bytes, None)
        {
            return false;
        }
        if self.handle.tx.is_closed() {
            return false;
        }
        self.registry
            .insert(self.id, self.handle, self.reservation);
        // The reader may have stopped between the check above and the insert,
        // in which case its removal ran too early.
        if !self.reader_alive.load(Ordering::SeqCst) {
            self.registry.remove(&self.id);
            return false;
        }
        tracing::debug!("Connection {} active", self.id);
        true
    }
}

/// TCP server for overlay connections.
pub struct FeedServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<dyn SessionHandler>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl FeedServer {
    /// Create a server that registers connections in `registry`.
    pub fn new(
        config: ServerConfig,
        registry: Arc<ConnectionRegistry>,
        handler: Arc<dyn SessionHandler>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            registry,
            handler,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// The registry connections are activated into.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Bind the configured address. Must be called inside a tokio runtime.
    pub fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.bind_addr;
        let listener = create_listener(addr, &self.config.socket)
            .map_err(|source| ServerError::Bind { addr, source })?;
        tracing::info!("Feed listening on {addr}");
        Ok(listener)
    }

    /// Bind and run the accept loop until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind()?;
        self.run_with_listener(listener).await;
        Ok(())
    }

    /// Run the accept loop with a pre-bound listener.
    pub async fn run_with_listener(&self, listener: TcpListener) {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.accept(stream, peer),
                        Err(e) => tracing::warn!("Accept failed: {e}"),
                    }
                }
                _ = shutdown_rx.wait_for(|stopped| *stopped) => {
                    tracing::info!("Feed server shutting down");
                    break;
                }
            }
        }
    }

    /// Stop accepting, stop every connection task, and forget all
    /// connections. Queued writes are abandoned.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.registry.clear();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    fn accept(&self, stream: TcpStream, peer: SocketAddr) {
        let reservation = match self.registry.reserve() {
            Ok(r) => r,
            Err(_) => {
                tracing::warn!("Connection limit reached, rejecting {peer}");
                return;
            }
        };
        if let Err(e) = configure_stream(&stream, &self.config.socket) {
            tracing::warn!("Could not configure socket for {peer}: {e}");
        }

        let id = self.registry.next_id();
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let reader_alive = Arc::new(AtomicBool::new(true));
        tracing::info!("Accepted connection {id} from {peer}");

        tokio::spawn(write_loop(
            id,
            writer,
            rx,
            Arc::clone(&self.registry),
            self.shutdown_rx.clone(),
        ));
        tokio::spawn(read_loop(
            id,
            reader,
            Arc::clone(&self.handler),
            Arc::clone(&self.registry),
            self.config.limits,
            self.shutdown_rx.clone(),
            Arc::clone(&reader_alive),
        ));

        self.handler.on_connect(PendingConnection {
            id,
            handle: ConnectionHandle { peer, tx },
            reservation,
            registry: Arc::clone(&self.registry),
            shutdown_rx: self.shutdown_rx.clone(),
            reader_alive,
        });
    }
}

/// Drain the connection's queue, one complete message per `write_all`.
async fn write_loop(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    registry: Arc<ConnectionRegistry>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let outbound = tokio::select! {
            next = rx.recv() => match next {
                Some(outbound) => outbound,
                None => break,
            },
            _ = shutdown_rx.wait_for(|stopped| *stopped) => break,
        };

        let result = tokio::select! {
            r = writer.write_all(&outbound.bytes) => r,
            _ = shutdown_rx.wait_for(|stopped| *stopped) => break,
        };
        if let Err(e) = result {
            tracing::warn!("Write to connection {id} failed: {e}");
            registry.remove(&id);
            break;
        }
    }
    tracing::debug!("Writer for connection {id} stopped");
}

/// Decode commands until the peer goes away or sends garbage.
async fn read_loop(
    id: ConnectionId,
    reader: OwnedReadHalf,
    handler: Arc<dyn SessionHandler>,
    registry: Arc<ConnectionRegistry>,
    limits: WireLimits,
    mut shutdown_rx: watch::Receiver<bool>,
    alive: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(reader);
    loop {
        let result = tokio::select! {
            r = read_client_message(&mut reader, &limits) => r,
            _ = shutdown_rx.wait_for(|stopped| *stopped) => return,
        };
        match result {
            Ok(message) => {
                tracing::debug!("Connection {id} sent {:#010x}", message.tag());
                handler.on_message(id, message);
            }
            Err(ProtocolError::ConnectionClosed) => {
                tracing::info!("Connection {id} closed by peer");
                break;
            }
            Err(e) => {
                tracing::warn!("Dropping connection {id}: {e}");
                break;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
    registry.remove(&id);
    handler.on_disconnect(id);
}
