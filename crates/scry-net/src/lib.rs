//! TCP plumbing for the feed: listener setup, the registry of live overlay
//! connections with their ordered write queues, the accept/read loop, and a
//! consumer-side client.

pub mod client;
pub mod platform;
pub mod registry;
pub mod server;

pub use client::{ConnectionState, ConnectionStateWatch, FeedClient};
pub use platform::{SocketConfig, configure_stream, create_listener};
pub use registry::{
    ConnectionId, ConnectionLimitReached, ConnectionRegistry, IdGenerator, SlotReservation,
    WriteGuard,
};
pub use server::{FeedServer, PendingConnection, ServerConfig, ServerError, SessionHandler};
