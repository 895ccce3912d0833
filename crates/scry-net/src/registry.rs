//! Registry of live overlay connections.
//!
//! Every connection owns an unbounded FIFO queue drained by a dedicated writer
//! task. A message is encoded once into a [`Bytes`] buffer and the same buffer
//! is queued on every connection, so two messages can never interleave on one
//! socket and a slow consumer never stalls the producer or its peers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use scry_protocol::{MessageSink, ServerMessage};
use tokio::sync::{OwnedSemaphorePermit, mpsc};

/// Unique identifier for a connection within one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Return the next unique [`ConnectionId`].
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Error returned when every connection slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection limit reached")]
pub struct ConnectionLimitReached;

/// Held by every queued copy of a broadcast. The permit it wraps is released
/// when the last connection has finished (or abandoned) writing its copy.
pub type WriteGuard = Arc<OwnedSemaphorePermit>;

/// One queued write.
pub(crate) struct Outbound {
    pub(crate) bytes: Bytes,
    pub(crate) _guard: Option<WriteGuard>,
}

/// Producer side of a connection's write queue.
pub(crate) struct ConnectionHandle {
    pub(crate) peer: SocketAddr,
    pub(crate) tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Queue `bytes`; fails once the writer task is gone.
    pub(crate) fn enqueue(&self, bytes: Bytes, guard: Option<WriteGuard>) -> bool {
        self.tx
            .send(Outbound {
                bytes,
                _guard: guard,
            })
            .is_ok()
    }
}

/// A connection slot taken at accept time and handed over on activation.
///
/// Dropping an unconsumed reservation frees the slot.
pub struct SlotReservation {
    registry: Arc<ConnectionRegistry>,
    held: bool,
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        if self.held {
            self.registry.slots.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// Concurrent set of active connections.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionHandle>,
    /// Shared by every server using this registry, so ids stay unique
    /// across restarts.
    ids: IdGenerator,
    /// Reserved plus active connections.
    slots: AtomicUsize,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry admitting at most `max_connections`.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            ids: IdGenerator::new(),
            slots: AtomicUsize::new(0),
            max_connections,
        }
    }

    /// Allocate an id for a new connection.
    pub fn next_id(&self) -> ConnectionId {
        self.ids.next_id()
    }

    /// Take a slot for a connection that is about to be set up.
    pub fn reserve(self: &Arc<Self>) -> Result<SlotReservation, ConnectionLimitReached> {
        self.slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |taken| {
                (taken < self.max_connections).then_some(taken + 1)
            })
            .map_err(|_| ConnectionLimitReached)?;
        Ok(SlotReservation {
            registry: Arc::clone(self),
            held: true,
        })
    }

    /// Make a connection visible to broadcasts. The reservation's slot now
    /// belongs to the connection and is freed by [`remove`](Self::remove).
    pub(crate) fn insert(
        &self,
        id: ConnectionId,
        handle: ConnectionHandle,
        mut reservation: SlotReservation,
    ) {
        reservation.held = false;
        if self.connections.insert(id, handle).is_some() {
            // Re-inserting an id keeps a single slot.
            self.slots.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Remove a connection. Its writer task stops once the queue is drained.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        match self.connections.remove(id) {
            Some((_, handle)) => {
                self.slots.fetch_sub(1, Ordering::AcqRel);
                tracing::debug!("Connection {id} ({}) removed", handle.peer);
                true
            }
            None => false,
        }
    }

    /// Drop every connection.
    pub fn clear(&self) {
        let mut removed = 0usize;
        self.connections.retain(|_, _| {
            removed += 1;
            false
        });
        self.slots.fetch_sub(removed, Ordering::AcqRel);
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is active.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Whether `id` is active.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Ids of every active connection.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| *e.key()).collect()
    }

    /// Encode `message` once and queue it on every connection.
    ///
    /// Returns how many connections accepted it.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        if self.connections.is_empty() {
            return 0;
        }
        self.broadcast_bytes(message.encode(), None)
    }

    /// Queue an already encoded message on every connection.
    ///
    /// Each queued copy holds a clone of `guard`. Connections whose writer
    /// has exited are evicted after the pass.
    pub fn broadcast_bytes(&self, bytes: Bytes, guard: Option<WriteGuard>) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        for entry in self.connections.iter() {
            if entry.value().enqueue(bytes.clone(), guard.clone()) {
                delivered += 1;
            } else {
                dead.push(*entry.key());
            }
        }

        // Removing while iterating would deadlock on the shard lock.
        for id in dead {
            tracing::warn!("Evicting connection {id}: writer gone");
            self.remove(&id);
        }

        delivered
    }

    /// Queue a message on a single connection.
    pub fn send_to(&self, id: &ConnectionId, message: &ServerMessage) -> bool {
        let queued = match self.connections.get(id) {
            Some(handle) => handle.enqueue(message.encode(), None),
            None => return false,
        };
        if !queued {
            self.remove(id);
        }
        queued
    }
}

impl MessageSink for ConnectionRegistry {
    fn publish(&self, message: ServerMessage) {
        let delivered = self.broadcast(&message);
        tracing::trace!("Published {:#010x} to {delivered} connection(s)", message.tag());
    }
}
