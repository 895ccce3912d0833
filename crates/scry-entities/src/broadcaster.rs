//! Per-frame entity telemetry with rate limiting and single-frame backpressure.
//!
//! [`EntityBroadcaster::on_frame`] is called from the host's render loop and
//! never blocks. A pass is dropped when it comes too soon after the previous
//! one, when no consumer is connected, or while the previous frame is still
//! being written. Building and encoding happen on a runtime task; the gate
//! permit travels with every queued copy of the frame and is released once
//! the last connection has written it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use scry_net::ConnectionRegistry;
use scry_protocol::ServerMessage;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::cache::MobSendCache;
use crate::frame::build_frame;
use crate::policy::InclusionPolicy;
use crate::snapshot::FrameSnapshot;

/// Host capability reporting the current vertical field of view.
pub trait FieldOfView: Send + Sync {
    /// Field of view in degrees at `partial_tick`.
    fn fov_degrees(&self, partial_tick: f32) -> f32;
}

/// A field of view that never changes.
#[derive(Debug, Clone, Copy)]
pub struct FixedFov(pub f32);

impl Default for FixedFov {
    fn default() -> Self {
        Self(70.0)
    }
}

impl FieldOfView for FixedFov {
    fn fov_degrees(&self, _partial_tick: f32) -> f32 {
        self.0
    }
}

/// Broadcaster timing.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastSettings {
    /// Minimum time between two passes.
    pub min_frame_interval: Duration,
    /// How long a non-player stays eligible for position-only records.
    pub mob_cache_ttl: Duration,
    /// Minimum time between two mob cache sweeps.
    pub cache_cleanup_interval: Duration,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            min_frame_interval: Duration::from_millis(7),
            mob_cache_ttl: Duration::from_secs(5),
            cache_cleanup_interval: Duration::from_secs(1),
        }
    }
}

/// What happened to a frame pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was handed to a runtime task for building and sending.
    Queued,
    /// Too soon after the previous pass.
    RateLimited,
    /// Nobody is listening.
    NoClients,
    /// The previous frame is still in flight.
    Busy,
}

/// Builds and broadcasts entity frames.
pub struct EntityBroadcaster {
    registry: Arc<ConnectionRegistry>,
    fov: Arc<dyn FieldOfView>,
    cache: Arc<MobSendCache>,
    gate: Arc<Semaphore>,
    settings: BroadcastSettings,
    epoch: Instant,
    /// Microseconds since `epoch` of the last accepted pass, offset by one so
    /// that zero means "never".
    last_pass_us: AtomicU64,
}

impl EntityBroadcaster {
    /// Create a broadcaster writing into `registry`.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        fov: Arc<dyn FieldOfView>,
        settings: BroadcastSettings,
    ) -> Self {
        Self {
            registry,
            fov,
            cache: Arc::new(MobSendCache::new(
                settings.mob_cache_ttl,
                settings.cache_cleanup_interval,
            )),
            gate: Arc::new(Semaphore::new(1)),
            settings,
            epoch: Instant::now(),
            last_pass_us: AtomicU64::new(0),
        }
    }

    /// The mob send cache.
    pub fn cache(&self) -> &Arc<MobSendCache> {
        &self.cache
    }

    /// Whether a frame is currently being built or written.
    pub fn is_busy(&self) -> bool {
        self.gate.available_permits() == 0
    }

    /// A consumer connected: forget which mobs were sent so it receives
    /// full records.
    pub fn on_connection(&self) {
        self.cache.clear();
    }

    /// Run one pass. `handle` is the runtime the frame is built on.
    pub fn on_frame(
        &self,
        handle: &Handle,
        snapshot: FrameSnapshot,
        policy: InclusionPolicy,
    ) -> FrameOutcome {
        let now = Instant::now();
        if !self.claim_pass(now) {
            return FrameOutcome::RateLimited;
        }
        self.cache.maybe_cleanup(now);

        if self.registry.is_empty() {
            return FrameOutcome::NoClients;
        }
        let Ok(permit) = Arc::clone(&self.gate).try_acquire_owned() else {
            tracing::trace!("Dropping entity frame: previous frame in flight");
            return FrameOutcome::Busy;
        };

        let fov = self.fov.fov_degrees(snapshot.partial_tick);
        let registry = Arc::clone(&self.registry);
        let cache = Arc::clone(&self.cache);

        handle.spawn(async move {
            let started = Instant::now();
            let frame = build_frame(&snapshot, &policy, fov, &cache, now);
            let entities = frame.records.len();
            let bytes = ServerMessage::EntityFrame(frame).encode();
            let size = bytes.len();
            let delivered = registry.broadcast_bytes(bytes, Some(Arc::new(permit)));
            tracing::trace!(
                "Entity frame: {entities} entities, {size} bytes, {delivered} connection(s), built in {:?}",
                started.elapsed()
            );
        });

        FrameOutcome::Queued
    }

    fn claim_pass(&self, now: Instant) -> bool {
        let now_us = micros(now.saturating_duration_since(self.epoch)).saturating_add(1);
        let min_us = micros(self.settings.min_frame_interval);
        let last = self.last_pass_us.load(Ordering::Acquire);
        if last != 0 && now_us.saturating_sub(last) < min_us {
            return false;
        }
        self.last_pass_us
            .compare_exchange(last, now_us, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
