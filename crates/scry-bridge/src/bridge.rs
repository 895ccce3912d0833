//! The host-facing handle.
//!
//! A [`Bridge`] owns everything the feed needs while it runs: a tokio runtime
//! for the listener and connection tasks, the scan worker that owns the
//! tracking store, and the feed server. The host calls its `on_*` methods
//! from the render and tick threads; none of them block on the network.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use scry_blocks::{
    BlockPos, BlockSource, ChunkPos, ScanError, ScanGeometry, ScanSettings, ScanWorker,
    TrackingStore,
};
use scry_config::Config;
use scry_entities::{
    BroadcastSettings, EntityBroadcaster, FieldOfView, FrameOutcome, FrameSnapshot,
};
use scry_net::{
    ConnectionId, ConnectionRegistry, FeedServer, PendingConnection, ServerConfig, ServerError,
    SessionHandler, SocketConfig,
};
use scry_protocol::{ClientMessage, MessageSink, ServerMessage};
use tokio::runtime::Runtime;

use crate::commands::{self, Followup};
use crate::error::BridgeError;
use crate::settings::SharedSettings;

/// Callback fired on every accepted connection.
pub type ConnectionListener = Arc<dyn Fn() + Send + Sync>;

const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Live feed: runtime, listener and scan worker.
struct Running {
    runtime: Runtime,
    server: Arc<FeedServer>,
    worker: ScanWorker,
    local_addr: SocketAddr,
}

impl Running {
    fn stop(mut self) {
        self.server.shutdown();
        self.worker.shutdown();
        self.runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    }
}

#[derive(Default)]
struct Lifecycle {
    running: Option<Running>,
    fully_disabled: bool,
}

struct BridgeInner {
    config: Config,
    source: Arc<dyn BlockSource>,
    settings: Arc<SharedSettings>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: EntityBroadcaster,
    listeners: RwLock<Vec<ConnectionListener>>,
    lifecycle: Mutex<Lifecycle>,
    ticks: AtomicU64,
}

/// Host-facing handle to the feed. Dropping it shuts the feed down.
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl Bridge {
    /// Create a stopped bridge.
    ///
    /// `source` is read from the scan thread; `fov` is queried once per
    /// accepted frame.
    pub fn new(
        config: Config,
        source: Arc<dyn BlockSource>,
        fov: Arc<dyn FieldOfView>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;

        let registry = Arc::new(ConnectionRegistry::new(config.network.max_connections));
        let broadcast = BroadcastSettings {
            min_frame_interval: Duration::from_micros(config.broadcast.min_frame_interval_us),
            mob_cache_ttl: Duration::from_millis(config.broadcast.mob_cache_ttl_ms),
            cache_cleanup_interval: Duration::from_millis(
                config.broadcast.cache_cleanup_interval_ms,
            ),
        };
        let broadcaster = EntityBroadcaster::new(Arc::clone(&registry), fov, broadcast);
        let settings = Arc::new(SharedSettings::new(config.modules.unknown_module_default));

        Ok(Self {
            inner: Arc::new(BridgeInner {
                config,
                source,
                settings,
                registry,
                broadcaster,
                listeners: RwLock::new(Vec::new()),
                lifecycle: Mutex::new(Lifecycle::default()),
                ticks: AtomicU64::new(0),
            }),
        })
    }

    // -- lifecycle ----------------------------------------------------------

    /// Bind the listener and start the scan worker. A no-op returning the
    /// bound address when already running.
    ///
    /// Call from a host thread, not from inside an async runtime.
    pub fn start(&self) -> Result<SocketAddr, BridgeError> {
        self.inner.start()
    }

    /// Restart after a non-permanent disable.
    pub fn reactivate(&self) -> Result<SocketAddr, BridgeError> {
        if self.is_fully_disabled() {
            return Err(BridgeError::Disabled);
        }
        self.start()
    }

    /// Stop immediately: close every connection, abandon queued writes and
    /// scans, drop the tracking store and module flags. With `fully`, later
    /// starts fail until [`reset_disable`](Self::reset_disable).
    pub fn shutdown(&self, fully: bool) {
        self.inner.shutdown(fully);
    }

    /// Lift a permanent disable. Does not start the feed.
    pub fn reset_disable(&self) {
        self.inner.lifecycle.lock().fully_disabled = false;
    }

    /// Whether the feed is running.
    pub fn is_running(&self) -> bool {
        self.inner.lifecycle.lock().running.is_some()
    }

    /// Whether a permanent disable is in effect.
    pub fn is_fully_disabled(&self) -> bool {
        self.inner.lifecycle.lock().fully_disabled
    }

    /// Bound listener address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .lifecycle
            .lock()
            .running
            .as_ref()
            .map(|r| r.local_addr)
    }

    // -- outward queries ----------------------------------------------------

    /// Whether the overlay enabled module `name`.
    pub fn is_module_enabled(&self, name: &str) -> bool {
        self.inner.settings.modules.is_enabled(name)
    }

    /// Overlay-controlled settings.
    pub fn settings(&self) -> &Arc<SharedSettings> {
        &self.inner.settings
    }

    /// Active connections.
    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Register a callback fired on every accepted connection, once its
    /// snapshot is queued and broadcasts reach it. Runs on the scan thread.
    pub fn add_connection_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.inner.listeners.write().push(Arc::new(listener));
    }

    /// Run `f` against the tracking store once every earlier event has been
    /// applied. Blocks the caller until then.
    pub fn inspect_store<R, F>(&self, f: F) -> Result<R, BridgeError>
    where
        R: Send + 'static,
        F: FnOnce(&TrackingStore) -> R + Send + 'static,
    {
        let lifecycle = self.inner.lifecycle.lock();
        let running = lifecycle.running.as_ref().ok_or(BridgeError::NotRunning)?;
        Ok(running.worker.inspect(f)?)
    }

    // -- host events --------------------------------------------------------

    /// A chunk finished loading.
    pub fn on_chunk_loaded(&self, chunk: ChunkPos) {
        self.inner.with_worker(|w| w.chunk_loaded(chunk));
    }

    /// A chunk was unloaded.
    pub fn on_chunk_unloaded(&self, chunk: ChunkPos) {
        self.inner.with_worker(|w| w.chunk_unloaded(chunk));
    }

    /// The block at `pos` changed to `label` (`None` for air).
    pub fn on_block_changed(&self, pos: BlockPos, label: Option<String>) {
        self.inner.with_worker(|w| w.block_changed(pos, label));
    }

    /// Matches the host collected itself for a whole chunk.
    pub fn on_scan_results(&self, chunk: ChunkPos, observed: Vec<(BlockPos, String)>) {
        self.inner.with_worker(|w| w.scan_results(chunk, observed));
    }

    /// Login or respawn: start over from what is loaded now.
    pub fn on_world_reset(&self) {
        tracing::info!("World reset, rescanning loaded chunks");
        self.inner.with_worker(ScanWorker::reset_world);
    }

    /// Host tick. Every `reconcile_interval_ticks` ticks, loaded chunks that
    /// were never scanned get caught up.
    pub fn on_tick(&self) {
        let tick = self.inner.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let interval = self.inner.config.scan.reconcile_interval_ticks;
        if interval > 0 && tick % interval == 0 {
            self.inner.with_worker(ScanWorker::ensure_scanned);
        }
    }

    /// Sample watched hotkeys and broadcast a press event for each key that
    /// just went down. Returns the keys that fired.
    pub fn poll_hotkeys(&self, input_focused: bool, is_down: impl Fn(i32) -> bool) -> Vec<i32> {
        let fired = self.inner.settings.hotkeys.poll(input_focused, is_down);
        for &key in &fired {
            self.inner
                .registry
                .publish(ServerMessage::HotkeyPressed { key });
        }
        fired
    }

    /// Render-frame entry point for entity telemetry.
    pub fn on_frame(&self, snapshot: FrameSnapshot) -> FrameOutcome {
        let handle = {
            let lifecycle = self.inner.lifecycle.lock();
            match lifecycle.running.as_ref() {
                Some(running) => running.runtime.handle().clone(),
                None => return FrameOutcome::NoClients,
            }
        };
        let policy = self.inner.settings.inclusion_policy();
        self.inner.broadcaster.on_frame(&handle, snapshot, policy)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.inner.shutdown(false);
    }
}

impl BridgeInner {
    fn start(self: &Arc<Self>) -> Result<SocketAddr, BridgeError> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.fully_disabled {
            return Err(BridgeError::Disabled);
        }
        if let Some(running) = lifecycle.running.as_ref() {
            return Ok(running.local_addr);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("scry-net")
            .enable_all()
            .build()
            .map_err(BridgeError::Runtime)?;

        let network = &self.config.network;
        let server_config = ServerConfig {
            socket: SocketConfig {
                nodelay: network.nodelay,
                keepalive: (network.keepalive_secs > 0)
                    .then(|| Duration::from_secs(network.keepalive_secs)),
                ..SocketConfig::default()
            },
            ..ServerConfig::from_host_port(&network.bind_address, network.port)?
        };
        let bind_addr = server_config.bind_addr;
        let handler = Arc::new(SessionBridge {
            inner: Arc::downgrade(self),
        });
        let server = Arc::new(FeedServer::new(
            server_config,
            Arc::clone(&self.registry),
            handler,
        ));
        let listener = {
            let _guard = runtime.enter();
            server.bind()?
        };
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind {
                addr: bind_addr,
                source,
            })?;

        let sink: Arc<dyn MessageSink> = self.registry.clone();
        let worker = ScanWorker::spawn(Arc::clone(&self.source), sink, self.scan_settings())?;

        self.settings.modules.apply(self.config.modules.initial.clone());
        let watch_list = self.settings.watch_list.read().clone();
        if !watch_list.is_empty() {
            worker.update_watch_list(watch_list)?;
        }

        let accept = Arc::clone(&server);
        runtime.spawn(async move { accept.run_with_listener(listener).await });

        lifecycle.running = Some(Running {
            runtime,
            server,
            worker,
            local_addr,
        });
        tracing::info!("Feed started on {local_addr}");
        Ok(local_addr)
    }

    fn shutdown(&self, fully: bool) {
        let running = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.fully_disabled |= fully;
            self.settings.modules.clear();
            lifecycle.running.take()
        };

        // Stopped outside the lock: runtime tasks may be waiting on it.
        if let Some(running) = running {
            running.stop();
            tracing::info!("Feed stopped (fully: {fully})");
        }
    }

    fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            geometry: ScanGeometry {
                min_y: self.config.scan.min_y,
                max_y: self.config.scan.max_y,
            },
            rescan_margin: self.config.scan.rescan_margin,
        }
    }

    fn with_worker(&self, submit: impl FnOnce(&ScanWorker) -> Result<(), ScanError>) {
        let lifecycle = self.lifecycle.lock();
        let Some(running) = lifecycle.running.as_ref() else {
            return;
        };
        if let Err(e) = submit(&running.worker) {
            tracing::warn!("Scan worker rejected event: {e}");
        }
    }

    /// Remember `labels` for restarts and hand them to the worker. Both happen
    /// under the lifecycle lock, so the remembered list is always the last one
    /// the worker was given.
    fn update_watch_list(&self, labels: Vec<String>) {
        let lifecycle = self.lifecycle.lock();
        *self.settings.watch_list.write() = labels.clone();
        if let Some(running) = lifecycle.running.as_ref()
            && let Err(e) = running.worker.update_watch_list(labels)
        {
            tracing::warn!("Scan worker rejected watch list: {e}");
        }
    }

    fn notify_connection(&self) {
        self.broadcaster.on_connection();
        for listener in self.listeners.read().iter() {
            listener();
        }
    }
}

/// Connects server callbacks back to the bridge without keeping it alive.
struct SessionBridge {
    inner: Weak<BridgeInner>,
}

impl SessionHandler for SessionBridge {
    fn on_connect(&self, pending: PendingConnection) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        let id = pending.id();
        let bridge = Weak::clone(&self.inner);
        // The snapshot is taken on the scan thread, so every diff produced
        // after it is queued behind it on this connection. Listeners run only
        // once broadcasts reach the connection, so the cleared mob cache is
        // refilled by frames it also receives.
        inner.with_worker(move |worker| {
            worker.attach(move |snapshot| {
                if !pending.activate(Some(snapshot.encode())) {
                    tracing::debug!("Connection {id} closed before activation");
                    return;
                }
                if let Some(inner) = bridge.upgrade() {
                    inner.notify_connection();
                }
            })
        });
    }

    fn on_message(&self, id: ConnectionId, message: ClientMessage) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        tracing::trace!("Command {:#010x} from {id}", message.tag());

        match commands::apply(&inner.settings, message) {
            Followup::None => {}
            Followup::WatchList(labels) => inner.update_watch_list(labels),
            Followup::Disable { fully } => {
                tracing::info!("Disable requested by {id} (fully: {fully})");
                // Tearing down the runtime from one of its own tasks is not
                // allowed; hand it to a plain thread.
                let spawned = std::thread::Builder::new()
                    .name("scry-shutdown".into())
                    .spawn(move || inner.shutdown(fully));
                if let Err(e) = spawned {
                    tracing::error!("Could not spawn shutdown thread: {e}");
                }
            }
        }
    }

    fn on_disconnect(&self, id: ConnectionId) {
        tracing::info!("Connection {id} closed");
    }
}
