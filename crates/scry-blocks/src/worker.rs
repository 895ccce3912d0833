//! The scan worker: a single thread that owns the [`TrackingStore`] and
//! applies every mutation in submission order.
//!
//! Producers on any thread submit tasks through a crossbeam channel and never
//! wait for them. Each task runs behind `catch_unwind`, so a panicking scan is
//! logged and the worker moves on to the next task.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use scry_protocol::{MessageSink, ServerMessage};

use crate::coords::{BlockPos, ChunkPos, ScanGeometry};
use crate::scanner::{scan_chunk, scan_chunk_for};
use crate::source::BlockSource;
use crate::store::TrackingStore;

/// Errors returned when submitting to the worker.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The worker was shut down or its thread is gone.
    #[error("scan worker is not running")]
    Stopped,

    /// The worker thread could not be started.
    #[error("failed to spawn scan worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Scan tuning.
#[derive(Clone, Copy, Debug)]
pub struct ScanSettings {
    /// Vertical range of a scan.
    pub geometry: ScanGeometry,
    /// Chunks beyond the view radius covered by rescans after a watch-list
    /// change or world reset.
    pub rescan_margin: i32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            geometry: ScanGeometry::default(),
            rescan_margin: 2,
        }
    }
}

type AttachFn = Box<dyn FnOnce(ServerMessage) + Send>;
type InspectFn = Box<dyn FnOnce(&TrackingStore) + Send>;

enum ScanTask {
    ScanChunk(ChunkPos),
    ScanResults {
        chunk: ChunkPos,
        observed: Vec<(BlockPos, String)>,
    },
    BlockChanged {
        pos: BlockPos,
        label: Option<String>,
    },
    UnloadChunk(ChunkPos),
    UpdateWatchList(Vec<String>),
    EnsureScanned,
    ResetWorld,
    Attach(AttachFn),
    Inspect(InspectFn),
}

impl ScanTask {
    fn name(&self) -> &'static str {
        match self {
            ScanTask::ScanChunk(_) => "scan-chunk",
            ScanTask::ScanResults { .. } => "scan-results",
            ScanTask::BlockChanged { .. } => "block-changed",
            ScanTask::UnloadChunk(_) => "unload-chunk",
            ScanTask::UpdateWatchList(_) => "update-watch-list",
            ScanTask::EnsureScanned => "ensure-scanned",
            ScanTask::ResetWorld => "reset-world",
            ScanTask::Attach(_) => "attach",
            ScanTask::Inspect(_) => "inspect",
        }
    }
}

/// Handle to the scan thread. Dropping it shuts the thread down.
pub struct ScanWorker {
    tx: Option<Sender<ScanTask>>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ScanWorker {
    /// Start the worker thread.
    pub fn spawn(
        source: Arc<dyn BlockSource>,
        sink: Arc<dyn MessageSink>,
        settings: ScanSettings,
    ) -> Result<Self, ScanError> {
        let (tx, rx) = unbounded::<ScanTask>();
        let cancel = Arc::new(AtomicBool::new(false));
        let context = WorkerContext {
            source,
            sink,
            settings,
            cancel: Arc::clone(&cancel),
        };

        let thread = std::thread::Builder::new()
            .name("scry-scan".into())
            .spawn(move || context.run(rx))
            .map_err(ScanError::Spawn)?;

        Ok(Self {
            tx: Some(tx),
            cancel,
            thread: Some(thread),
        })
    }

    /// A chunk finished loading; scan it with the current watch list.
    pub fn chunk_loaded(&self, chunk: ChunkPos) -> Result<(), ScanError> {
        self.submit(ScanTask::ScanChunk(chunk))
    }

    /// Apply scan results the host already collected for `chunk`.
    pub fn scan_results(
        &self,
        chunk: ChunkPos,
        observed: Vec<(BlockPos, String)>,
    ) -> Result<(), ScanError> {
        self.submit(ScanTask::ScanResults { chunk, observed })
    }

    /// The block at `pos` is now `label` (`None` for air).
    pub fn block_changed(&self, pos: BlockPos, label: Option<String>) -> Result<(), ScanError> {
        self.submit(ScanTask::BlockChanged { pos, label })
    }

    /// A chunk was unloaded.
    pub fn chunk_unloaded(&self, chunk: ChunkPos) -> Result<(), ScanError> {
        self.submit(ScanTask::UnloadChunk(chunk))
    }

    /// Replace the watch list, then rescan loaded chunks for added labels.
    pub fn update_watch_list(&self, labels: Vec<String>) -> Result<(), ScanError> {
        self.submit(ScanTask::UpdateWatchList(labels))
    }

    /// Scan every loaded chunk within the view radius that has not been
    /// scanned yet, nearest first.
    pub fn ensure_scanned(&self) -> Result<(), ScanError> {
        self.submit(ScanTask::EnsureScanned)
    }

    /// The player changed worlds or respawned: drop everything, tell
    /// consumers to clear, and rescan what is loaded.
    pub fn reset_world(&self) -> Result<(), ScanError> {
        self.submit(ScanTask::ResetWorld)
    }

    /// Run `f` on the worker with the current full-state snapshot.
    ///
    /// Anything `f` queues on a connection lands ahead of every diff
    /// produced by later tasks.
    pub fn attach<F>(&self, f: F) -> Result<(), ScanError>
    where
        F: FnOnce(ServerMessage) + Send + 'static,
    {
        self.submit(ScanTask::Attach(Box::new(f)))
    }

    /// Run `f` against the store after all previously submitted tasks and
    /// wait for its result. Must not be called from the worker thread.
    pub fn inspect<R, F>(&self, f: F) -> Result<R, ScanError>
    where
        R: Send + 'static,
        F: FnOnce(&TrackingStore) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = bounded(1);
        self.submit(ScanTask::Inspect(Box::new(move |store| {
            let _ = reply_tx.send(f(store));
        })))?;
        reply_rx.recv().map_err(|_| ScanError::Stopped)
    }

    /// Wait until every previously submitted task has run.
    pub fn flush(&self) -> Result<(), ScanError> {
        self.inspect(|_| ())
    }

    /// Tasks waiting to run.
    pub fn queued(&self) -> usize {
        self.tx.as_ref().map_or(0, Sender::len)
    }

    /// Whether the worker still accepts tasks.
    pub fn is_running(&self) -> bool {
        self.tx.is_some() && !self.cancel.load(Ordering::Acquire)
    }

    /// Abandon queued tasks and stop the thread. The store is dropped with it.
    pub fn shutdown(&mut self) {
        self.cancel.store(true, Ordering::Release);
        self.tx = None;
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == std::thread::current().id() {
                // Called from a task on the worker itself; it exits after
                // this task returns.
                return;
            }
            if thread.join().is_err() {
                tracing::error!("Scan worker thread panicked during shutdown");
            }
        }
    }

    fn submit(&self, task: ScanTask) -> Result<(), ScanError> {
        if self.cancel.load(Ordering::Acquire) {
            return Err(ScanError::Stopped);
        }
        let tx = self.tx.as_ref().ok_or(ScanError::Stopped)?;
        tx.send(task).map_err(|_| ScanError::Stopped)
    }
}

impl Drop for ScanWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct WorkerContext {
    source: Arc<dyn BlockSource>,
    sink: Arc<dyn MessageSink>,
    settings: ScanSettings,
    cancel: Arc<AtomicBool>,
}

impl WorkerContext {
    fn run(self, rx: Receiver<ScanTask>) {
        tracing::debug!("Scan worker started");
        let mut store = TrackingStore::new();

        while let Ok(task) = rx.recv() {
            if self.cancelled() {
                break;
            }
            let name = task.name();
            let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&mut store, task)));
            if let Err(payload) = result {
                tracing::error!("Scan task {name} panicked: {}", panic_message(&*payload));
            }
        }

        tracing::debug!(
            "Scan worker stopped with {} tracked position(s)",
            store.len()
        );
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn publish(&self, message: Option<ServerMessage>) {
        if let Some(message) = message {
            self.sink.publish(message);
        }
    }

    fn execute(&self, store: &mut TrackingStore, task: ScanTask) {
        match task {
            ScanTask::ScanChunk(chunk) => self.scan(store, chunk),
            ScanTask::ScanResults { chunk, observed } => {
                self.publish(store.apply_scan(chunk, observed));
            }
            ScanTask::BlockChanged { pos, label } => {
                self.publish(store.apply_block_change(pos, label.as_deref()));
            }
            ScanTask::UnloadChunk(chunk) => {
                self.sink.publish(store.unload_chunk(chunk));
            }
            ScanTask::UpdateWatchList(labels) => {
                let update = store.update_watch_list(labels);
                if update.removed.is_empty() && update.added.is_empty() {
                    return;
                }
                tracing::info!(
                    "Watch list updated: added {:?}, removed {:?}",
                    update.added,
                    update.removed
                );
                for message in update.messages {
                    self.sink.publish(message);
                }
                if !update.added.is_empty() {
                    self.rescan_for_labels(store, &update.added);
                }
            }
            ScanTask::EnsureScanned => self.ensure_scanned(store),
            ScanTask::ResetWorld => {
                store.clear();
                self.sink.publish(ServerMessage::ClearAll);
                self.rescan_loaded(store);
            }
            ScanTask::Attach(f) => f(store.full_state_snapshot()),
            ScanTask::Inspect(f) => f(store),
        }
    }

    fn scan(&self, store: &mut TrackingStore, chunk: ChunkPos) {
        if !self.source.is_chunk_loaded(chunk) {
            tracing::debug!("Skipping scan of {chunk:?}: no longer loaded");
            return;
        }
        let found = scan_chunk(
            &*self.source,
            chunk,
            &self.settings.geometry,
            store.watch_list(),
        );
        self.publish(store.apply_scan(chunk, found));
    }

    /// Chunks around the player that the source has loaded, nearest first.
    fn loaded_around(&self, extra: i32) -> Vec<ChunkPos> {
        let Some(focus) = self.source.scan_focus() else {
            return Vec::new();
        };
        focus
            .center
            .square_nearest_first(focus.radius + extra)
            .into_iter()
            .filter(|chunk| self.source.is_chunk_loaded(*chunk))
            .collect()
    }

    fn rescan_for_labels(&self, store: &mut TrackingStore, labels: &[Arc<str>]) {
        let chunks = self.loaded_around(self.settings.rescan_margin);
        tracing::debug!("Rescanning {} chunk(s) for {labels:?}", chunks.len());
        for chunk in chunks {
            if self.cancelled() {
                return;
            }
            let found = scan_chunk_for(&*self.source, chunk, &self.settings.geometry, labels);
            self.publish(store.apply_partial_scan(found));
        }
    }

    fn ensure_scanned(&self, store: &mut TrackingStore) {
        let missing: Vec<ChunkPos> = self
            .loaded_around(0)
            .into_iter()
            .filter(|chunk| !store.is_scanned(*chunk))
            .collect();
        if missing.is_empty() {
            return;
        }
        tracing::debug!("Catching up {} unscanned chunk(s)", missing.len());
        for chunk in missing {
            if self.cancelled() {
                return;
            }
            self.scan(store, chunk);
        }
    }

    fn rescan_loaded(&self, store: &mut TrackingStore) {
        for chunk in self.loaded_around(self.settings.rescan_margin) {
            if self.cancelled() {
                return;
            }
            self.scan(store, chunk);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ScanFocus;
    use parking_lot::{Mutex, RwLock};
    use rustc_hash::{FxHashMap, FxHashSet};
    use scry_protocol::{BlockRecord, RecordingSink};

    #[derive(Default)]
    struct TestWorld {
        blocks: RwLock<FxHashMap<BlockPos, Arc<str>>>,
        loaded: RwLock<FxHashSet<ChunkPos>>,
        focus: RwLock<Option<ScanFocus>>,
        explode_on: Option<ChunkPos>,
    }

    impl TestWorld {
        fn put(&self, pos: BlockPos, label: &str) {
            self.blocks.write().insert(pos, Arc::from(label));
        }
        fn load(&self, chunk: ChunkPos) {
            self.loaded.write().insert(chunk);
        }
        fn focus_on(&self, center: ChunkPos, radius: i32) {
            *self.focus.write() = Some(ScanFocus { center, radius });
        }
    }

    impl BlockSource for TestWorld {
        fn block_at(&self, pos: BlockPos) -> Option<Arc<str>> {
            if self.explode_on == Some(pos.chunk()) {
                panic!("corrupt chunk data");
            }
            self.blocks.read().get(&pos).cloned()
        }
        fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool {
            self.loaded.read().contains(&chunk)
        }
        fn scan_focus(&self) -> Option<ScanFocus> {
            *self.focus.read()
        }
    }

    fn settings() -> ScanSettings {
        ScanSettings {
            geometry: ScanGeometry { min_y: 0, max_y: 16 },
            rescan_margin: 2,
        }
    }

    fn start(world: TestWorld) -> (Arc<TestWorld>, RecordingSink, ScanWorker) {
        let world = Arc::new(world);
        let sink = RecordingSink::new();
        let worker =
            ScanWorker::spawn(world.clone(), Arc::new(sink.clone()), settings()).unwrap();
        (world, sink, worker)
    }

    fn adds(msg: &ServerMessage) -> Vec<(i32, i32, i32)> {
        match msg {
            ServerMessage::BlockDiff(diff) => diff
                .records
                .iter()
                .filter(|r| r.is_add())
                .map(BlockRecord::position)
                .collect(),
            other => panic!("expected a block diff, got {other:?}"),
        }
    }

    #[test]
    fn test_chunk_load_reports_match() {
        let (world, sink, worker) = start(TestWorld::default());
        world.put(BlockPos::new(5, 10, 5), "diamond_ore");
        world.load(ChunkPos::new(0, 0));

        worker.update_watch_list(vec!["diamond_ore".into()]).unwrap();
        worker.flush().unwrap();
        sink.drain();

        worker.chunk_loaded(ChunkPos::new(0, 0)).unwrap();
        worker.flush().unwrap();

        let messages = sink.drain();
        assert_eq!(messages.len(), 1);
        assert_eq!(adds(&messages[0]), vec![(5, 10, 5)]);
        assert_eq!(worker.inspect(|s| s.len()).unwrap(), 1);
    }

    #[test]
    fn test_watch_list_swap_deletes_then_rescans() {
        let world = TestWorld::default();
        world.put(BlockPos::new(5, 10, 5), "diamond_ore");
        world.put(BlockPos::new(20, 3, 4), "iron_ore");
        world.load(ChunkPos::new(0, 0));
        world.load(ChunkPos::new(1, 0));
        world.focus_on(ChunkPos::new(0, 0), 1);
        let (_world, sink, worker) = start(world);

        worker.update_watch_list(vec!["diamond_ore".into()]).unwrap();
        worker.chunk_loaded(ChunkPos::new(0, 0)).unwrap();
        worker.flush().unwrap();
        sink.drain();

        worker.update_watch_list(vec!["iron_ore".into()]).unwrap();
        worker.flush().unwrap();

        let messages = sink.drain();
        assert_eq!(
            messages[0],
            ServerMessage::DeleteType {
                label: Arc::from("diamond_ore"),
            }
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(adds(&messages[1]), vec![(20, 3, 4)]);

        let (len, diamond, scanned) = worker
            .inspect(|s| {
                (
                    s.len(),
                    s.contains(BlockPos::new(5, 10, 5)),
                    s.is_scanned(ChunkPos::new(1, 0)),
                )
            })
            .unwrap();
        assert_eq!(len, 1);
        assert!(!diamond);
        assert!(!scanned, "targeted rescans do not mark chunks scanned");
    }

    #[test]
    fn test_unload_sends_single_chunk_message() {
        let world = TestWorld::default();
        for (x, z) in [(1, 1), (2, 2), (3, 3)] {
            world.put(BlockPos::new(x, 0, z), "ore");
        }
        world.load(ChunkPos::new(0, 0));
        let (_world, sink, worker) = start(world);
        worker.update_watch_list(vec!["ore".into()]).unwrap();
        worker.chunk_loaded(ChunkPos::new(0, 0)).unwrap();
        worker.flush().unwrap();
        assert_eq!(worker.inspect(|s| s.len()).unwrap(), 3);
        sink.drain();

        worker.chunk_unloaded(ChunkPos::new(0, 0)).unwrap();
        worker.flush().unwrap();

        assert_eq!(sink.drain(), vec![ServerMessage::ChunkUnload { x: 0, z: 0 }]);
        assert_eq!(worker.inspect(|s| s.len()).unwrap(), 0);
    }

    #[test]
    fn test_panicking_task_does_not_stop_worker() {
        let world = TestWorld {
            explode_on: Some(ChunkPos::new(9, 9)),
            ..Default::default()
        };
        world.load(ChunkPos::new(9, 9));
        world.load(ChunkPos::new(0, 0));
        world.put(BlockPos::new(0, 0, 0), "ore");
        let (_world, sink, worker) = start(world);

        worker.update_watch_list(vec!["ore".into()]).unwrap();
        worker.chunk_loaded(ChunkPos::new(9, 9)).unwrap();
        worker.chunk_loaded(ChunkPos::new(0, 0)).unwrap();
        worker.flush().unwrap();

        assert_eq!(sink.drain().len(), 1);
        assert!(worker.is_running());
    }

    #[test]
    fn test_attach_snapshot_precedes_later_diffs() {
        let world = TestWorld::default();
        world.put(BlockPos::new(1, 1, 1), "ore");
        world.load(ChunkPos::new(0, 0));
        let (_world, sink, worker) = start(world);
        worker.update_watch_list(vec!["ore".into()]).unwrap();
        worker.chunk_loaded(ChunkPos::new(0, 0)).unwrap();
        worker.flush().unwrap();
        sink.drain();

        let connection: Arc<Mutex<Vec<ServerMessage>>> = Arc::default();
        let conn = Arc::clone(&connection);
        worker
            .attach(move |snapshot| conn.lock().push(snapshot))
            .unwrap();
        worker
            .block_changed(BlockPos::new(2, 2, 2), Some("ore".into()))
            .unwrap();
        worker.flush().unwrap();

        let seen = connection.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(adds(&seen[0]), vec![(1, 1, 1)]);
        let later = sink.drain();
        assert_eq!(adds(&later[0]), vec![(2, 2, 2)]);
    }

    #[test]
    fn test_ensure_scanned_catches_up_nearest_first() {
        let world = TestWorld::default();
        for x in -1..=1 {
            for z in -1..=1 {
                let chunk = ChunkPos::new(x, z);
                world.load(chunk);
                world.put(BlockPos::new(chunk.min_block_x(), 0, chunk.min_block_z()), "ore");
            }
        }
        world.focus_on(ChunkPos::new(0, 0), 1);
        let (_world, sink, worker) = start(world);
        worker.update_watch_list(vec!["ore".into()]).unwrap();
        worker.chunk_loaded(ChunkPos::new(1, 1)).unwrap();
        worker.flush().unwrap();
        sink.drain();

        worker.ensure_scanned().unwrap();
        worker.flush().unwrap();

        let messages = sink.drain();
        assert_eq!(messages.len(), 8);
        let distances: Vec<i64> = messages
            .iter()
            .map(|m| {
                let (x, _, z) = adds(m)[0];
                ChunkPos::containing(BlockPos::new(x, 0, z)).distance_sq(ChunkPos::new(0, 0))
            })
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(distances[0], 0);
        assert_eq!(worker.inspect(|s| s.scanned_count()).unwrap(), 9);
    }

    #[test]
    fn test_reset_world_clears_and_rescans() {
        let world = TestWorld::default();
        world.put(BlockPos::new(4, 4, 4), "ore");
        world.load(ChunkPos::new(0, 0));
        world.focus_on(ChunkPos::new(0, 0), 0);
        let (_world, sink, worker) = start(world);
        worker.update_watch_list(vec!["ore".into()]).unwrap();
        worker.scan_results(ChunkPos::new(5, 5), vec![(BlockPos::new(80, 0, 80), "ore".into())])
            .unwrap();
        worker.flush().unwrap();
        sink.drain();

        worker.reset_world().unwrap();
        worker.flush().unwrap();

        let messages = sink.drain();
        assert_eq!(messages[0], ServerMessage::ClearAll);
        assert_eq!(adds(&messages[1]), vec![(4, 4, 4)]);
        let (len, stale) = worker
            .inspect(|s| (s.len(), s.contains(BlockPos::new(80, 0, 80))))
            .unwrap();
        assert_eq!(len, 1);
        assert!(!stale);
    }

    #[test]
    fn test_unloaded_chunk_not_scanned() {
        let world = TestWorld::default();
        world.put(BlockPos::new(0, 0, 0), "ore");
        let (_world, sink, worker) = start(world);
        worker.update_watch_list(vec!["ore".into()]).unwrap();
        worker.chunk_loaded(ChunkPos::new(0, 0)).unwrap();
        worker.flush().unwrap();
        assert!(sink.is_empty());
        assert!(!worker.inspect(|s| s.is_scanned(ChunkPos::new(0, 0))).unwrap());
    }

    #[test]
    fn test_concurrent_producers_keep_index_consistent() {
        let (_world, _sink, worker) = start(TestWorld::default());
        worker.update_watch_list(vec!["ore".into()]).unwrap();
        let worker = Arc::new(worker);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let worker = Arc::clone(&worker);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let pos = BlockPos::new(t * 1000 + i, i % 7, -i);
                        worker.block_changed(pos, Some("ore".into())).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let (len, consistent) = worker
            .inspect(|s| (s.len(), s.check_consistency()))
            .unwrap();
        assert_eq!(len, 800);
        assert_eq!(consistent, Ok(()));
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let (_world, _sink, mut worker) = start(TestWorld::default());
        worker.shutdown();
        assert!(!worker.is_running());
        assert!(matches!(
            worker.chunk_loaded(ChunkPos::new(0, 0)),
            Err(ScanError::Stopped)
        ));
        assert!(matches!(worker.flush(), Err(ScanError::Stopped)));
    }
}
