//! The tracking store: watched positions, their chunk index, and the set of
//! chunks already scanned.
//!
//! Every mutating method returns the message(s) that describe its effect, so
//! the owner can publish them in the same order the mutations happened. The
//! store is single-threaded by construction; the [`ScanWorker`] owns it.
//!
//! [`ScanWorker`]: crate::ScanWorker

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use scry_protocol::{BlockDiff, BlockRecord, ServerMessage};

use crate::coords::{BlockPos, ChunkPos};
use crate::watch::WatchList;

/// Outcome of a watch-list replacement.
#[derive(Debug, Default)]
pub struct WatchListUpdate {
    /// Labels no longer watched; their positions were purged.
    pub removed: Vec<Arc<str>>,
    /// Labels newly watched; loaded chunks need a targeted rescan for these.
    pub added: Vec<Arc<str>>,
    /// One `DeleteType` per removed label.
    pub messages: Vec<ServerMessage>,
}

/// Watched positions indexed by chunk.
#[derive(Debug, Default)]
pub struct TrackingStore {
    positions: FxHashMap<BlockPos, Arc<str>>,
    chunks: FxHashMap<ChunkPos, FxHashSet<BlockPos>>,
    scanned: FxHashSet<ChunkPos>,
    watch: WatchList,
}

impl TrackingStore {
    /// Creates an empty store with an empty watch list.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current watch list.
    pub fn watch_list(&self) -> &WatchList {
        &self.watch
    }

    /// Number of tracked positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Whether `pos` is tracked.
    pub fn contains(&self, pos: BlockPos) -> bool {
        self.positions.contains_key(&pos)
    }

    /// Label recorded for `pos`.
    pub fn label_at(&self, pos: BlockPos) -> Option<&str> {
        self.positions.get(&pos).map(|l| &**l)
    }

    /// Number of tracked positions in `chunk`.
    pub fn tracked_in_chunk(&self, chunk: ChunkPos) -> usize {
        self.chunks.get(&chunk).map_or(0, FxHashSet::len)
    }

    /// Whether `chunk` has had a full scan since it was last unloaded.
    pub fn is_scanned(&self, chunk: ChunkPos) -> bool {
        self.scanned.contains(&chunk)
    }

    /// Number of chunks marked scanned.
    pub fn scanned_count(&self) -> usize {
        self.scanned.len()
    }

    /// Record a full scan of `chunk`.
    ///
    /// Observed positions whose label is watched and that are not tracked yet
    /// are added. Positions already tracked are left alone, including ones
    /// the scan no longer observed: removal only happens through
    /// [`apply_block_change`](Self::apply_block_change),
    /// [`unload_chunk`](Self::unload_chunk) and watch-list changes.
    ///
    /// Returns a diff of the additions, or `None` when there were none.
    pub fn apply_scan<I, S>(&mut self, chunk: ChunkPos, observed: I) -> Option<ServerMessage>
    where
        I: IntoIterator<Item = (BlockPos, S)>,
        S: AsRef<str>,
    {
        self.scanned.insert(chunk);
        self.merge_observed(observed)
    }

    /// Like [`apply_scan`](Self::apply_scan), but does not mark any chunk
    /// scanned. Used for label-restricted rescans after a watch-list change.
    pub fn apply_partial_scan<I, S>(&mut self, observed: I) -> Option<ServerMessage>
    where
        I: IntoIterator<Item = (BlockPos, S)>,
        S: AsRef<str>,
    {
        self.merge_observed(observed)
    }

    fn merge_observed<I, S>(&mut self, observed: I) -> Option<ServerMessage>
    where
        I: IntoIterator<Item = (BlockPos, S)>,
        S: AsRef<str>,
    {
        let mut added = Vec::new();
        for (pos, label) in observed {
            if self.positions.contains_key(&pos) {
                continue;
            }
            let Some(label) = self.watch.get(label.as_ref()) else {
                continue;
            };
            self.insert(pos, Arc::clone(&label));
            added.push(add_record(pos, label));
        }

        if added.is_empty() {
            None
        } else {
            Some(ServerMessage::BlockDiff(BlockDiff::new(added, Vec::new())))
        }
    }

    /// Reconcile one position after its block changed to `new_label`
    /// (`None` for air).
    ///
    /// A position that keeps matching keeps its original label even if it
    /// changed between two watched labels.
    pub fn apply_block_change(
        &mut self,
        pos: BlockPos,
        new_label: Option<&str>,
    ) -> Option<ServerMessage> {
        let watched = new_label.and_then(|l| self.watch.get(l));
        let tracked = self.positions.contains_key(&pos);

        match (watched, tracked) {
            (Some(label), false) => {
                self.insert(pos, Arc::clone(&label));
                Some(ServerMessage::BlockDiff(BlockDiff::new(
                    vec![add_record(pos, label)],
                    Vec::new(),
                )))
            }
            (None, true) => {
                self.remove(pos);
                Some(ServerMessage::BlockDiff(BlockDiff::new(
                    Vec::new(),
                    vec![remove_record(pos)],
                )))
            }
            _ => None,
        }
    }

    /// Replace the watch list in one step.
    ///
    /// Positions carrying a removed label are purged and a single
    /// `DeleteType` is produced per removed label. Added labels are returned
    /// so the caller can schedule a rescan.
    pub fn update_watch_list<I, S>(&mut self, labels: I) -> WatchListUpdate
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (removed, added) = self.watch.replace(labels);
        if !removed.is_empty() {
            let gone: FxHashSet<&str> = removed.iter().map(|l| &**l).collect();
            let purge: Vec<BlockPos> = self
                .positions
                .iter()
                .filter(|(_, label)| gone.contains(&***label))
                .map(|(pos, _)| *pos)
                .collect();
            for pos in purge {
                self.remove(pos);
            }
        }

        let messages = removed
            .iter()
            .map(|label| ServerMessage::DeleteType {
                label: Arc::clone(label),
            })
            .collect();
        WatchListUpdate {
            removed,
            added,
            messages,
        }
    }

    /// Forget everything about `chunk`. Always produces a `ChunkUnload`, even
    /// if nothing was tracked there, so the consumer can drop its own cache.
    pub fn unload_chunk(&mut self, chunk: ChunkPos) -> ServerMessage {
        self.scanned.remove(&chunk);
        if let Some(members) = self.chunks.remove(&chunk) {
            for pos in members {
                self.positions.remove(&pos);
            }
        }
        ServerMessage::ChunkUnload {
            x: chunk.x,
            z: chunk.z,
        }
    }

    /// Every tracked position as an addition. Sent to each new connection,
    /// even when empty.
    pub fn full_state_snapshot(&self) -> ServerMessage {
        let mut added: Vec<BlockRecord> = self
            .positions
            .iter()
            .map(|(pos, label)| add_record(*pos, Arc::clone(label)))
            .collect();
        added.sort_by_key(BlockRecord::position);
        ServerMessage::BlockDiff(BlockDiff::new(added, Vec::new()))
    }

    /// Drop all positions and scanned marks. The watch list survives.
    pub fn clear(&mut self) {
        self.positions.clear();
        self.chunks.clear();
        self.scanned.clear();
    }

    /// Verify that the chunk index and the position map describe the same
    /// set. Returns a description of the first mismatch.
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut indexed = 0usize;
        for (chunk, members) in &self.chunks {
            if members.is_empty() {
                return Err(format!("empty index entry for {chunk:?}"));
            }
            for pos in members {
                if ChunkPos::containing(*pos) != *chunk {
                    return Err(format!("{pos:?} indexed under {chunk:?}"));
                }
                if !self.positions.contains_key(pos) {
                    return Err(format!("{pos:?} indexed but not tracked"));
                }
            }
            indexed += members.len();
        }
        if indexed != self.positions.len() {
            return Err(format!(
                "{} tracked positions but {indexed} indexed",
                self.positions.len()
            ));
        }
        Ok(())
    }

    fn insert(&mut self, pos: BlockPos, label: Arc<str>) {
        self.positions.insert(pos, label);
        self.chunks.entry(pos.chunk()).or_default().insert(pos);
    }

    fn remove(&mut self, pos: BlockPos) {
        if self.positions.remove(&pos).is_none() {
            return;
        }
        let chunk = pos.chunk();
        if let Some(members) = self.chunks.get_mut(&chunk) {
            members.remove(&pos);
            if members.is_empty() {
                self.chunks.remove(&chunk);
            }
        }
    }
}

fn add_record(pos: BlockPos, label: Arc<str>) -> BlockRecord {
    BlockRecord::Add {
        x: pos.x,
        y: pos.y,
        z: pos.z,
        label,
    }
}

fn remove_record(pos: BlockPos) -> BlockRecord {
    BlockRecord::Remove {
        x: pos.x,
        y: pos.y,
        z: pos.z,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_watching(labels: &[&str]) -> TrackingStore {
        let mut store = TrackingStore::new();
        store.update_watch_list(labels.iter().copied());
        store
    }

    fn records(msg: &ServerMessage) -> &[BlockRecord] {
        match msg {
            ServerMessage::BlockDiff(diff) => &diff.records,
            other => panic!("expected a block diff, got {other:?}"),
        }
    }

    #[test]
    fn test_scan_adds_single_match() {
        let mut store = store_watching(&["diamond_ore"]);
        let msg = store
            .apply_scan(
                ChunkPos::new(0, 0),
                [
                    (BlockPos::new(5, 10, 5), "diamond_ore"),
                    (BlockPos::new(6, 10, 5), "stone"),
                ],
            )
            .unwrap();

        assert_eq!(
            records(&msg),
            &[BlockRecord::Add {
                x: 5,
                y: 10,
                z: 5,
                label: Arc::from("diamond_ore"),
            }]
        );
        assert_eq!(store.len(), 1);
        assert!(store.is_scanned(ChunkPos::new(0, 0)));
        store.check_consistency().unwrap();
    }

    #[test]
    fn test_rescan_reports_nothing_new() {
        let mut store = store_watching(&["diamond_ore"]);
        let chunk = ChunkPos::new(0, 0);
        let observed = [(BlockPos::new(1, 1, 1), "diamond_ore")];
        assert!(store.apply_scan(chunk, observed).is_some());
        assert!(store.apply_scan(chunk, observed).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_rescan_keeps_stale_positions() {
        let mut store = store_watching(&["diamond_ore"]);
        let chunk = ChunkPos::new(0, 0);
        store.apply_scan(chunk, [(BlockPos::new(1, 1, 1), "diamond_ore")]);
        store.apply_scan(chunk, std::iter::empty::<(BlockPos, &str)>());
        assert!(store.contains(BlockPos::new(1, 1, 1)));
    }

    #[test]
    fn test_scan_with_empty_watch_list_marks_scanned() {
        let mut store = TrackingStore::new();
        let chunk = ChunkPos::new(3, 3);
        assert!(store
            .apply_scan(chunk, [(BlockPos::new(48, 0, 48), "diamond_ore")])
            .is_none());
        assert!(store.is_scanned(chunk));
        assert!(store.is_empty());
    }

    #[test]
    fn test_partial_scan_does_not_mark_scanned() {
        let mut store = store_watching(&["iron_ore"]);
        let msg = store.apply_partial_scan([(BlockPos::new(0, 0, 0), "iron_ore")]);
        assert!(msg.is_some());
        assert!(!store.is_scanned(ChunkPos::new(0, 0)));
    }

    #[test]
    fn test_positions_indexed_by_their_own_chunk() {
        let mut store = store_watching(&["spawner"]);
        // A scan reporting a position outside the scanned chunk still keeps
        // the index exact.
        store.apply_scan(ChunkPos::new(0, 0), [(BlockPos::new(20, 0, 0), "spawner")]);
        assert_eq!(store.tracked_in_chunk(ChunkPos::new(1, 0)), 1);
        assert_eq!(store.tracked_in_chunk(ChunkPos::new(0, 0)), 0);
        store.check_consistency().unwrap();
    }

    #[test]
    fn test_block_change_add_remove_noop() {
        let mut store = store_watching(&["diamond_ore", "emerald_ore"]);
        let pos = BlockPos::new(-3, 12, 40);

        let added = store.apply_block_change(pos, Some("diamond_ore")).unwrap();
        assert!(records(&added)[0].is_add());
        assert_eq!(store.tracked_in_chunk(pos.chunk()), 1);

        // Watched to watched: no-op, original label kept.
        assert!(store.apply_block_change(pos, Some("emerald_ore")).is_none());
        assert_eq!(store.label_at(pos), Some("diamond_ore"));

        let removed = store.apply_block_change(pos, None).unwrap();
        assert_eq!(records(&removed), &[BlockRecord::Remove { x: -3, y: 12, z: 40 }]);
        assert!(store.is_empty());
        assert_eq!(store.tracked_in_chunk(pos.chunk()), 0);

        // Unwatched and untracked: no-op.
        assert!(store.apply_block_change(pos, Some("stone")).is_none());
        store.check_consistency().unwrap();
    }

    #[test]
    fn test_watch_list_change_purges_and_deletes_by_type() {
        let mut store = store_watching(&["diamond_ore"]);
        store.apply_scan(
            ChunkPos::new(0, 0),
            [
                (BlockPos::new(1, 1, 1), "diamond_ore"),
                (BlockPos::new(2, 2, 2), "diamond_ore"),
            ],
        );

        let update = store.update_watch_list(["iron_ore"]);
        assert_eq!(update.removed, vec![Arc::<str>::from("diamond_ore")]);
        assert_eq!(update.added, vec![Arc::<str>::from("iron_ore")]);
        assert_eq!(
            update.messages,
            vec![ServerMessage::DeleteType {
                label: Arc::from("diamond_ore"),
            }]
        );
        assert!(store.is_empty());
        assert_eq!(store.tracked_in_chunk(ChunkPos::new(0, 0)), 0);
        store.check_consistency().unwrap();
    }

    #[test]
    fn test_watch_list_update_is_idempotent() {
        let mut store = store_watching(&["a", "b"]);
        let update = store.update_watch_list(["a", "b"]);
        assert!(update.removed.is_empty());
        assert!(update.added.is_empty());
        assert!(update.messages.is_empty());
    }

    #[test]
    fn test_watch_list_change_keeps_other_labels() {
        let mut store = store_watching(&["a", "b"]);
        store.apply_scan(
            ChunkPos::new(0, 0),
            [(BlockPos::new(0, 0, 0), "a"), (BlockPos::new(1, 0, 0), "b")],
        );
        store.update_watch_list(["b"]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.label_at(BlockPos::new(1, 0, 0)), Some("b"));
    }

    #[test]
    fn test_unload_drops_whole_chunk() {
        let mut store = store_watching(&["ore"]);
        let chunk = ChunkPos::new(0, 0);
        store.apply_scan(
            chunk,
            [
                (BlockPos::new(0, 0, 0), "ore"),
                (BlockPos::new(1, 5, 1), "ore"),
                (BlockPos::new(15, -60, 15), "ore"),
            ],
        );
        store.apply_scan(ChunkPos::new(1, 0), [(BlockPos::new(16, 0, 0), "ore")]);

        let msg = store.unload_chunk(chunk);
        assert_eq!(msg, ServerMessage::ChunkUnload { x: 0, z: 0 });
        assert_eq!(store.len(), 1);
        assert!(!store.is_scanned(chunk));
        assert!(store.is_scanned(ChunkPos::new(1, 0)));
        store.check_consistency().unwrap();
    }

    #[test]
    fn test_unload_of_untracked_chunk_still_reports() {
        let mut store = TrackingStore::new();
        assert_eq!(
            store.unload_chunk(ChunkPos::new(-7, 2)),
            ServerMessage::ChunkUnload { x: -7, z: 2 }
        );
    }

    #[test]
    fn test_snapshot_lists_every_position() {
        let mut store = store_watching(&["a", "b"]);
        store.apply_scan(
            ChunkPos::new(0, 0),
            [(BlockPos::new(3, 0, 0), "a"), (BlockPos::new(1, 0, 0), "b")],
        );
        let snapshot = store.full_state_snapshot();
        let recs = records(&snapshot);
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(BlockRecord::is_add));
        assert_eq!(recs[0].position(), (1, 0, 0));
    }

    #[test]
    fn test_snapshot_of_empty_store_is_empty_diff() {
        let store = TrackingStore::new();
        assert_eq!(
            store.full_state_snapshot(),
            ServerMessage::BlockDiff(BlockDiff::default())
        );
    }

    #[test]
    fn test_clear_keeps_watch_list() {
        let mut store = store_watching(&["a"]);
        store.apply_scan(ChunkPos::new(0, 0), [(BlockPos::new(0, 0, 0), "a")]);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.scanned_count(), 0);
        assert!(store.watch_list().contains("a"));
    }

    #[test]
    fn test_mixed_sequence_stays_consistent() {
        let mut store = store_watching(&["a", "b", "c"]);
        for i in 0..64 {
            let pos = BlockPos::new(i * 7 - 200, i % 5, i * 3 - 90);
            let label = ["a", "b", "c"][(i % 3) as usize];
            store.apply_block_change(pos, Some(label));
        }
        store.apply_scan(
            ChunkPos::new(-1, -1),
            (0..16).map(|i| (BlockPos::new(-16 + i, 3, -16 + i), "b")),
        );
        store.unload_chunk(ChunkPos::new(-13, -6));
        store.update_watch_list(["a", "c"]);
        store.apply_block_change(BlockPos::new(-200, 0, -90), None);
        store.unload_chunk(ChunkPos::new(0, 0));
        store.check_consistency().unwrap();
        assert!(store.len() > 0);
    }
}
