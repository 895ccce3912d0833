//! Chunk scanning against a [`BlockSource`].

use std::sync::Arc;

use crate::coords::{BlockPos, CHUNK_WIDTH, ChunkPos, ScanGeometry};
use crate::source::BlockSource;
use crate::watch::WatchList;

/// Visit every block of `chunk` in the geometry's Y range and collect the
/// positions whose label is in `watch`. Air is skipped.
pub fn scan_chunk(
    source: &dyn BlockSource,
    chunk: ChunkPos,
    geometry: &ScanGeometry,
    watch: &WatchList,
) -> Vec<(BlockPos, Arc<str>)> {
    if watch.is_empty() {
        return Vec::new();
    }
    collect(source, chunk, geometry, |label| watch.contains(label))
}

/// Like [`scan_chunk`] but only looks for `labels`.
pub fn scan_chunk_for(
    source: &dyn BlockSource,
    chunk: ChunkPos,
    geometry: &ScanGeometry,
    labels: &[Arc<str>],
) -> Vec<(BlockPos, Arc<str>)> {
    if labels.is_empty() {
        return Vec::new();
    }
    collect(source, chunk, geometry, |label| {
        labels.iter().any(|wanted| &**wanted == label)
    })
}

fn collect(
    source: &dyn BlockSource,
    chunk: ChunkPos,
    geometry: &ScanGeometry,
    wanted: impl Fn(&str) -> bool,
) -> Vec<(BlockPos, Arc<str>)> {
    let base_x = chunk.min_block_x();
    let base_z = chunk.min_block_z();
    let mut found = Vec::new();

    for y in geometry.min_y..geometry.max_y {
        for dx in 0..CHUNK_WIDTH {
            for dz in 0..CHUNK_WIDTH {
                let pos = BlockPos::new(base_x + dx, y, base_z + dz);
                if let Some(label) = source.block_at(pos)
                    && wanted(&*label)
                {
                    found.push((pos, label));
                }
            }
        }
    }

    tracing::trace!("Scanned {chunk:?}: {} match(es)", found.len());
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ScanFocus;
    use rustc_hash::FxHashMap;

    struct Sparse(FxHashMap<BlockPos, Arc<str>>);

    impl BlockSource for Sparse {
        fn block_at(&self, pos: BlockPos) -> Option<Arc<str>> {
            self.0.get(&pos).cloned()
        }
        fn is_chunk_loaded(&self, _: ChunkPos) -> bool {
            true
        }
        fn scan_focus(&self) -> Option<ScanFocus> {
            None
        }
    }

    fn world() -> Sparse {
        let mut blocks = FxHashMap::default();
        blocks.insert(BlockPos::new(5, 10, 5), Arc::from("diamond_ore"));
        blocks.insert(BlockPos::new(0, -64, 15), Arc::from("iron_ore"));
        blocks.insert(BlockPos::new(3, 319, 3), Arc::from("diamond_ore"));
        blocks.insert(BlockPos::new(3, 320, 3), Arc::from("diamond_ore"));
        blocks.insert(BlockPos::new(16, 10, 0), Arc::from("diamond_ore"));
        blocks.insert(BlockPos::new(2, 2, 2), Arc::from("stone"));
        Sparse(blocks)
    }

    #[test]
    fn test_scan_stays_inside_chunk_and_y_range() {
        let mut watch = WatchList::new();
        watch.replace(["diamond_ore", "iron_ore"]);
        let mut found = scan_chunk(&world(), ChunkPos::new(0, 0), &ScanGeometry::default(), &watch);
        found.sort_by_key(|(pos, _)| *pos);

        let positions: Vec<BlockPos> = found.iter().map(|(p, _)| *p).collect();
        assert_eq!(
            positions,
            vec![
                BlockPos::new(0, -64, 15),
                BlockPos::new(3, 319, 3),
                BlockPos::new(5, 10, 5),
            ]
        );
    }

    #[test]
    fn test_scan_for_specific_labels() {
        let found = scan_chunk_for(
            &world(),
            ChunkPos::new(0, 0),
            &ScanGeometry::default(),
            &[Arc::from("iron_ore")],
        );
        assert_eq!(found.len(), 1);
        assert_eq!(&*found[0].1, "iron_ore");
    }

    #[test]
    fn test_empty_watch_list_skips_scan() {
        let found = scan_chunk(
            &world(),
            ChunkPos::new(0, 0),
            &ScanGeometry::default(),
            &WatchList::new(),
        );
        assert!(found.is_empty());
    }
}
