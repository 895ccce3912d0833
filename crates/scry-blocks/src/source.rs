//! What the scan worker needs from the host world.

use std::sync::Arc;

use crate::coords::{BlockPos, ChunkPos};

/// Area the host wants kept in sync: the player's chunk and view radius.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanFocus {
    /// Chunk the player stands in.
    pub center: ChunkPos,
    /// View radius in chunks.
    pub radius: i32,
}

/// Read access to the host's block data, called from the scan thread.
pub trait BlockSource: Send + Sync {
    /// Label of the block at `pos`, `None` for air or unknown.
    fn block_at(&self, pos: BlockPos) -> Option<Arc<str>>;

    /// Whether the chunk's data is currently available.
    fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool;

    /// Where the player is, or `None` when no world is loaded.
    fn scan_focus(&self) -> Option<ScanFocus>;
}

impl<T: BlockSource + ?Sized> BlockSource for Arc<T> {
    fn block_at(&self, pos: BlockPos) -> Option<Arc<str>> {
        (**self).block_at(pos)
    }

    fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool {
        (**self).is_chunk_loaded(chunk)
    }

    fn scan_focus(&self) -> Option<ScanFocus> {
        (**self).scan_focus()
    }
}
