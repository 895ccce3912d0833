//! Block and chunk coordinates.

/// Horizontal size of a chunk column, in blocks.
pub const CHUNK_WIDTH: i32 = 16;

const CHUNK_SHIFT: u32 = CHUNK_WIDTH.trailing_zeros();

/// Integer world position of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    /// World X.
    pub x: i32,
    /// World Y.
    pub y: i32,
    /// World Z.
    pub z: i32,
}

impl BlockPos {
    /// Creates a block position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The chunk column containing this block.
    pub fn chunk(self) -> ChunkPos {
        ChunkPos::containing(self)
    }
}

/// Horizontal position of a chunk column in chunk units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    /// Chunk X.
    pub x: i32,
    /// Chunk Z.
    pub z: i32,
}

impl ChunkPos {
    /// Creates a chunk position.
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The chunk containing `pos`. Floors toward negative infinity, so block
    /// -1 lives in chunk -1.
    pub fn containing(pos: BlockPos) -> Self {
        Self {
            x: pos.x >> CHUNK_SHIFT,
            z: pos.z >> CHUNK_SHIFT,
        }
    }

    /// World X of the chunk's west edge.
    pub fn min_block_x(self) -> i32 {
        self.x << CHUNK_SHIFT
    }

    /// World Z of the chunk's north edge.
    pub fn min_block_z(self) -> i32 {
        self.z << CHUNK_SHIFT
    }

    /// Squared horizontal distance in chunks.
    pub fn distance_sq(self, other: ChunkPos) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dz = i64::from(self.z) - i64::from(other.z);
        dx * dx + dz * dz
    }

    /// Every chunk in the square of half-width `radius` around `self`,
    /// nearest first. Ties are broken by position so the order is stable.
    pub fn square_nearest_first(self, radius: i32) -> Vec<ChunkPos> {
        let radius = radius.max(0);
        let side = (2 * radius + 1) as usize;
        let mut chunks = Vec::with_capacity(side * side);
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                chunks.push(ChunkPos::new(self.x + dx, self.z + dz));
            }
        }
        chunks.sort_by_key(|c| (c.distance_sq(self), c.x, c.z));
        chunks
    }
}

/// Vertical extent of a scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanGeometry {
    /// Lowest scanned Y (inclusive).
    pub min_y: i32,
    /// Highest scanned Y (exclusive).
    pub max_y: i32,
}

impl Default for ScanGeometry {
    fn default() -> Self {
        Self {
            min_y: -64,
            max_y: 320,
        }
    }
}

impl ScanGeometry {
    /// Number of blocks visited per chunk.
    pub fn blocks_per_chunk(&self) -> usize {
        let height = (self.max_y - self.min_y).max(0) as usize;
        height * (CHUNK_WIDTH * CHUNK_WIDTH) as usize
    }
}
