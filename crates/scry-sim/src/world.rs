//! Procedural block world with chunk streaming around a walking player.

use std::sync::Arc;

use glam::DVec3;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
use scry_blocks::{BlockPos, BlockSource, CHUNK_WIDTH, ChunkPos, ScanFocus};

/// Everything at or above this Y is air.
pub const SURFACE_Y: i32 = 64;
/// Lowest solid Y.
pub const BEDROCK_Y: i32 = -64;

/// Ores placed per chunk: label, attempts, highest Y.
const ORE_TABLE: [(&str, usize, i32); 5] = [
    ("coal_ore", 40, 60),
    ("iron_ore", 24, 40),
    ("gold_ore", 6, 0),
    ("diamond_ore", 3, -40),
    ("ancient_debris", 1, -56),
];

/// Labels of every ore the world can contain.
pub fn ore_labels() -> Vec<String> {
    ORE_TABLE.iter().map(|(label, _, _)| label.to_string()).collect()
}

/// Chunks that came and went during a move.
#[derive(Debug, Default)]
pub struct Streaming {
    /// Newly loaded, nearest first.
    pub loaded: Vec<ChunkPos>,
    /// Newly unloaded.
    pub unloaded: Vec<ChunkPos>,
}

struct WorldState {
    player: DVec3,
    ores: FxHashMap<ChunkPos, FxHashMap<BlockPos, Arc<str>>>,
}

/// A deterministic world: stone up to [`SURFACE_Y`], ores scattered per
/// chunk from the seed, air above.
pub struct SyntheticWorld {
    seed: u64,
    view_radius: i32,
    stone: Arc<str>,
    labels: Vec<Arc<str>>,
    state: RwLock<WorldState>,
}

impl SyntheticWorld {
    /// Create a world with no chunks loaded and the player at the origin.
    pub fn new(seed: u64, view_radius: i32) -> Self {
        Self {
            seed,
            view_radius,
            stone: Arc::from("stone"),
            labels: ORE_TABLE.iter().map(|(l, _, _)| Arc::from(*l)).collect(),
            state: RwLock::new(WorldState {
                player: DVec3::new(0.5, f64::from(SURFACE_Y), 0.5),
                ores: FxHashMap::default(),
            }),
        }
    }

    /// Player position.
    pub fn player(&self) -> DVec3 {
        self.state.read().player
    }

    /// Number of loaded chunks.
    pub fn loaded_count(&self) -> usize {
        self.state.read().ores.len()
    }

    /// Move the player and stream chunks in and out of the view radius.
    pub fn move_player(&self, to: DVec3) -> Streaming {
        let mut state = self.state.write();
        state.player = to;
        let center = chunk_under(to);
        let wanted: FxHashSet<ChunkPos> = center
            .square_nearest_first(self.view_radius)
            .into_iter()
            .collect();

        let mut streaming = Streaming::default();
        let stale: Vec<ChunkPos> = state
            .ores
            .keys()
            .filter(|chunk| !wanted.contains(chunk))
            .copied()
            .collect();
        for chunk in stale {
            state.ores.remove(&chunk);
            streaming.unloaded.push(chunk);
        }
        for chunk in center.square_nearest_first(self.view_radius) {
            if !state.ores.contains_key(&chunk) {
                let ores = self.generate(chunk);
                state.ores.insert(chunk, ores);
                streaming.loaded.push(chunk);
            }
        }
        streaming
    }

    /// Mine or place a block inside a loaded chunk. Returns the new label,
    /// or `None` when the chunk is not loaded.
    pub fn set_block(&self, pos: BlockPos, label: Option<&str>) -> Option<Option<String>> {
        let mut state = self.state.write();
        let ores = state.ores.get_mut(&pos.chunk())?;
        match label.and_then(|l| self.labels.iter().find(|known| &***known == l)) {
            Some(interned) => {
                ores.insert(pos, Arc::clone(interned));
            }
            None => {
                ores.remove(&pos);
            }
        }
        Some(label.map(str::to_string))
    }

    /// A random ore position in a loaded chunk, for block-change traffic.
    pub fn random_ore(&self, rng: &mut StdRng) -> Option<BlockPos> {
        let state = self.state.read();
        let chunks: Vec<_> = state.ores.values().filter(|o| !o.is_empty()).collect();
        if chunks.is_empty() {
            return None;
        }
        let ores = chunks[rng.random_range(0..chunks.len())];
        ores.keys().nth(rng.random_range(0..ores.len())).copied()
    }

    fn generate(&self, chunk: ChunkPos) -> FxHashMap<BlockPos, Arc<str>> {
        let chunk_seed = self.seed
            ^ (chunk.x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (chunk.z as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
        let mut rng = StdRng::seed_from_u64(chunk_seed);
        let mut ores = FxHashMap::default();

        for ((_, attempts, top), label) in ORE_TABLE.iter().zip(&self.labels) {
            for _ in 0..*attempts {
                let pos = BlockPos::new(
                    chunk.min_block_x() + rng.random_range(0..CHUNK_WIDTH),
                    rng.random_range(BEDROCK_Y..*top),
                    chunk.min_block_z() + rng.random_range(0..CHUNK_WIDTH),
                );
                ores.insert(pos, Arc::clone(label));
            }
        }
        ores
    }
}

fn chunk_under(position: DVec3) -> ChunkPos {
    ChunkPos::containing(BlockPos::new(
        position.x.floor() as i32,
        0,
        position.z.floor() as i32,
    ))
}

impl BlockSource for SyntheticWorld {
    fn block_at(&self, pos: BlockPos) -> Option<Arc<str>> {
        if pos.y >= SURFACE_Y || pos.y < BEDROCK_Y {
            return None;
        }
        let state = self.state.read();
        let ores = state.ores.get(&pos.chunk())?;
        Some(ores.get(&pos).map_or_else(|| Arc::clone(&self.stone), Arc::clone))
    }

    fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool {
        self.state.read().ores.contains_key(&chunk)
    }

    fn scan_focus(&self) -> Option<ScanFocus> {
        Some(ScanFocus {
            center: chunk_under(self.player()),
            radius: self.view_radius,
        })
    }
}
