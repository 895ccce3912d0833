//! Differential tracking of watched block positions.
//!
//! The [`TrackingStore`] knows every position whose block carries a watched
//! label, indexed by containing chunk so a chunk unload is a single lookup.
//! It is owned by the [`ScanWorker`], a dedicated thread that applies scans,
//! block changes, unloads and watch-list changes strictly in submission order
//! and publishes the resulting diffs through a
//! [`MessageSink`](scry_protocol::MessageSink).

pub mod coords;
pub mod scanner;
pub mod source;
pub mod store;
pub mod watch;
pub mod worker;

pub use coords::{BlockPos, CHUNK_WIDTH, ChunkPos, ScanGeometry};
pub use scanner::{scan_chunk, scan_chunk_for};
pub use source::{BlockSource, ScanFocus};
pub use store::{TrackingStore, WatchListUpdate};
pub use watch::WatchList;
pub use worker::{ScanError, ScanSettings, ScanWorker};
