//! Message tags. The first four bytes of every message.

// ---------------------------------------------------------------------------
// Feed -> overlay
// ---------------------------------------------------------------------------

/// Per-frame entity telemetry.
pub const ENTITY_FRAME: u32 = 0xCAFE_BABE;
/// Block diff, also used for the full-state snapshot sent on connect.
pub const BLOCK_DIFF: u32 = 0x0BE0_C4D0;
/// Drop every cached position carrying one label.
pub const DELETE_TYPE: u32 = 0x0B10_CDE1;
/// Drop every cached position.
pub const CLEAR_ALL: u32 = 0x0C1E_A400;
/// Drop every cached position inside one chunk column.
pub const CHUNK_UNLOAD: u32 = 0x0C40_0000;
/// A watched hotkey went from up to down.
pub const HOTKEY_PRESSED: u32 = 0x000C_B14D;

// ---------------------------------------------------------------------------
// Overlay -> feed
// ---------------------------------------------------------------------------

/// Batch of module enable flags.
pub const MODULE_STATES: u32 = 0xDEAD_BEEF;
/// Replace the block watch list.
pub const WATCH_LIST: u32 = 0x000B_10C0;
/// Replace the entity filter settings.
pub const ENTITY_FILTER: u32 = 0x0000_E581;
/// Replace the watched hotkey set.
pub const HOTKEYS: u32 = 0x000B_14D0;
/// Stop the feed, optionally for good.
pub const DISABLE: u32 = 0x0BAD_F00D;

// ---------------------------------------------------------------------------
// Block record op codes
// ---------------------------------------------------------------------------

/// Block record adds a position (label follows).
pub const BLOCK_OP_ADD: u8 = 0;
/// Block record removes a position.
pub const BLOCK_OP_REMOVE: u8 = 1;

// ---------------------------------------------------------------------------
// Entity record kinds
// ---------------------------------------------------------------------------

/// Full record for a player.
pub const RECORD_FULL_PLAYER: u8 = 0;
/// Full record for anything that is not a player.
pub const RECORD_FULL_OTHER: u8 = 1;
/// Position-only refresh of an entity the consumer already knows.
pub const RECORD_POSITION: u8 = 2;
