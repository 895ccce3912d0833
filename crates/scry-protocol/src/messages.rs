//! Message types and their encoders.
//!
//! Each message encodes into one contiguous buffer so that a writer can put
//! it on the socket with a single `write_all`, which keeps messages from
//! different producers from interleaving on one connection.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::tags;
use crate::wire::{put_bool, put_string, string_len};

/// Equipment slots carried by a full entity record, in wire order:
/// main hand, off hand, head, chest, legs, feet.
pub const EQUIPMENT_SLOTS: usize = 6;

// ---------------------------------------------------------------------------
// Block records
// ---------------------------------------------------------------------------

/// One entry of a [`BlockDiff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRecord {
    /// A position now matches the watch list.
    Add {
        /// Block X.
        x: i32,
        /// Block Y.
        y: i32,
        /// Block Z.
        z: i32,
        /// Block-type label.
        label: Arc<str>,
    },
    /// A position no longer matches.
    Remove {
        /// Block X.
        x: i32,
        /// Block Y.
        y: i32,
        /// Block Z.
        z: i32,
    },
}

impl BlockRecord {
    /// Position of the record.
    pub fn position(&self) -> (i32, i32, i32) {
        match *self {
            BlockRecord::Add { x, y, z, .. } | BlockRecord::Remove { x, y, z } => (x, y, z),
        }
    }

    /// Whether this record adds a position.
    pub fn is_add(&self) -> bool {
        matches!(self, BlockRecord::Add { .. })
    }
}

/// Batch of block records. Also carries the full-state snapshot on connect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockDiff {
    /// Records in wire order.
    pub records: Vec<BlockRecord>,
}

impl BlockDiff {
    /// Build a diff, placing removals ahead of additions as consumers expect.
    pub fn new(added: Vec<BlockRecord>, removed: Vec<BlockRecord>) -> Self {
        let mut records = removed;
        records.extend(added);
        Self { records }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the diff carries no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Entity frames
// ---------------------------------------------------------------------------

/// Camera and UI state at the start of an entity frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    /// Camera yaw in degrees.
    pub yaw: f32,
    /// Camera pitch in degrees.
    pub pitch: f32,
    /// Absolute camera position.
    pub camera: [f64; 3],
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// An input-blocking screen (menu, inventory) is open.
    pub overlay_open: bool,
    /// Id of the hovered player, or -1.
    pub hovered_id: i32,
}

/// Which full-record byte to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullRecordKind {
    /// Kind byte 0.
    Player,
    /// Kind byte 1.
    Other,
}

/// An enchantment rendered as abbreviation + level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnchantmentTag {
    /// Short label, e.g. `"SH"`.
    pub abbreviation: String,
    /// Enchantment level.
    pub level: i32,
}

/// A non-empty equipment slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSlot {
    /// Item identifier, never empty.
    pub id: String,
    /// Stack size.
    pub count: i32,
    /// Maximum durability, 0 for items without durability.
    pub max_damage: i32,
    /// Current damage, 0 for items without durability.
    pub damage: i32,
    /// Enchantments in host order.
    pub enchantments: Vec<EnchantmentTag>,
}

/// Static fields sent with a full record.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDetails {
    /// Bounding box width.
    pub width: f32,
    /// Bounding box height.
    pub height: f32,
    /// Display name.
    pub name: String,
    /// Network latency in ms, -1 when unknown.
    pub ping: i32,
    /// Current health.
    pub health: f32,
    /// Maximum health.
    pub max_health: f32,
    /// Absorption hearts.
    pub absorption: f32,
    /// Equipment, `None` for an empty slot.
    pub equipment: [Option<ItemSlot>; EQUIPMENT_SLOTS],
}

/// One entity inside an [`EntityFrame`].
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRecord {
    /// Everything the consumer needs to draw the entity.
    Full {
        /// Player or not.
        kind: FullRecordKind,
        /// Host entity id.
        id: i32,
        /// Position relative to the camera.
        offset: [f32; 3],
        /// Static fields.
        details: Box<EntityDetails>,
    },
    /// Position refresh for an entity sent in full recently.
    Position {
        /// Host entity id.
        id: i32,
        /// Position relative to the camera.
        offset: [f32; 3],
    },
}

impl EntityRecord {
    /// Host entity id.
    pub fn id(&self) -> i32 {
        match *self {
            EntityRecord::Full { id, .. } | EntityRecord::Position { id, .. } => id,
        }
    }
}

/// Per-frame entity telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityFrame {
    /// Camera and UI state.
    pub header: FrameHeader,
    /// Entities included this frame.
    pub records: Vec<EntityRecord>,
}

// ---------------------------------------------------------------------------
// Top-level enums
// ---------------------------------------------------------------------------

/// Messages the feed sends to the overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Entity telemetry for one rendered frame.
    EntityFrame(EntityFrame),
    /// Incremental block changes, or the full state on connect.
    BlockDiff(BlockDiff),
    /// Every position carrying `label` is gone.
    DeleteType {
        /// The label no longer watched.
        label: Arc<str>,
    },
    /// Every tracked position is gone.
    ClearAll,
    /// Every position inside the chunk column is gone.
    ChunkUnload {
        /// Chunk X.
        x: i32,
        /// Chunk Z.
        z: i32,
    },
    /// A watched key went down.
    HotkeyPressed {
        /// Host key code.
        key: i32,
    },
}

/// Messages the overlay sends to the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Module enable flags, applied in order.
    ModuleStates(Vec<(String, bool)>),
    /// Replacement block watch list.
    WatchList(Vec<String>),
    /// Replacement entity filter.
    EntityFilter {
        /// Show generic living entities.
        generic: bool,
        /// Show every entity.
        all: bool,
        /// Entity type names always shown.
        names: Vec<String>,
    },
    /// Replacement hotkey set.
    Hotkeys(Vec<i32>),
    /// Stop the feed; `fully` keeps it stopped until an explicit reset.
    Disable {
        /// Permanent disable.
        fully: bool,
    },
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

impl ServerMessage {
    /// The 4-byte tag that starts this message.
    pub fn tag(&self) -> u32 {
        match self {
            ServerMessage::EntityFrame(_) => tags::ENTITY_FRAME,
            ServerMessage::BlockDiff(_) => tags::BLOCK_DIFF,
            ServerMessage::DeleteType { .. } => tags::DELETE_TYPE,
            ServerMessage::ClearAll => tags::CLEAR_ALL,
            ServerMessage::ChunkUnload { .. } => tags::CHUNK_UNLOAD,
            ServerMessage::HotkeyPressed { .. } => tags::HOTKEY_PRESSED,
        }
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size_hint());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Append the encoded message to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u32(self.tag());
        match self {
            ServerMessage::EntityFrame(frame) => encode_entity_frame(buf, frame),
            ServerMessage::BlockDiff(diff) => {
                buf.put_i32(diff.records.len() as i32);
                for record in &diff.records {
                    match record {
                        BlockRecord::Add { x, y, z, label } => {
                            buf.put_u8(tags::BLOCK_OP_ADD);
                            buf.put_i32(*x);
                            buf.put_i32(*y);
                            buf.put_i32(*z);
                            put_string(buf, label);
                        }
                        BlockRecord::Remove { x, y, z } => {
                            buf.put_u8(tags::BLOCK_OP_REMOVE);
                            buf.put_i32(*x);
                            buf.put_i32(*y);
                            buf.put_i32(*z);
                        }
                    }
                }
            }
            ServerMessage::DeleteType { label } => put_string(buf, label),
            ServerMessage::ClearAll => {}
            ServerMessage::ChunkUnload { x, z } => {
                buf.put_i32(*x);
                buf.put_i32(*z);
            }
            ServerMessage::HotkeyPressed { key } => buf.put_i32(*key),
        }
    }

    /// Rough encoded size, used to pre-size buffers.
    fn size_hint(&self) -> usize {
        4 + match self {
            ServerMessage::EntityFrame(frame) => 41 + frame.records.len() * 64,
            ServerMessage::BlockDiff(diff) => 4 + diff.records.len() * 24,
            ServerMessage::DeleteType { label } => string_len(label),
            ServerMessage::ClearAll => 0,
            ServerMessage::ChunkUnload { .. } => 8,
            ServerMessage::HotkeyPressed { .. } => 4,
        }
    }
}

fn encode_entity_frame(buf: &mut BytesMut, frame: &EntityFrame) {
    let h = &frame.header;
    buf.put_f32(h.yaw);
    buf.put_f32(h.pitch);
    buf.put_f64(h.camera[0]);
    buf.put_f64(h.camera[1]);
    buf.put_f64(h.camera[2]);
    buf.put_f32(h.fov);
    put_bool(buf, h.overlay_open);
    buf.put_i32(h.hovered_id);
    buf.put_i32(frame.records.len() as i32);

    for record in &frame.records {
        match record {
            EntityRecord::Full {
                kind,
                id,
                offset,
                details,
            } => {
                buf.put_u8(match kind {
                    FullRecordKind::Player => tags::RECORD_FULL_PLAYER,
                    FullRecordKind::Other => tags::RECORD_FULL_OTHER,
                });
                buf.put_i32(*id);
                put_offset(buf, offset);
                buf.put_f32(details.width);
                buf.put_f32(details.height);
                put_string(buf, &details.name);
                buf.put_i32(details.ping);
                buf.put_f32(details.health);
                buf.put_f32(details.max_health);
                buf.put_f32(details.absorption);
                for slot in &details.equipment {
                    encode_slot(buf, slot.as_ref());
                }
            }
            EntityRecord::Position { id, offset } => {
                buf.put_u8(tags::RECORD_POSITION);
                buf.put_i32(*id);
                put_offset(buf, offset);
            }
        }
    }
}

fn put_offset(buf: &mut BytesMut, offset: &[f32; 3]) {
    buf.put_f32(offset[0]);
    buf.put_f32(offset[1]);
    buf.put_f32(offset[2]);
}

fn encode_slot(buf: &mut BytesMut, slot: Option<&ItemSlot>) {
    // An empty id is the empty-slot marker; nothing follows it.
    let Some(item) = slot.filter(|item| !item.id.is_empty()) else {
        buf.put_i32(0);
        return;
    };
    put_string(buf, &item.id);
    buf.put_i32(item.count);
    buf.put_i32(item.max_damage);
    buf.put_i32(item.damage);
    buf.put_i32(item.enchantments.len() as i32);
    for ench in &item.enchantments {
        put_string(buf, &ench.abbreviation);
        buf.put_i32(ench.level);
    }
}

impl ClientMessage {
    /// The 4-byte tag that starts this message.
    pub fn tag(&self) -> u32 {
        match self {
            ClientMessage::ModuleStates(_) => tags::MODULE_STATES,
            ClientMessage::WatchList(_) => tags::WATCH_LIST,
            ClientMessage::EntityFilter { .. } => tags::ENTITY_FILTER,
            ClientMessage::Hotkeys(_) => tags::HOTKEYS,
            ClientMessage::Disable { .. } => tags::DISABLE,
        }
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u32(self.tag());
        match self {
            ClientMessage::ModuleStates(states) => {
                buf.put_i32(states.len() as i32);
                for (name, enabled) in states {
                    put_string(&mut buf, name);
                    put_bool(&mut buf, *enabled);
                }
            }
            ClientMessage::WatchList(labels) => {
                buf.put_i32(labels.len() as i32);
                for label in labels {
                    put_string(&mut buf, label);
                }
            }
            ClientMessage::EntityFilter {
                generic,
                all,
                names,
            } => {
                put_bool(&mut buf, *generic);
                put_bool(&mut buf, *all);
                buf.put_i32(names.len() as i32);
                for name in names {
                    put_string(&mut buf, name);
                }
            }
            ClientMessage::Hotkeys(keys) => {
                buf.put_i32(keys.len() as i32);
                for key in keys {
                    buf.put_i32(*key);
                }
            }
            ClientMessage::Disable { fully } => put_bool(&mut buf, *fully),
        }
        buf.freeze()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn be_u32(bytes: &[u8]) -> u32 {
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    #[test]
    fn test_tag_is_first_four_bytes() {
        let bytes = ServerMessage::ClearAll.encode();
        assert_eq!(bytes.len(), 4);
        assert_eq!(be_u32(&bytes), 0x0C1E_A400);
    }

    #[test]
    fn test_chunk_unload_layout() {
        let bytes = ServerMessage::ChunkUnload { x: -2, z: 7 }.encode();
        assert_eq!(be_u32(&bytes[0..4]), tags::CHUNK_UNLOAD);
        assert_eq!(&bytes[4..8], &(-2i32).to_be_bytes());
        assert_eq!(&bytes[8..12], &7i32.to_be_bytes());
    }

    #[test]
    fn test_block_diff_puts_removals_first() {
        let diff = BlockDiff::new(
            vec![BlockRecord::Add {
                x: 5,
                y: 10,
                z: 5,
                label: Arc::from("diamond_ore"),
            }],
            vec![BlockRecord::Remove { x: 1, y: 2, z: 3 }],
        );
        assert!(!diff.records[0].is_add());
        assert!(diff.records[1].is_add());

        let bytes = ServerMessage::BlockDiff(diff).encode();
        assert_eq!(&bytes[4..8], &2i32.to_be_bytes());
        // Remove record: op + 3 ints, no label.
        assert_eq!(bytes[8], tags::BLOCK_OP_REMOVE);
        assert_eq!(bytes[21], tags::BLOCK_OP_ADD);
        // Add record: op + 3 ints + (len + "diamond_ore").
        assert_eq!(bytes.len(), 4 + 4 + 13 + 13 + 4 + 11);
    }

    #[test]
    fn test_empty_slot_is_zero_length_id() {
        let mut buf = BytesMut::new();
        encode_slot(&mut buf, None);
        assert_eq!(&buf[..], &[0, 0, 0, 0]);

        let mut buf = BytesMut::new();
        let blank = ItemSlot {
            id: String::new(),
            count: 3,
            max_damage: 0,
            damage: 0,
            enchantments: Vec::new(),
        };
        encode_slot(&mut buf, Some(&blank));
        assert_eq!(&buf[..], &[0, 0, 0, 0], "blank id must collapse to the marker");
    }

    #[test]
    fn test_position_record_is_compact() {
        let frame = EntityFrame {
            header: FrameHeader {
                yaw: 0.0,
                pitch: 0.0,
                camera: [0.0; 3],
                fov: 70.0,
                overlay_open: false,
                hovered_id: -1,
            },
            records: vec![EntityRecord::Position {
                id: 9,
                offset: [1.0, 2.0, 3.0],
            }],
        };
        let bytes = ServerMessage::EntityFrame(frame).encode();
        // tag + header(4+4+24+4+1+4) + count + (kind + id + 3 floats)
        assert_eq!(bytes.len(), 4 + 41 + 4 + 17);
        assert_eq!(bytes[49], tags::RECORD_POSITION);
    }

    #[test]
    fn test_disable_encodes_flag() {
        let bytes = ClientMessage::Disable { fully: true }.encode();
        assert_eq!(be_u32(&bytes), tags::DISABLE);
        assert_eq!(&bytes[4..], &[1]);
    }

    #[test]
    fn test_entity_filter_layout() {
        let bytes = ClientMessage::EntityFilter {
            generic: true,
            all: false,
            names: vec!["Creeper".into()],
        }
        .encode();
        assert_eq!(be_u32(&bytes), tags::ENTITY_FILTER);
        assert_eq!(&bytes[4..6], &[1, 0]);
        assert_eq!(&bytes[6..10], &1i32.to_be_bytes());
        assert_eq!(&bytes[10..14], &7i32.to_be_bytes());
        assert_eq!(&bytes[14..], b"Creeper");
    }
}
