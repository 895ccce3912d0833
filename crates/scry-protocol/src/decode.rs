//! Async message readers.
//!
//! Both directions are read straight off the stream: the tag selects the
//! payload layout and every field is pulled with a big-endian primitive read.
//! Any error leaves the stream at an unknown offset, so callers must treat it
//! as fatal for the connection.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::messages::{
    BlockDiff, BlockRecord, ClientMessage, EQUIPMENT_SLOTS, EnchantmentTag, EntityDetails,
    EntityFrame, EntityRecord, FrameHeader, FullRecordKind, ItemSlot, ServerMessage,
};
use crate::tags;
use crate::wire::{ProtocolError, WireLimits, read_bool, read_count, read_string};

/// Read one overlay -> feed message.
pub async fn read_client_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    limits: &WireLimits,
) -> Result<ClientMessage, ProtocolError> {
    let tag = reader.read_u32().await?;
    match tag {
        tags::MODULE_STATES => {
            let count = read_count(reader, "module list", limits.max_list_len).await?;
            let mut states = Vec::with_capacity(count);
            for _ in 0..count {
                let name = read_string(reader, limits).await?;
                let enabled = read_bool(reader).await?;
                states.push((name, enabled));
            }
            Ok(ClientMessage::ModuleStates(states))
        }
        tags::WATCH_LIST => {
            let names = read_string_list(reader, "watch list", limits).await?;
            Ok(ClientMessage::WatchList(names))
        }
        tags::ENTITY_FILTER => {
            let generic = read_bool(reader).await?;
            let all = read_bool(reader).await?;
            let names = read_string_list(reader, "entity filter", limits).await?;
            Ok(ClientMessage::EntityFilter {
                generic,
                all,
                names,
            })
        }
        tags::HOTKEYS => {
            let count = read_count(reader, "hotkey list", limits.max_list_len).await?;
            let mut keys = Vec::with_capacity(count);
            for _ in 0..count {
                keys.push(reader.read_i32().await?);
            }
            Ok(ClientMessage::Hotkeys(keys))
        }
        tags::DISABLE => {
            let fully = read_bool(reader).await?;
            Ok(ClientMessage::Disable { fully })
        }
        other => Err(ProtocolError::UnknownTag(other)),
    }
}

/// Read one feed -> overlay message.
pub async fn read_server_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    limits: &WireLimits,
) -> Result<ServerMessage, ProtocolError> {
    let tag = reader.read_u32().await?;
    match tag {
        tags::ENTITY_FRAME => read_entity_frame(reader, limits)
            .await
            .map(ServerMessage::EntityFrame),
        tags::BLOCK_DIFF => {
            let count = read_count(reader, "block diff", limits.max_block_records).await?;
            // Cap the pre-allocation; the count is trusted only as far as the
            // stream actually delivers records.
            let mut records = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                let op = reader.read_u8().await?;
                let x = reader.read_i32().await?;
                let y = reader.read_i32().await?;
                let z = reader.read_i32().await?;
                let record = match op {
                    tags::BLOCK_OP_ADD => {
                        let label = read_string(reader, limits).await?;
                        BlockRecord::Add {
                            x,
                            y,
                            z,
                            label: Arc::from(label),
                        }
                    }
                    tags::BLOCK_OP_REMOVE => BlockRecord::Remove { x, y, z },
                    value => {
                        return Err(ProtocolError::InvalidDiscriminant {
                            what: "block op",
                            value,
                        });
                    }
                };
                records.push(record);
            }
            Ok(ServerMessage::BlockDiff(BlockDiff { records }))
        }
        tags::DELETE_TYPE => {
            let label = read_string(reader, limits).await?;
            Ok(ServerMessage::DeleteType {
                label: Arc::from(label),
            })
        }
        tags::CLEAR_ALL => Ok(ServerMessage::ClearAll),
        tags::CHUNK_UNLOAD => {
            let x = reader.read_i32().await?;
            let z = reader.read_i32().await?;
            Ok(ServerMessage::ChunkUnload { x, z })
        }
        tags::HOTKEY_PRESSED => {
            let key = reader.read_i32().await?;
            Ok(ServerMessage::HotkeyPressed { key })
        }
        other => Err(ProtocolError::UnknownTag(other)),
    }
}

async fn read_string_list<R: AsyncRead + Unpin>(
    reader: &mut R,
    what: &'static str,
    limits: &WireLimits,
) -> Result<Vec<String>, ProtocolError> {
    let count = read_count(reader, what, limits.max_list_len).await?;
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        names.push(read_string(reader, limits).await?);
    }
    Ok(names)
}

async fn read_entity_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    limits: &WireLimits,
) -> Result<EntityFrame, ProtocolError> {
    let header = FrameHeader {
        yaw: reader.read_f32().await?,
        pitch: reader.read_f32().await?,
        camera: [
            reader.read_f64().await?,
            reader.read_f64().await?,
            reader.read_f64().await?,
        ],
        fov: reader.read_f32().await?,
        overlay_open: read_bool(reader).await?,
        hovered_id: reader.read_i32().await?,
    };

    let count = read_count(reader, "entity frame", limits.max_entities).await?;
    let mut records = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let kind = reader.read_u8().await?;
        let id = reader.read_i32().await?;
        let offset = [
            reader.read_f32().await?,
            reader.read_f32().await?,
            reader.read_f32().await?,
        ];
        let full_kind = match kind {
            tags::RECORD_FULL_PLAYER => FullRecordKind::Player,
            tags::RECORD_FULL_OTHER => FullRecordKind::Other,
            tags::RECORD_POSITION => {
                records.push(EntityRecord::Position { id, offset });
                continue;
            }
            value => {
                return Err(ProtocolError::InvalidDiscriminant {
                    what: "entity record",
                    value,
                });
            }
        };

        let width = reader.read_f32().await?;
        let height = reader.read_f32().await?;
        let name = read_string(reader, limits).await?;
        let ping = reader.read_i32().await?;
        let health = reader.read_f32().await?;
        let max_health = reader.read_f32().await?;
        let absorption = reader.read_f32().await?;
        let mut equipment: [Option<ItemSlot>; EQUIPMENT_SLOTS] = Default::default();
        for slot in equipment.iter_mut() {
            *slot = read_slot(reader, limits).await?;
        }

        records.push(EntityRecord::Full {
            kind: full_kind,
            id,
            offset,
            details: Box::new(EntityDetails {
                width,
                height,
                name,
                ping,
                health,
                max_health,
                absorption,
                equipment,
            }),
        });
    }

    Ok(EntityFrame { header, records })
}

async fn read_slot<R: AsyncRead + Unpin>(
    reader: &mut R,
    limits: &WireLimits,
) -> Result<Option<ItemSlot>, ProtocolError> {
    let id = read_string(reader, limits).await?;
    if id.is_empty() {
        return Ok(None);
    }
    let count = reader.read_i32().await?;
    let max_damage = reader.read_i32().await?;
    let damage = reader.read_i32().await?;
    let n = read_count(reader, "enchantment list", limits.max_enchantments).await?;
    let mut enchantments = Vec::with_capacity(n);
    for _ in 0..n {
        let abbreviation = read_string(reader, limits).await?;
        let level = reader.read_i32().await?;
        enchantments.push(EnchantmentTag {
            abbreviation,
            level,
        });
    }
    Ok(Some(ItemSlot {
        id,
        count,
        max_damage,
        damage,
        enchantments,
    }))
}
