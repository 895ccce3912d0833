//! Turns a [`FrameSnapshot`] into an [`EntityFrame`].

use std::time::Instant;

use scry_protocol::{
    EnchantmentTag, EntityDetails, EntityFrame, EntityRecord, FrameHeader, FullRecordKind,
    ItemSlot,
};

use crate::cache::MobSendCache;
use crate::enchantments::abbreviate;
use crate::policy::InclusionPolicy;
use crate::snapshot::{EntityClass, EntitySnapshot, EquipmentSnapshot, FrameSnapshot};

/// Header fields for `snapshot`. Only a hovered player is reported.
pub fn frame_header(snapshot: &FrameSnapshot, fov: f32) -> FrameHeader {
    let camera = snapshot.camera.position;
    FrameHeader {
        yaw: snapshot.camera.yaw,
        pitch: snapshot.camera.pitch,
        camera: camera.to_array(),
        fov,
        overlay_open: snapshot.overlay_open,
        hovered_id: snapshot
            .hovered
            .filter(|h| h.class == EntityClass::Player)
            .map_or(-1, |h| h.id),
    }
}

/// Entities `policy` lets through, in snapshot order.
pub fn select<'a>(
    snapshot: &'a FrameSnapshot,
    policy: &InclusionPolicy,
) -> Vec<&'a EntitySnapshot> {
    snapshot
        .entities
        .iter()
        .filter(|e| policy.classify(e).is_some())
        .collect()
}

/// Build the frame for the selected entities.
///
/// Players always get a full record. Other entities get a full record the
/// first time they are sent and after their cache entry expired, and a
/// position-only record otherwise. Every send refreshes the cache entry.
pub fn build_frame(
    snapshot: &FrameSnapshot,
    policy: &InclusionPolicy,
    fov: f32,
    cache: &MobSendCache,
    now: Instant,
) -> EntityFrame {
    let camera = snapshot.camera.position;
    let records = select(snapshot, policy)
        .into_iter()
        .map(|entity| {
            let offset = (entity.position - camera).as_vec3().to_array();
            match entity.class {
                EntityClass::Player => EntityRecord::Full {
                    kind: FullRecordKind::Player,
                    id: entity.id,
                    offset,
                    details: Box::new(living_details(entity)),
                },
                EntityClass::Living | EntityClass::Other => {
                    if cache.touch(entity.id, now) {
                        EntityRecord::Position {
                            id: entity.id,
                            offset,
                        }
                    } else {
                        let details = if entity.class == EntityClass::Living {
                            living_details(entity)
                        } else {
                            placeholder_details(entity)
                        };
                        EntityRecord::Full {
                            kind: FullRecordKind::Other,
                            id: entity.id,
                            offset,
                            details: Box::new(details),
                        }
                    }
                }
            }
        })
        .collect();

    EntityFrame {
        header: frame_header(snapshot, fov),
        records,
    }
}

fn living_details(entity: &EntitySnapshot) -> EntityDetails {
    EntityDetails {
        width: entity.width,
        height: entity.height,
        name: entity.display_name.clone(),
        ping: entity.ping.unwrap_or(-1),
        health: entity.health,
        max_health: entity.max_health,
        absorption: entity.absorption,
        equipment: entity.equipment.each_ref().map(|slot| slot.as_ref().and_then(item_slot)),
    }
}

// Non-living entities carry no vitals or equipment.
fn placeholder_details(entity: &EntitySnapshot) -> EntityDetails {
    EntityDetails {
        width: entity.width,
        height: entity.height,
        name: entity.type_name.clone(),
        ping: 0,
        health: 1.0,
        max_health: 1.0,
        absorption: 0.0,
        equipment: Default::default(),
    }
}

fn item_slot(item: &EquipmentSnapshot) -> Option<ItemSlot> {
    if item.item.is_empty() || item.count <= 0 {
        return None;
    }
    let (max_damage, damage) = item.durability.unwrap_or((0, 0));
    Some(ItemSlot {
        id: item.item.clone(),
        count: item.count,
        max_damage,
        damage,
        enchantments: item
            .enchantments
            .iter()
            .map(|(id, level)| EnchantmentTag {
                abbreviation: abbreviate(id).into_owned(),
                level: *level,
            })
            .collect(),
    })
}
