//! Owned per-frame data handed over by the host.
//!
//! The host captures these on its render thread; everything after that runs
//! on runtime tasks, so nothing here borrows from host objects.

use glam::DVec3;
use scry_protocol::EQUIPMENT_SLOTS;

/// Coarse entity class, enough to apply the inclusion policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityClass {
    /// Another player.
    Player,
    /// A non-player living entity (mobs, animals).
    Living,
    /// Anything else: items, projectiles, vehicles.
    Other,
}

/// One equipped item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentSnapshot {
    /// Item identifier without namespace, e.g. `"diamond_sword"`.
    pub item: String,
    /// Stack size.
    pub count: i32,
    /// `(max_damage, damage)` for damageable items.
    pub durability: Option<(i32, i32)>,
    /// Enchantment identifiers with their levels.
    pub enchantments: Vec<(String, i32)>,
}

/// Everything known about an entity this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    /// Host entity id.
    pub id: i32,
    /// Player, living or other.
    pub class: EntityClass,
    /// The entity is the local player.
    pub is_local: bool,
    /// Type description, e.g. `"Zombie"`. Matched against the specific-name set.
    pub type_name: String,
    /// Display name, e.g. a player's username.
    pub display_name: String,
    /// Interpolated world position.
    pub position: DVec3,
    /// Bounding box width.
    pub width: f32,
    /// Bounding box height.
    pub height: f32,
    /// Latency for players whose tab-list entry is known.
    pub ping: Option<i32>,
    /// Current health.
    pub health: f32,
    /// Maximum health.
    pub max_health: f32,
    /// Absorption amount.
    pub absorption: f32,
    /// Main hand, off hand, head, chest, legs, feet.
    pub equipment: [Option<EquipmentSnapshot>; EQUIPMENT_SLOTS],
}

impl EntitySnapshot {
    /// A bare entity with default vitals and no equipment.
    pub fn new(id: i32, class: EntityClass, type_name: impl Into<String>, position: DVec3) -> Self {
        let type_name = type_name.into();
        Self {
            id,
            class,
            is_local: false,
            display_name: type_name.clone(),
            type_name,
            position,
            width: 0.6,
            height: 1.8,
            ping: None,
            health: 20.0,
            max_health: 20.0,
            absorption: 0.0,
            equipment: Default::default(),
        }
    }
}

/// Camera position and orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// World position.
    pub position: DVec3,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

/// The entity under the crosshair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hovered {
    /// Host entity id.
    pub id: i32,
    /// Its class.
    pub class: EntityClass,
}

/// Input to one broadcast pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSnapshot {
    /// Camera at render time.
    pub camera: CameraPose,
    /// Partial tick used for interpolation, passed on to the FOV provider.
    pub partial_tick: f32,
    /// A menu or other input-blocking screen is open.
    pub overlay_open: bool,
    /// Entity under the crosshair, if any.
    pub hovered: Option<Hovered>,
    /// Every renderable entity, the local player included.
    pub entities: Vec<EntitySnapshot>,
}
