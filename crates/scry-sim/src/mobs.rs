//! A wandering herd of entities around the player.

use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scry_entities::{
    CameraPose, EntityClass, EntitySnapshot, EquipmentSnapshot, FrameSnapshot, Hovered,
};

const LIVING_TYPES: [&str; 5] = ["Zombie", "Skeleton", "Creeper", "Cow", "Witch"];
const OTHER_TYPES: [&str; 3] = ["Item", "Arrow", "Boat"];
const PLAYER_NAMES: [&str; 3] = ["Notch", "Dinnerbone", "Grumm"];

/// Entities are kept within this many blocks of the player.
const LEASH: f64 = 48.0;
/// Chance per step that one non-player despawns and another appears.
const RESPAWN_CHANCE: f64 = 0.02;

struct Wanderer {
    snapshot: EntitySnapshot,
    velocity: DVec3,
}

/// Generates one [`FrameSnapshot`] per simulated frame.
pub struct Herd {
    rng: StdRng,
    next_id: i32,
    local: EntitySnapshot,
    wanderers: Vec<Wanderer>,
    yaw: f32,
}

impl Herd {
    /// Spawn `mobs` non-players plus a few remote players.
    pub fn new(seed: u64, mobs: usize) -> Self {
        let mut local = EntitySnapshot::new(0, EntityClass::Player, "Player", DVec3::ZERO);
        local.is_local = true;
        local.display_name = "Steve".into();

        let mut herd = Self {
            rng: StdRng::seed_from_u64(seed),
            next_id: 1,
            local,
            wanderers: Vec::with_capacity(mobs + PLAYER_NAMES.len()),
            yaw: 0.0,
        };
        for name in PLAYER_NAMES {
            let player = herd.spawn_player(name);
            herd.wanderers.push(player);
        }
        for _ in 0..mobs {
            let mob = herd.spawn_mob(DVec3::ZERO);
            herd.wanderers.push(mob);
        }
        herd
    }

    /// Advance by `dt` seconds with the local player at `player`.
    pub fn step(&mut self, dt: f64, player: DVec3) -> FrameSnapshot {
        self.local.position = player;
        self.yaw = (self.yaw + 30.0 * dt as f32) % 360.0;

        for wanderer in &mut self.wanderers {
            if self.rng.random_bool(0.05) {
                wanderer.velocity = DVec3::new(
                    self.rng.random_range(-4.0..4.0),
                    0.0,
                    self.rng.random_range(-4.0..4.0),
                );
            }
            let offset = wanderer.snapshot.position - player;
            if offset.x.abs() > LEASH || offset.z.abs() > LEASH {
                wanderer.velocity =
                    DVec3::new(-offset.x, 0.0, -offset.z).normalize_or_zero() * 4.0;
            }
            let mut next = wanderer.snapshot.position + wanderer.velocity * dt;
            next.y = player.y;
            wanderer.snapshot.position = next;

            if wanderer.snapshot.class == EntityClass::Living {
                let max = wanderer.snapshot.max_health;
                let health = wanderer.snapshot.health + self.rng.random_range(-0.5..0.5);
                wanderer.snapshot.health = health.clamp(1.0, max);
            }
        }

        if self.rng.random_bool(RESPAWN_CHANCE)
            && let Some(index) = self
                .wanderers
                .iter()
                .position(|w| w.snapshot.class != EntityClass::Player)
        {
            let gone = self.wanderers.swap_remove(index);
            tracing::trace!("Entity {} despawned", gone.snapshot.id);
            let fresh = self.spawn_mob(player);
            self.wanderers.push(fresh);
        }

        let hovered = self
            .wanderers
            .iter()
            .min_by(|a, b| {
                let da = a.snapshot.position.distance_squared(player);
                let db = b.snapshot.position.distance_squared(player);
                da.total_cmp(&db)
            })
            .filter(|w| w.snapshot.position.distance(player) < 4.0)
            .map(|w| Hovered {
                id: w.snapshot.id,
                class: w.snapshot.class,
            });

        let mut entities = Vec::with_capacity(self.wanderers.len() + 1);
        entities.push(self.local.clone());
        entities.extend(self.wanderers.iter().map(|w| w.snapshot.clone()));

        FrameSnapshot {
            camera: CameraPose {
                position: player + DVec3::new(0.0, 1.62, 0.0),
                yaw: self.yaw,
                pitch: 0.0,
            },
            partial_tick: self.rng.random_range(0.0..1.0),
            overlay_open: false,
            hovered,
            entities,
        }
    }

    fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn scatter(&mut self, around: DVec3) -> DVec3 {
        around
            + DVec3::new(
                self.rng.random_range(-LEASH..LEASH),
                0.0,
                self.rng.random_range(-LEASH..LEASH),
            )
    }

    fn spawn_player(&mut self, name: &str) -> Wanderer {
        let id = self.allocate_id();
        let position = self.scatter(DVec3::ZERO);
        let mut snapshot = EntitySnapshot::new(id, EntityClass::Player, "Player", position);
        snapshot.display_name = name.into();
        snapshot.ping = Some(self.rng.random_range(5..250));
        snapshot.absorption = if self.rng.random_bool(0.3) { 4.0 } else { 0.0 };
        snapshot.equipment[0] = Some(EquipmentSnapshot {
            item: "diamond_sword".into(),
            count: 1,
            durability: Some((1561, self.rng.random_range(0..1561))),
            enchantments: vec![
                ("minecraft:sharpness".into(), 5),
                ("minecraft:unbreaking".into(), 3),
            ],
        });
        snapshot.equipment[1] = Some(EquipmentSnapshot {
            item: "golden_apple".into(),
            count: self.rng.random_range(1..=64),
            durability: None,
            enchantments: Vec::new(),
        });
        snapshot.equipment[3] = Some(EquipmentSnapshot {
            item: "netherite_chestplate".into(),
            count: 1,
            durability: Some((592, 0)),
            enchantments: vec![("minecraft:protection".into(), 4)],
        });
        Wanderer {
            snapshot,
            velocity: DVec3::ZERO,
        }
    }

    fn spawn_mob(&mut self, around: DVec3) -> Wanderer {
        let id = self.allocate_id();
        let position = self.scatter(around);
        let snapshot = if self.rng.random_bool(0.8) {
            let kind = LIVING_TYPES[self.rng.random_range(0..LIVING_TYPES.len())];
            EntitySnapshot::new(id, EntityClass::Living, kind, position)
        } else {
            let kind = OTHER_TYPES[self.rng.random_range(0..OTHER_TYPES.len())];
            let mut other = EntitySnapshot::new(id, EntityClass::Other, kind, position);
            other.width = 0.25;
            other.height = 0.25;
            other
        };
        Wanderer {
            snapshot,
            velocity: DVec3::ZERO,
        }
    }
}
