//! Which entities make it into a frame.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::snapshot::{EntityClass, EntitySnapshot};

/// Why an entity was included. Exactly one category applies per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// A player, with player tracking enabled.
    Player,
    /// Its type name is in the specific-name set.
    Specific,
    /// A non-player living entity, with generic mobs enabled.
    Generic,
    /// Shown because every entity is.
    Any,
}

/// Layered, first-match-wins inclusion rules.
///
/// Built once per frame from the current module states and entity filter.
#[derive(Debug, Clone, Default)]
pub struct InclusionPolicy {
    /// Include players.
    pub players: bool,
    /// Type names always included. Empty disables the layer.
    pub specific: Arc<FxHashSet<String>>,
    /// Include non-player living entities.
    pub generic: bool,
    /// Include everything else.
    pub all: bool,
}

impl InclusionPolicy {
    /// Apply the module gates: the player layer follows `players_enabled`,
    /// the other three layers require `esp_enabled`.
    pub fn gated(
        esp_enabled: bool,
        players_enabled: bool,
        generic: bool,
        all: bool,
        specific: Arc<FxHashSet<String>>,
    ) -> Self {
        Self {
            players: players_enabled,
            specific: if esp_enabled { specific } else { Arc::default() },
            generic: esp_enabled && generic,
            all: esp_enabled && all,
        }
    }

    /// Whether no entity can pass.
    pub fn excludes_everything(&self) -> bool {
        !self.players && self.specific.is_empty() && !self.generic && !self.all
    }

    /// Category for `entity`, or `None` when it is excluded.
    pub fn classify(&self, entity: &EntitySnapshot) -> Option<Category> {
        if entity.is_local {
            return None;
        }
        if entity.class == EntityClass::Player && self.players {
            return Some(Category::Player);
        }
        if self.specific.contains(&entity.type_name) {
            return Some(Category::Specific);
        }
        if self.generic && entity.class == EntityClass::Living {
            return Some(Category::Generic);
        }
        self.all.then_some(Category::Any)
    }
}
