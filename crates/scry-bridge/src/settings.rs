//! Settings the overlay controls: module flags, the entity filter, watched
//! hotkeys and the last block watch list.
//!
//! Everything here is read from the host's render and tick threads and
//! written from connection reader tasks, so each field is independently
//! thread safe. Nothing needs atomicity across fields.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use scry_entities::InclusionPolicy;

/// Module gating the non-player entity layers.
pub const MODULE_ESP: &str = "ESP";
/// Modules that enable the player layer; either one is enough.
pub const PLAYER_MODULES: [&str; 2] = ["PlayerESP", "Nametags"];

// ---------------------------------------------------------------------------
// Module states
// ---------------------------------------------------------------------------

/// Module name to enabled flag.
#[derive(Debug)]
pub struct ModuleStates {
    states: DashMap<String, bool>,
    unknown_default: bool,
}

impl ModuleStates {
    /// `unknown_default` answers for names never set.
    pub fn new(unknown_default: bool) -> Self {
        Self {
            states: DashMap::new(),
            unknown_default,
        }
    }

    /// Whether `name` is enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.states
            .get(name)
            .map_or(self.unknown_default, |enabled| *enabled)
    }

    /// Set one flag.
    pub fn set(&self, name: impl Into<String>, enabled: bool) {
        self.states.insert(name.into(), enabled);
    }

    /// Apply a batch in order; later entries win.
    pub fn apply<I>(&self, batch: I)
    where
        I: IntoIterator<Item = (String, bool)>,
    {
        for (name, enabled) in batch {
            self.states.insert(name, enabled);
        }
    }

    /// Forget every flag.
    pub fn clear(&self) {
        self.states.clear();
    }

    /// Sorted copy of the explicit flags.
    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.states
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Entity filter
// ---------------------------------------------------------------------------

/// Overlay-controlled entity filter.
#[derive(Debug)]
pub struct EntityFilterSettings {
    generic: AtomicBool,
    all: AtomicBool,
    names: RwLock<Arc<FxHashSet<String>>>,
}

impl Default for EntityFilterSettings {
    fn default() -> Self {
        Self {
            generic: AtomicBool::new(true),
            all: AtomicBool::new(false),
            names: RwLock::new(Arc::default()),
        }
    }
}

impl EntityFilterSettings {
    /// Replace the whole filter.
    pub fn update(&self, generic: bool, all: bool, names: Vec<String>) {
        *self.names.write() = Arc::new(names.into_iter().collect());
        self.generic.store(generic, Ordering::Release);
        self.all.store(all, Ordering::Release);
    }

    /// Show generic living entities.
    pub fn generic(&self) -> bool {
        self.generic.load(Ordering::Acquire)
    }

    /// Show every entity.
    pub fn all(&self) -> bool {
        self.all.load(Ordering::Acquire)
    }

    /// Current specific-name set.
    pub fn names(&self) -> Arc<FxHashSet<String>> {
        Arc::clone(&self.names.read())
    }
}

// ---------------------------------------------------------------------------
// Hotkeys
// ---------------------------------------------------------------------------

/// Watched key codes with rising-edge detection.
#[derive(Debug, Default)]
pub struct Hotkeys {
    watched: RwLock<Vec<i32>>,
    pressed: Mutex<FxHashSet<i32>>,
}

impl Hotkeys {
    /// Replace the watched set. Keys no longer watched lose their pressed state.
    pub fn replace(&self, keys: Vec<i32>) {
        let mut keys = keys;
        keys.sort_unstable();
        keys.dedup();
        self.pressed
            .lock()
            .retain(|key| keys.binary_search(key).is_ok());
        *self.watched.write() = keys;
    }

    /// Watched keys, sorted.
    pub fn watched(&self) -> Vec<i32> {
        self.watched.read().clone()
    }

    /// Sample every watched key and return those that went down since the
    /// previous poll. When the game does not have input focus the pressed
    /// state is reset and nothing fires.
    pub fn poll(&self, input_focused: bool, is_down: impl Fn(i32) -> bool) -> Vec<i32> {
        let mut pressed = self.pressed.lock();
        if !input_focused {
            pressed.clear();
            return Vec::new();
        }

        let mut fired = Vec::new();
        for &key in self.watched.read().iter() {
            if is_down(key) {
                if pressed.insert(key) {
                    fired.push(key);
                }
            } else {
                pressed.remove(&key);
            }
        }
        fired
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// All overlay-controlled settings.
#[derive(Debug)]
pub struct SharedSettings {
    /// Module flags.
    pub modules: ModuleStates,
    /// Entity filter.
    pub filter: EntityFilterSettings,
    /// Watched hotkeys.
    pub hotkeys: Hotkeys,
    /// Last watch list handed to the scan worker, replayed when the feed
    /// restarts. Written by the bridge only.
    pub watch_list: RwLock<Vec<String>>,
}

impl SharedSettings {
    /// Empty settings with the given unknown-module policy.
    pub fn new(unknown_module_default: bool) -> Self {
        Self {
            modules: ModuleStates::new(unknown_module_default),
            filter: EntityFilterSettings::default(),
            hotkeys: Hotkeys::default(),
            watch_list: RwLock::new(Vec::new()),
        }
    }

    /// Inclusion policy for the current flags and filter.
    pub fn inclusion_policy(&self) -> InclusionPolicy {
        let esp = self.modules.is_enabled(MODULE_ESP);
        let players = PLAYER_MODULES
            .iter()
            .any(|name| self.modules.is_enabled(name));
        InclusionPolicy::gated(
            esp,
            players,
            self.filter.generic(),
            self.filter.all(),
            self.filter.names(),
        )
    }
}
