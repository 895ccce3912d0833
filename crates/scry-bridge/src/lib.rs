//! Host-facing side of the scry feed.
//!
//! A [`Bridge`] ties the pieces together: overlay commands update
//! [`SharedSettings`] and the scan worker's watch list, host events feed the
//! scan worker, and render frames go to the entity broadcaster. It replaces
//! process-wide singletons with one explicit handle the host owns.

pub mod bridge;
pub mod commands;
pub mod error;
pub mod settings;

pub use bridge::{Bridge, ConnectionListener};
pub use commands::{Followup, apply};
pub use error::BridgeError;
pub use settings::{
    EntityFilterSettings, Hotkeys, MODULE_ESP, ModuleStates, PLAYER_MODULES, SharedSettings,
};
