//! Entity telemetry: snapshots from the host, the inclusion policy, the mob
//! send cache, frame building and the rate-limited broadcaster.

pub mod broadcaster;
pub mod cache;
pub mod enchantments;
pub mod frame;
pub mod policy;
pub mod snapshot;

pub use broadcaster::{BroadcastSettings, EntityBroadcaster, FieldOfView, FixedFov, FrameOutcome};
pub use cache::MobSendCache;
pub use enchantments::abbreviate;
pub use frame::{build_frame, frame_header, select};
pub use policy::{Category, InclusionPolicy};
pub use snapshot::{
    CameraPose, EntityClass, EntitySnapshot, EquipmentSnapshot, FrameSnapshot, Hovered,
};
