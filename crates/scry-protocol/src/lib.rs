//! Wire protocol between the game-side feed and the overlay consumer.
//!
//! Every message is a 4-byte big-endian tag followed by a tag-specific
//! payload. There is no length prefix: a reader must understand every tag it
//! receives, and any malformed read is fatal to that connection.

pub mod decode;
pub mod messages;
pub mod sink;
pub mod tags;
pub mod wire;

pub use decode::{read_client_message, read_server_message};
pub use messages::{
    BlockDiff, BlockRecord, ClientMessage, EQUIPMENT_SLOTS, EnchantmentTag, EntityDetails,
    EntityFrame, EntityRecord, FrameHeader, FullRecordKind, ItemSlot, ServerMessage,
};
pub use sink::{MessageSink, RecordingSink};
pub use wire::{ProtocolError, WireLimits};
