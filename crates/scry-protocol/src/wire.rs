//! Primitive encoding shared by every message.
//!
//! ```text
//! +-------------------+----------------------+
//! | tag (4 bytes)     |   payload            |
//! | u32 big-endian    |   (tag specific)     |
//! +-------------------+----------------------+
//! ```
//!
//! Integers and floats are big-endian. Booleans are one byte, any non-zero
//! value reads as `true`. Strings are an `i32` byte length followed by UTF-8.

use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bounds applied while decoding, so a corrupt length cannot make a
/// reader allocate gigabytes.
#[derive(Debug, Clone, Copy)]
pub struct WireLimits {
    /// Longest accepted string in bytes. Default: 32 767.
    pub max_string_len: usize,
    /// Most records in one entity frame. Default: 100 000.
    pub max_entities: usize,
    /// Most records in one block diff. Default: 1 000 000.
    pub max_block_records: usize,
    /// Most enchantments on one item. Default: 100.
    pub max_enchantments: usize,
    /// Most entries in any inbound list. Default: 65 536.
    pub max_list_len: usize,
}

impl Default for WireLimits {
    fn default() -> Self {
        Self {
            max_string_len: 32_767,
            max_entities: 100_000,
            max_block_records: 1_000_000,
            max_enchantments: 100,
            max_list_len: 65_536,
        }
    }
}

/// Errors produced while decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The peer closed the stream, either between messages or mid-message.
    #[error("connection closed")]
    ConnectionClosed,

    /// The tag is not part of the protocol in this direction.
    #[error("unknown message tag {0:#010x}")]
    UnknownTag(u32),

    /// A length or count field was negative or above its limit.
    #[error("{what} length {len} out of range (max {max})")]
    LengthOutOfRange {
        /// Which field was out of range.
        what: &'static str,
        /// The decoded value.
        len: i64,
        /// The configured limit.
        max: usize,
    },

    /// A record kind or op byte that the protocol does not define.
    #[error("invalid {what} byte {value}")]
    InvalidDiscriminant {
        /// Which field was invalid.
        what: &'static str,
        /// The decoded byte.
        value: u8,
    },

    /// A string field was not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// An I/O error other than end-of-stream.
    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::ConnectionClosed
        } else {
            ProtocolError::Io(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Write a length-prefixed UTF-8 string.
pub fn put_string<B: BufMut>(buf: &mut B, value: &str) {
    buf.put_i32(value.len() as i32);
    buf.put_slice(value.as_bytes());
}

/// Write a one-byte boolean.
pub fn put_bool<B: BufMut>(buf: &mut B, value: bool) {
    buf.put_u8(u8::from(value));
}

/// Encoded size of a length-prefixed string.
pub fn string_len(value: &str) -> usize {
    4 + value.len()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Read a one-byte boolean.
pub async fn read_bool<R: AsyncRead + Unpin>(reader: &mut R) -> Result<bool, ProtocolError> {
    Ok(reader.read_u8().await? != 0)
}

/// Read an `i32` count and check it against `max`.
pub async fn read_count<R: AsyncRead + Unpin>(
    reader: &mut R,
    what: &'static str,
    max: usize,
) -> Result<usize, ProtocolError> {
    let raw = reader.read_i32().await?;
    if raw < 0 || raw as usize > max {
        return Err(ProtocolError::LengthOutOfRange {
            what,
            len: i64::from(raw),
            max,
        });
    }
    Ok(raw as usize)
}

/// Read a length-prefixed UTF-8 string.
pub async fn read_string<R: AsyncRead + Unpin>(
    reader: &mut R,
    limits: &WireLimits,
) -> Result<String, ProtocolError> {
    let len = read_count(reader, "string", limits.max_string_len).await?;
    let mut bytes = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut bytes).await?;
    }
    Ok(String::from_utf8(bytes)?)
}
