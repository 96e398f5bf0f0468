//! RESP2 framing.
//!
//! The client only ever writes commands (arrays of bulk strings) and reads
//! replies, so RESP2 is all that is spoken. Limits below bound what a
//! misbehaving server can make the reader buffer.

pub mod codec;
pub mod resp2;

pub use codec::{DecodeResult, RespCodec};
pub use resp2::{Resp2Encoder, Resp2Parser};

use super::RedisValue;

/// Deepest array nesting accepted in a reply.
pub const MAX_DEPTH: usize = 32;

/// Largest bulk string accepted (512MB, the server-side limit).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest array accepted.
pub const MAX_ARRAY_LEN: usize = 1_000_000;

/// Outcome of parsing one frame from the front of a buffer.
#[derive(Debug)]
pub enum ParseResult {
    /// A value that occupied `consumed` bytes.
    Ok { value: RedisValue, consumed: usize },
    /// The frame is not complete yet.
    Incomplete,
    /// The bytes are not valid RESP2.
    Error(String),
}
