//! Streaming RESP2 codec.
//!
//! Frames values onto a write buffer and splits complete frames off the
//! front of a read buffer, leaving partial frames in place until more bytes
//! arrive.

use super::{ParseResult, Resp2Encoder, Resp2Parser};
use crate::adapters::redis::{RedisCommand, RedisValue};
use bytes::{Buf, BytesMut};

/// Result of attempting to decode one frame.
#[derive(Debug)]
pub enum DecodeResult<T> {
    /// A full frame was decoded and consumed from the buffer.
    Complete(T),
    /// More data is needed; the buffer is untouched.
    Incomplete,
    /// The buffer holds malformed data.
    Invalid(String),
}

/// RESP2 codec shared by the client connection and test servers.
#[derive(Debug, Default)]
pub struct RespCodec {
    parser: Resp2Parser,
}

impl RespCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the wire form of `value` to `buf`.
    pub fn encode_value(&self, value: &RedisValue, buf: &mut BytesMut) {
        buf.extend_from_slice(&Resp2Encoder::encode(value));
    }

    /// Decode one value from the front of `buf`.
    ///
    /// On `Complete` the frame's bytes are consumed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> DecodeResult<RedisValue> {
        match self.parser.parse(&buf[..]) {
            ParseResult::Ok { value, consumed } => {
                buf.advance(consumed);
                DecodeResult::Complete(value)
            }
            ParseResult::Incomplete => DecodeResult::Incomplete,
            ParseResult::Error(e) => DecodeResult::Invalid(e),
        }
    }

    /// Decode one command (an array of bulk strings) from the front of `buf`.
    pub fn decode_command(&mut self, buf: &mut BytesMut) -> DecodeResult<RedisCommand> {
        match self.decode(buf) {
            DecodeResult::Complete(RedisValue::Array(items)) => {
                match RedisCommand::from_array(items) {
                    Ok(cmd) => DecodeResult::Complete(cmd),
                    Err(e) => DecodeResult::Invalid(e.to_string()),
                }
            }
            DecodeResult::Complete(_) => DecodeResult::Invalid("expected array".to_string()),
            DecodeResult::Incomplete => DecodeResult::Incomplete,
            DecodeResult::Invalid(e) => DecodeResult::Invalid(e),
        }
    }
}
