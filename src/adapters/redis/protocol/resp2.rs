//! RESP2 protocol parser and encoder.
//!
//! RESP2 supports:
//! - Simple Strings (+)
//! - Errors (-)
//! - Integers (:)
//! - Bulk Strings ($)
//! - Arrays (*)
//! - Null (represented as $-1 or *-1)
//!
//! The parser reports how many bytes each value occupied so a reader can
//! split several pipelined replies out of one socket read.

use super::{ParseResult, MAX_ARRAY_LEN, MAX_BULK_LEN, MAX_DEPTH};
use crate::adapters::redis::{RedisError, RedisValue};
use bytes::Bytes;

/// RESP2 parser.
#[derive(Debug, Default)]
pub struct Resp2Parser {
    /// Current nesting depth.
    depth: usize,
}

impl Resp2Parser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one value from the front of the buffer.
    pub fn parse(&mut self, data: &[u8]) -> ParseResult {
        self.depth = 0;
        self.parse_value(data)
    }

    fn parse_value(&mut self, data: &[u8]) -> ParseResult {
        if data.is_empty() {
            return ParseResult::Incomplete;
        }

        if self.depth > MAX_DEPTH {
            return ParseResult::Error("maximum nesting depth exceeded".to_string());
        }

        match data[0] {
            b'+' => parse_line(data, |line| {
                Ok(RedisValue::SimpleString(
                    String::from_utf8_lossy(line).to_string(),
                ))
            }),
            b'-' => parse_line(data, |line| {
                let (kind, message) = parse_error_string(&String::from_utf8_lossy(line));
                Ok(RedisValue::Error(RedisError { kind, message }))
            }),
            b':' => parse_line(data, |line| {
                parse_i64(line)
                    .map(RedisValue::Integer)
                    .ok_or_else(|| "invalid integer".to_string())
            }),
            b'$' => self.parse_bulk_string(data),
            b'*' => self.parse_array(data),
            other => ParseResult::Error(format!("unexpected type byte 0x{:02x}", other)),
        }
    }

    /// Parse a bulk string ($6\r\nfoobar\r\n).
    fn parse_bulk_string(&self, data: &[u8]) -> ParseResult {
        let Some(len_pos) = find_crlf(&data[1..]) else {
            return ParseResult::Incomplete;
        };
        let header = len_pos + 3; // prefix + length + CRLF

        match parse_i64(&data[1..1 + len_pos]) {
            Some(-1) => ParseResult::Ok {
                value: RedisValue::Null,
                consumed: header,
            },
            Some(len) if len >= 0 => {
                let len = len as usize;
                if len > MAX_BULK_LEN {
                    return ParseResult::Error(format!(
                        "bulk string too large: {} > {}",
                        len, MAX_BULK_LEN
                    ));
                }

                let data_end = header + len;
                if data.len() < data_end + 2 {
                    // Need more data (including trailing CRLF)
                    return ParseResult::Incomplete;
                }

                if &data[data_end..data_end + 2] != b"\r\n" {
                    return ParseResult::Error("missing CRLF after bulk string".to_string());
                }

                ParseResult::Ok {
                    value: RedisValue::BulkString(Bytes::copy_from_slice(&data[header..data_end])),
                    consumed: data_end + 2,
                }
            }
            _ => ParseResult::Error("invalid bulk string length".to_string()),
        }
    }

    /// Parse an array (*2\r\n...).
    fn parse_array(&mut self, data: &[u8]) -> ParseResult {
        let Some(len_pos) = find_crlf(&data[1..]) else {
            return ParseResult::Incomplete;
        };
        let header = len_pos + 3;

        match parse_i64(&data[1..1 + len_pos]) {
            Some(-1) => ParseResult::Ok {
                value: RedisValue::Null,
                consumed: header,
            },
            Some(len) if len >= 0 => {
                let len = len as usize;
                if len > MAX_ARRAY_LEN {
                    return ParseResult::Error(format!(
                        "array too large: {} > {}",
                        len, MAX_ARRAY_LEN
                    ));
                }

                self.depth += 1;
                let mut elements = Vec::with_capacity(len.min(1024));
                let mut offset = header;

                for _ in 0..len {
                    match self.parse_value(&data[offset..]) {
                        ParseResult::Ok { value, consumed } => {
                            elements.push(value);
                            offset += consumed;
                        }
                        other => {
                            self.depth -= 1;
                            return other;
                        }
                    }
                }

                self.depth -= 1;
                ParseResult::Ok {
                    value: RedisValue::Array(elements),
                    consumed: offset,
                }
            }
            _ => ParseResult::Error("invalid array length".to_string()),
        }
    }
}

/// RESP2 encoder.
#[derive(Debug, Default)]
pub struct Resp2Encoder;

impl Resp2Encoder {
    /// Encode a value to bytes.
    pub fn encode(value: &RedisValue) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        Self::encode_into(value, &mut buf);
        buf
    }

    /// Encode a value into a buffer.
    pub fn encode_into(value: &RedisValue, buf: &mut Vec<u8>) {
        match value {
            RedisValue::SimpleString(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::Error(e) => {
                buf.push(b'-');
                buf.extend_from_slice(e.kind.as_bytes());
                buf.push(b' ');
                buf.extend_from_slice(e.message.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::BulkString(data) => {
                buf.push(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::Array(elements) => {
                buf.push(b'*');
                buf.extend_from_slice(elements.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for elem in elements {
                    Self::encode_into(elem, buf);
                }
            }
            RedisValue::Null => {
                buf.extend_from_slice(b"$-1\r\n");
            }
        }
    }
}

/// Parse a single-line value whose payload ends at the first CRLF.
fn parse_line<F>(data: &[u8], build: F) -> ParseResult
where
    F: FnOnce(&[u8]) -> Result<RedisValue, String>,
{
    match find_crlf(&data[1..]) {
        Some(pos) => match build(&data[1..1 + pos]) {
            Ok(value) => ParseResult::Ok {
                value,
                consumed: pos + 3,
            },
            Err(e) => ParseResult::Error(e),
        },
        None => ParseResult::Incomplete,
    }
}

/// Find CRLF in data, returning position of first \r.
fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn parse_i64(data: &[u8]) -> Option<i64> {
    std::str::from_utf8(data).ok()?.parse().ok()
}

/// Parse error string into kind and message.
fn parse_error_string(s: &str) -> (String, String) {
    if let Some(pos) = s.find(' ') {
        (s[..pos].to_string(), s[pos + 1..].to_string())
    } else {
        (s.to_string(), String::new())
    }
}
