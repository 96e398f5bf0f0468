//! Redis RESP2 client adapter.
//!
//! The probe talks to both stores over plain RESP2. Only the handful of
//! commands the probe needs are modelled (`AUTH`, `SELECT`, `PING`,
//! `SET .. EX`, `GET`), but the value type covers every RESP2 reply so
//! unexpected frames are reported instead of desynchronising the stream.
//!
//! ```text
//!  RedisClient handle ──mpsc──▶ writer task ──▶ TcpStream (write half)
//!        ▲                          │ push reply slot
//!        │ oneshot                  ▼
//!        └──────────────────── reader task ◀── TcpStream (read half)
//! ```

pub mod client;
pub mod protocol;
pub mod store;

use bytes::Bytes;

pub use client::{ConnectOptions, RedisClient};

/// Redis value type (RESP2 type system).
#[derive(Debug, Clone, PartialEq)]
pub enum RedisValue {
    /// Simple string (+OK\r\n)
    SimpleString(String),

    /// Error (-ERR message\r\n)
    Error(RedisError),

    /// Integer (:1000\r\n)
    Integer(i64),

    /// Bulk string ($6\r\nfoobar\r\n)
    BulkString(Bytes),

    /// Array (*2\r\n...)
    Array(Vec<RedisValue>),

    /// Null ($-1\r\n or *-1\r\n)
    Null,
}

impl RedisValue {
    /// Create an OK reply.
    pub fn ok() -> Self {
        Self::SimpleString("OK".to_string())
    }

    /// Create an error reply.
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(RedisError::new(kind, message))
    }

    /// Create a bulk string from a string.
    pub fn bulk_string(s: impl AsRef<str>) -> Self {
        Self::BulkString(Bytes::copy_from_slice(s.as_ref().as_bytes()))
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this value is the `+OK` status.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::SimpleString(s) if s == "OK")
    }

    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::SimpleString(s) => Some(s),
            Self::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Convert an error reply into `Err`, passing every other value through.
    pub fn into_result(self) -> Result<RedisValue, RedisError> {
        match self {
            Self::Error(e) => Err(e),
            other => Ok(other),
        }
    }
}

/// Redis error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisError {
    /// Error kind (ERR, WRONGPASS, NOAUTH, etc.)
    pub kind: String,
    /// Error message.
    pub message: String,
}

impl RedisError {
    /// Create a new error.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a generic error.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new("ERR", message)
    }

    /// Check if the server rejected or demanded a credential.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.kind.as_str(), "WRONGPASS" | "NOAUTH" | "NOPERM")
            || self.message.contains("invalid password")
    }
}

impl std::fmt::Display for RedisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.message)
    }
}

impl std::error::Error for RedisError {}

/// Redis command sent by the client.
#[derive(Debug, Clone)]
pub struct RedisCommand {
    /// Command name (uppercase).
    pub name: String,

    /// Command arguments.
    pub args: Vec<Bytes>,
}

impl RedisCommand {
    /// Create a new command.
    pub fn new(name: impl Into<String>, args: Vec<Bytes>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            args,
        }
    }

    /// `AUTH [username] password`
    pub fn auth(username: Option<&str>, password: &str) -> Self {
        let mut args = Vec::with_capacity(2);
        if let Some(username) = username {
            args.push(Bytes::copy_from_slice(username.as_bytes()));
        }
        args.push(Bytes::copy_from_slice(password.as_bytes()));
        Self::new("AUTH", args)
    }

    /// `SELECT db`
    pub fn select(database: u32) -> Self {
        Self::new("SELECT", vec![Bytes::from(database.to_string())])
    }

    /// `PING`
    pub fn ping() -> Self {
        Self::new("PING", vec![])
    }

    /// `SET key value EX seconds`
    pub fn set_ex(key: &str, value: &str, ttl_seconds: u64) -> Self {
        Self::new(
            "SET",
            vec![
                Bytes::copy_from_slice(key.as_bytes()),
                Bytes::copy_from_slice(value.as_bytes()),
                Bytes::from_static(b"EX"),
                Bytes::from(ttl_seconds.to_string()),
            ],
        )
    }

    /// `GET key`
    pub fn get(key: &str) -> Self {
        Self::new("GET", vec![Bytes::copy_from_slice(key.as_bytes())])
    }

    /// Get argument count.
    pub fn argc(&self) -> usize {
        self.args.len()
    }

    /// Convert to the RESP array sent on the wire.
    pub fn to_value(&self) -> RedisValue {
        let mut items = Vec::with_capacity(self.args.len() + 1);
        items.push(RedisValue::bulk_string(&self.name));
        items.extend(self.args.iter().cloned().map(RedisValue::BulkString));
        RedisValue::Array(items)
    }

    /// Parse from a RESP array (used by test servers).
    pub fn from_array(values: Vec<RedisValue>) -> Result<Self, RedisError> {
        let mut values = values.into_iter();
        let name = match values.next() {
            Some(RedisValue::BulkString(b)) => String::from_utf8(b.to_vec())
                .map_err(|_| RedisError::generic("syntax error"))?,
            Some(RedisValue::SimpleString(s)) => s,
            _ => return Err(RedisError::generic("syntax error")),
        };

        let args = values
            .map(|v| match v {
                RedisValue::BulkString(b) => Ok(b),
                RedisValue::SimpleString(s) => Ok(Bytes::from(s)),
                RedisValue::Integer(n) => Ok(Bytes::from(n.to_string())),
                _ => Err(RedisError::generic("syntax error")),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(name, args))
    }

    /// Get an argument as a string.
    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.args
            .get(index)
            .and_then(|b| std::str::from_utf8(b).ok())
    }
}
