//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use bytes::BytesMut;
use parking_lot::Mutex;
use replica_probe::adapters::redis::protocol::{DecodeResult, RespCodec};
use replica_probe::adapters::redis::{RedisCommand, RedisValue};
use replica_probe::{ConnectOptions, RawRecord};
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

/// Write `content` to a temporary config file.
pub fn create_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Well-formed records with the given identifiers.
pub fn records(ids: &[&str]) -> Vec<RawRecord> {
    ids.iter()
        .map(|id| RawRecord::new(*id, format!("fact about {}", id)))
        .collect()
}

/// `n` well-formed records `id0..id{n-1}`.
pub fn numbered_records(n: usize) -> Vec<RawRecord> {
    (0..n)
        .map(|i| RawRecord::new(format!("id{}", i), format!("fact {}", i)))
        .collect()
}

/// Keyspace shared by one or more fake servers.
///
/// Two servers started on the same state behave like a primary with a
/// perfectly synchronous replica.
#[derive(Clone, Default)]
pub struct FakeState {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeState {
    /// Live value for `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(value, _)| value.clone())
    }

    /// Store `key` directly, bypassing the protocol.
    pub fn insert(&self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Every command received, rendered as `NAME arg0 arg1 ...`.
    pub fn command_log(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    fn record(&self, command: &RedisCommand) {
        let mut line = command.name.clone();
        for i in 0..command.argc() {
            line.push(' ');
            line.push_str(command.arg_str(i).unwrap_or("?"));
        }
        self.commands.lock().push(line);
    }
}

/// Minimal RESP2 server: AUTH, PING, SELECT, SET .. EX, GET.
pub struct FakeRedis {
    pub addr: SocketAddr,
    pub state: FakeState,
}

impl FakeRedis {
    /// Start a server with its own keyspace.
    pub async fn start(password: &str) -> Self {
        Self::start_with_state(password, FakeState::default()).await
    }

    /// Start a server over an existing keyspace.
    pub async fn start_with_state(password: &str, state: FakeState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let password: Arc<str> = Arc::from(password);

        let served = state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, password.clone(), served.clone()));
            }
        });

        Self { addr, state }
    }

    /// Connect options for this server.
    pub fn options(&self, password: &str) -> ConnectOptions {
        ConnectOptions::new(self.addr.ip().to_string(), self.addr.port()).with_password(password)
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }
}

async fn serve(mut socket: TcpStream, password: Arc<str>, state: FakeState) {
    let mut codec = RespCodec::new();
    let mut buf = BytesMut::new();
    let mut authenticated = false;

    loop {
        match codec.decode_command(&mut buf) {
            DecodeResult::Complete(command) => {
                state.record(&command);
                let reply = handle(&command, &password, &mut authenticated, &state);
                let mut out = BytesMut::new();
                codec.encode_value(&reply, &mut out);
                if socket.write_all(&out).await.is_err() {
                    return;
                }
            }
            DecodeResult::Incomplete => match socket.read_buf(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            },
            DecodeResult::Invalid(_) => return,
        }
    }
}

fn handle(
    command: &RedisCommand,
    password: &str,
    authenticated: &mut bool,
    state: &FakeState,
) -> RedisValue {
    if command.name == "AUTH" {
        let supplied = command.arg_str(command.argc().saturating_sub(1));
        return if supplied == Some(password) {
            *authenticated = true;
            RedisValue::ok()
        } else {
            RedisValue::error(
                "WRONGPASS",
                "invalid username-password pair or user is disabled.",
            )
        };
    }
    if !*authenticated {
        return RedisValue::error("NOAUTH", "Authentication required.");
    }

    match command.name.as_str() {
        "PING" => RedisValue::SimpleString("PONG".to_string()),
        "SELECT" => RedisValue::ok(),
        "SET" => {
            let (Some(key), Some(value)) = (command.arg_str(0), command.arg_str(1)) else {
                return RedisValue::error("ERR", "wrong number of arguments for 'set' command");
            };
            let ttl = match (command.arg_str(2), command.arg_str(3)) {
                (Some(ex), Some(secs)) if ex.eq_ignore_ascii_case("EX") => {
                    match secs.parse::<u64>() {
                        Ok(secs) if secs > 0 => Duration::from_secs(secs),
                        _ => return RedisValue::error("ERR", "invalid expire time in 'set' command"),
                    }
                }
                _ => Duration::from_secs(u32::MAX as u64),
            };
            state.insert(key, value, ttl);
            RedisValue::ok()
        }
        "GET" => match command.arg_str(0).and_then(|key| state.get(key)) {
            Some(value) => RedisValue::bulk_string(value),
            None => RedisValue::Null,
        },
        other => RedisValue::error("ERR", format!("unknown command '{}'", other)),
    }
}
