//! Pipelined RESP2 connection.
//!
//! A [`RedisClient`] is a cheap handle onto one TCP connection driven by two
//! tasks. Requests are queued on an unbounded channel in call order; the
//! writer task coalesces whatever is queued into a single socket write and
//! registers one reply slot per request; the reader task resolves slots in
//! FIFO order as replies arrive. Nothing waits for a reply unless the caller
//! awaits the receiver returned by [`RedisClient::dispatch`].
//!
//! Once the connection fails every outstanding and future request resolves to
//! `ConnectionClosed` instead of hanging.

use super::protocol::{DecodeResult, Resp2Encoder, RespCodec};
use super::{RedisCommand, RedisValue};
use crate::core::config::StoreEndpointConfig;
use crate::core::error::{ProbeError, ProbeResult};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Upper bound on bytes coalesced into one socket write.
const MAX_WRITE_BATCH: usize = 64 * 1024;

/// Initial read buffer capacity.
const READ_BUFFER_CAPACITY: usize = 16 * 1024;

/// Receiver for one reply.
pub type ReplyReceiver = oneshot::Receiver<ProbeResult<RedisValue>>;

type ReplySlot = oneshot::Sender<ProbeResult<RedisValue>>;

/// Settings used to open and prepare a connection.
#[derive(Clone)]
pub struct ConnectOptions {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// ACL username sent with `AUTH`.
    pub username: Option<String>,
    /// Password sent with `AUTH`. No `AUTH` when unset.
    pub password: Option<String>,
    /// Database selected after authenticating (0 skips `SELECT`).
    pub database: u32,
    /// Limit on TCP connection establishment.
    pub connect_timeout: Duration,
}

impl ConnectOptions {
    /// Options for `host:port` with no credential.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            database: 0,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Options for a configured endpoint using the shared credential.
    pub fn from_endpoint(endpoint: &StoreEndpointConfig, password: &str) -> Self {
        Self {
            host: endpoint.host.clone(),
            port: endpoint.port,
            username: endpoint.username.clone(),
            password: Some(password.to_string()),
            database: endpoint.database,
            connect_timeout: endpoint.connect_timeout(),
        }
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// `host:port` address string.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Connection statistics.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Commands written to the socket.
    pub commands_sent: AtomicU64,
    /// Replies matched to a request.
    pub replies_received: AtomicU64,
    /// Replies that were RESP errors.
    pub error_replies: AtomicU64,
    /// Bytes written.
    pub bytes_sent: AtomicU64,
    /// Bytes read.
    pub bytes_received: AtomicU64,
}

impl ConnectionStats {
    fn command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn reply_received(&self, is_error: bool) {
        self.replies_received.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.error_replies.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Requests written but not yet answered.
    pub fn outstanding(&self) -> u64 {
        self.commands_sent
            .load(Ordering::Relaxed)
            .saturating_sub(self.replies_received.load(Ordering::Relaxed))
    }
}

struct Request {
    frame: Bytes,
    reply: ReplySlot,
}

/// Reply slots in wire order, plus the terminal flag.
///
/// Both live under one lock so a slot can never be registered after the
/// reader has drained the queue on shutdown.
#[derive(Default)]
struct Inflight {
    closed: bool,
    slots: VecDeque<ReplySlot>,
}

impl Inflight {
    fn fail_all(&mut self, make_error: impl Fn() -> ProbeError) {
        self.closed = true;
        for slot in self.slots.drain(..) {
            let _ = slot.send(Err(make_error()));
        }
    }
}

/// Handle onto a pipelined RESP2 connection.
#[derive(Clone)]
pub struct RedisClient {
    endpoint: Arc<str>,
    requests: mpsc::UnboundedSender<Request>,
    stats: Arc<ConnectionStats>,
}

impl RedisClient {
    /// Connect, authenticate, select the database and check liveness.
    pub async fn connect(options: &ConnectOptions) -> ProbeResult<Self> {
        let endpoint = options.address();
        let stream = tokio::time::timeout(options.connect_timeout, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| ProbeError::Connection {
                endpoint: endpoint.clone(),
                message: format!("timed out after {:?}", options.connect_timeout),
            })?
            .map_err(|e| ProbeError::Connection {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(endpoint = %endpoint, error = %e, "failed to set TCP_NODELAY");
        }

        let client = Self::from_stream(stream, endpoint.clone());

        if let Some(ref password) = options.password {
            let auth = RedisCommand::auth(options.username.as_deref(), password);
            match client.request(&auth).await {
                Ok(_) => {}
                Err(ProbeError::Server(source)) => {
                    return Err(ProbeError::Authentication { endpoint, source });
                }
                Err(e) => return Err(e),
            }
        }

        if options.database != 0 {
            client.request(&RedisCommand::select(options.database)).await?;
        }

        client.ping().await?;
        info!(endpoint = %endpoint, database = options.database, "connected");
        Ok(client)
    }

    /// Drive an already-open stream. Must be called inside a tokio runtime.
    pub fn from_stream(stream: TcpStream, endpoint: impl Into<String>) -> Self {
        let endpoint: Arc<str> = Arc::from(endpoint.into());
        let (reader, writer) = stream.into_split();
        let (requests, queue) = mpsc::unbounded_channel();
        let inflight = Arc::new(Mutex::new(Inflight::default()));
        let stats = Arc::new(ConnectionStats::default());

        tokio::spawn(write_loop(
            writer,
            queue,
            inflight.clone(),
            stats.clone(),
            endpoint.clone(),
        ));
        tokio::spawn(read_loop(reader, inflight, stats.clone(), endpoint.clone()));

        Self {
            endpoint,
            requests,
            stats,
        }
    }

    /// `host:port` this client is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Connection statistics.
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Queue `command` and return the receiver for its reply.
    ///
    /// The command is on the connection's queue when this returns, so
    /// commands dispatched from one task reach the wire in call order whether
    /// or not anyone awaits the receiver.
    pub fn dispatch(&self, command: &RedisCommand) -> ReplyReceiver {
        let (reply, receiver) = oneshot::channel();
        let frame = Bytes::from(Resp2Encoder::encode(&command.to_value()));
        // A send error means the writer is gone; dropping the slot makes the
        // receiver resolve to ConnectionClosed.
        let _ = self.requests.send(Request { frame, reply });
        receiver
    }

    /// Dispatch `command` and wait for its reply.
    ///
    /// RESP error replies become `ProbeError::Server`.
    pub async fn request(&self, command: &RedisCommand) -> ProbeResult<RedisValue> {
        let receiver = self.dispatch(command);
        self.wait_reply(receiver).await
    }

    /// Wait on a receiver obtained from [`dispatch`](Self::dispatch).
    pub async fn wait_reply(&self, receiver: ReplyReceiver) -> ProbeResult<RedisValue> {
        wait_reply(&self.endpoint, receiver).await
    }

    /// `PING`, expecting `+PONG`.
    pub async fn ping(&self) -> ProbeResult<()> {
        match self.request(&RedisCommand::ping()).await? {
            RedisValue::SimpleString(s) if s == "PONG" => Ok(()),
            other => Err(ProbeError::protocol(format!(
                "unexpected PING reply: {:?}",
                other
            ))),
        }
    }
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

pub(crate) async fn wait_reply(endpoint: &str, receiver: ReplyReceiver) -> ProbeResult<RedisValue> {
    let reply = receiver.await.map_err(|_| ProbeError::closed(endpoint))??;
    Ok(reply.into_result()?)
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<Request>,
    inflight: Arc<Mutex<Inflight>>,
    stats: Arc<ConnectionStats>,
    endpoint: Arc<str>,
) {
    let mut buf = BytesMut::with_capacity(MAX_WRITE_BATCH);

    while let Some(first) = queue.recv().await {
        let mut next = Some(first);
        while let Some(request) = next.take() {
            {
                let mut inflight = inflight.lock();
                if inflight.closed {
                    let _ = request.reply.send(Err(ProbeError::closed(&*endpoint)));
                } else {
                    buf.extend_from_slice(&request.frame);
                    inflight.slots.push_back(request.reply);
                    stats.command_sent();
                }
            }
            if buf.len() >= MAX_WRITE_BATCH {
                break;
            }
            next = queue.try_recv().ok();
        }

        if buf.is_empty() {
            continue;
        }

        if let Err(e) = writer.write_all(&buf).await {
            warn!(endpoint = %endpoint, error = %e, "write failed, closing connection");
            inflight.lock().fail_all(|| ProbeError::closed(&*endpoint));
            return;
        }
        stats.record_sent(buf.len());
        buf.clear();
    }

    // Every handle was dropped.
    let _ = writer.shutdown().await;
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    inflight: Arc<Mutex<Inflight>>,
    stats: Arc<ConnectionStats>,
    endpoint: Arc<str>,
) {
    let mut codec = RespCodec::new();
    let mut buf = BytesMut::with_capacity(READ_BUFFER_CAPACITY);

    loop {
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                debug!(endpoint = %endpoint, "connection closed by peer");
                break;
            }
            Ok(n) => stats.record_received(n),
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "read failed");
                break;
            }
        }

        loop {
            match codec.decode(&mut buf) {
                DecodeResult::Complete(value) => {
                    let is_error = matches!(value, RedisValue::Error(_));
                    if let RedisValue::Error(ref e) = value {
                        debug!(endpoint = %endpoint, error = %e, "error reply");
                    }
                    stats.reply_received(is_error);
                    match inflight.lock().slots.pop_front() {
                        // The receiver may be gone (fire-and-forget write).
                        Some(slot) => {
                            let _ = slot.send(Ok(value));
                        }
                        None => warn!(endpoint = %endpoint, "reply without a pending request"),
                    }
                }
                DecodeResult::Incomplete => break,
                DecodeResult::Invalid(e) => {
                    warn!(endpoint = %endpoint, error = %e, "malformed reply, closing connection");
                    inflight
                        .lock()
                        .fail_all(|| ProbeError::protocol(format!("malformed reply: {}", e)));
                    return;
                }
            }
        }
    }

    inflight.lock().fail_all(|| ProbeError::closed(&*endpoint));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one connection and answer each canned reply after reading one
    /// request's worth of bytes.
    async fn canned_server(replies: Vec<&'static [u8]>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut codec = RespCodec::new();
            let mut buf = BytesMut::new();
            let mut replies = replies.into_iter();
            loop {
                match codec.decode_command(&mut buf) {
                    DecodeResult::Complete(_) => match replies.next() {
                        Some(reply) => socket.write_all(reply).await.unwrap(),
                        None => return,
                    },
                    DecodeResult::Incomplete => {
                        if socket.read_buf(&mut buf).await.unwrap() == 0 {
                            return;
                        }
                    }
                    DecodeResult::Invalid(e) => panic!("bad request: {}", e),
                }
            }
        });
        addr
    }

    async fn client_for(addr: &str) -> RedisClient {
        let stream = TcpStream::connect(addr).await.unwrap();
        RedisClient::from_stream(stream, addr)
    }

    #[tokio::test]
    async fn test_replies_matched_in_order() {
        let addr = canned_server(vec![&b"+OK\r\n"[..], &b"$5\r\nhello\r\n"[..], &b"$-1\r\n"[..]]).await;
        let client = client_for(&addr).await;

        let first = client.dispatch(&RedisCommand::set_ex("k", "hello", 10));
        let second = client.dispatch(&RedisCommand::get("k"));
        let third = client.dispatch(&RedisCommand::get("missing"));

        assert!(client.wait_reply(first).await.unwrap().is_ok());
        assert_eq!(
            client.wait_reply(second).await.unwrap().as_str(),
            Some("hello")
        );
        assert!(client.wait_reply(third).await.unwrap().is_null());
        assert_eq!(client.stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_error_reply_is_server_error() {
        let addr = canned_server(vec![&b"-ERR unknown command\r\n"[..]]).await;
        let client = client_for(&addr).await;

        let err = client.request(&RedisCommand::ping()).await.unwrap_err();
        assert!(matches!(err, ProbeError::Server(ref e) if e.kind == "ERR"));
        assert_eq!(client.stats().error_replies.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_desync() {
        let addr = canned_server(vec![&b"+OK\r\n"[..], &b"$1\r\nv\r\n"[..]]).await;
        let client = client_for(&addr).await;

        drop(client.dispatch(&RedisCommand::set_ex("k", "v", 10)));
        let value = client.request(&RedisCommand::get("k")).await.unwrap();
        assert_eq!(value.as_str(), Some("v"));
    }

    #[tokio::test]
    async fn test_closed_connection_fails_pending_and_future() {
        // Server answers nothing and hangs up after the first request.
        let addr = canned_server(vec![]).await;
        let client = client_for(&addr).await;

        let err = client.request(&RedisCommand::get("k")).await.unwrap_err();
        assert!(matches!(err, ProbeError::ConnectionClosed { .. }));

        let err = client.request(&RedisCommand::get("k")).await.unwrap_err();
        assert!(matches!(err, ProbeError::ConnectionClosed { .. }));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = RedisClient::connect(&ConnectOptions::new("127.0.0.1", port))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Connection { .. }));
    }

    #[test]
    fn test_debug_redacts_password() {
        let options = ConnectOptions::new("localhost", 6379).with_password("hunter2");
        let rendered = format!("{:?}", options);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
