//! Store handles.
//!
//! The ingestor and verifier never see a connection directly; they are handed
//! a [`PrimaryStore`] (writes only) and a [`ReplicaStore`] (reads only). The
//! Redis client implements both, and so do the in-process doubles in
//! [`memory`].
//!
//! Writes are split into dispatch and acknowledgment. [`PrimaryStore::set`]
//! hands the write to the store before it returns; the returned [`WriteAck`]
//! may be awaited or simply dropped. Dropping it is the fire-and-forget path:
//! the write still happens, its outcome is just never observed.

pub mod memory;

pub use memory::{MemoryStore, MirroredStore};

use crate::core::error::{ProbeError, ProbeResult};
use crate::probe::key::StoreKey;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = ProbeResult<T>> + Send + 'a>>;

/// One write: key, value and expiration window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlEntry {
    /// Target key.
    pub key: StoreKey,
    /// Stored payload.
    pub value: String,
    /// Seconds until the store drops the entry, counted from write acceptance.
    pub ttl_seconds: u64,
}

impl TtlEntry {
    /// Create an entry. The TTL must be non-zero.
    pub fn new(key: StoreKey, value: impl Into<String>, ttl_seconds: u64) -> ProbeResult<Self> {
        if ttl_seconds == 0 {
            return Err(ProbeError::invalid_argument("ttl_seconds must be > 0"));
        }
        Ok(Self {
            key,
            value: value.into(),
            ttl_seconds,
        })
    }

    /// TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Pending acknowledgment of a dispatched write.
///
/// The write was already handed to the store when this was created.
#[must_use = "drop explicitly to ignore the acknowledgment"]
pub struct WriteAck {
    inner: StoreFuture<'static, ()>,
}

impl WriteAck {
    /// Wrap a future that resolves once the store acknowledges the write.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = ProbeResult<()>> + Send + 'static,
    {
        Self {
            inner: Box::pin(future),
        }
    }

    /// An acknowledgment that is already known.
    pub fn ready(result: ProbeResult<()>) -> Self {
        Self::pending(std::future::ready(result))
    }

    /// Wait for the store's answer.
    pub async fn wait(self) -> ProbeResult<()> {
        self.inner.await
    }
}

impl std::fmt::Debug for WriteAck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WriteAck")
    }
}

/// Write side of the probe: the store receiving entries.
pub trait PrimaryStore: Send + Sync {
    /// Dispatch `SET key value EX ttl`.
    ///
    /// Implementations must hand the write to the store before returning, so
    /// that dispatch order equals call order even when the ack is dropped.
    fn set(&self, entry: &TtlEntry) -> WriteAck;
}

/// Read side of the probe: the store expected to mirror the primary.
pub trait ReplicaStore: Send + Sync {
    /// Read `key`. `Ok(None)` means the store holds no value for it.
    fn get<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<String>>;
}

impl<T: PrimaryStore + ?Sized> PrimaryStore for std::sync::Arc<T> {
    fn set(&self, entry: &TtlEntry) -> WriteAck {
        (**self).set(entry)
    }
}

impl<T: ReplicaStore + ?Sized> ReplicaStore for std::sync::Arc<T> {
    fn get<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<String>> {
        (**self).get(key)
    }
}
