//! In-process stores.
//!
//! [`MemoryStore`] keeps entries in a map with per-entry deadlines measured on
//! the tokio clock, so TTL behaviour follows `tokio::time::pause`/`advance` in
//! tests. [`MirroredStore`] is a primary that replicates each accepted write
//! to a second store synchronously, optionally dropping some keys to simulate
//! partial replication.

use super::{PrimaryStore, ReplicaStore, StoreFuture, TtlEntry, WriteAck};
use crate::adapters::redis::RedisError;
use crate::core::error::ProbeError;
use crate::probe::key::StoreKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Map-backed store with lazy TTL expiry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    writes: AtomicU64,
    reads: AtomicU64,
    reject_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty shared store.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Insert directly, bypassing write accounting.
    pub fn insert(&self, key: &StoreKey, value: impl Into<String>, ttl: Duration) {
        let entry = MemoryEntry {
            value: value.into(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().insert(key.as_str().to_string(), entry);
    }

    /// Remove a key. Returns whether a live entry was removed.
    pub fn remove(&self, key: &StoreKey) -> bool {
        let now = Instant::now();
        self.entries
            .write()
            .remove(key.as_str())
            .map(|e| e.is_live(now))
            .unwrap_or(false)
    }

    /// Check whether a live entry exists for `key`.
    pub fn contains(&self, key: &StoreKey) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .get(key.as_str())
            .map(|e| e.is_live(now))
            .unwrap_or(false)
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<StoreKey> {
        let now = Instant::now();
        let mut keys: Vec<StoreKey> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| StoreKey::new(k.clone()))
            .collect();
        keys.sort();
        keys
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// Check if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes accepted or rejected through [`PrimaryStore::set`].
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Reads served through [`ReplicaStore::get`].
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Make subsequent writes fail with a server error (nothing is stored).
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::Relaxed);
    }

    fn apply(&self, entry: &TtlEntry) -> Result<(), ProbeError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if self.reject_writes.load(Ordering::Relaxed) {
            return Err(ProbeError::Server(RedisError::new(
                "READONLY",
                "You can't write against a read only replica",
            )));
        }
        self.insert(&entry.key, entry.value.clone(), entry.ttl());
        Ok(())
    }

    fn lookup(&self, key: &StoreKey) -> Option<String> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        {
            let entries = self.entries.read();
            match entries.get(key.as_str()) {
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it the way a store's lazy expiry would.
        self.entries.write().remove(key.as_str());
        None
    }
}

impl PrimaryStore for MemoryStore {
    fn set(&self, entry: &TtlEntry) -> WriteAck {
        WriteAck::ready(self.apply(entry))
    }
}

impl ReplicaStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<String>> {
        let value = self.lookup(key);
        Box::pin(async move { Ok(value) })
    }
}

type ReplicationFilter = Box<dyn Fn(&StoreKey) -> bool + Send + Sync>;

/// Primary that copies accepted writes to a replica before acknowledging.
pub struct MirroredStore {
    primary: Arc<MemoryStore>,
    replica: Arc<MemoryStore>,
    filter: ReplicationFilter,
}

impl MirroredStore {
    /// Replicate every write.
    pub fn new(primary: Arc<MemoryStore>, replica: Arc<MemoryStore>) -> Self {
        Self::with_filter(primary, replica, |_| true)
    }

    /// Replicate only keys for which `filter` returns true.
    pub fn with_filter<F>(primary: Arc<MemoryStore>, replica: Arc<MemoryStore>, filter: F) -> Self
    where
        F: Fn(&StoreKey) -> bool + Send + Sync + 'static,
    {
        Self {
            primary,
            replica,
            filter: Box::new(filter),
        }
    }

    /// The store receiving writes.
    pub fn primary(&self) -> &Arc<MemoryStore> {
        &self.primary
    }

    /// The mirror.
    pub fn replica(&self) -> &Arc<MemoryStore> {
        &self.replica
    }
}

impl std::fmt::Debug for MirroredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirroredStore")
            .field("primary", &self.primary)
            .field("replica", &self.replica)
            .finish_non_exhaustive()
    }
}

impl PrimaryStore for MirroredStore {
    fn set(&self, entry: &TtlEntry) -> WriteAck {
        let result = self.primary.apply(entry);
        if result.is_ok() && (self.filter)(&entry.key) {
            self.replica
                .insert(&entry.key, entry.value.clone(), entry.ttl());
        }
        WriteAck::ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, ttl_seconds: u64) -> TtlEntry {
        TtlEntry::new(StoreKey::derive("fact", id), format!("text-{}", id), ttl_seconds).unwrap()
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryStore::new();
        store.set(&entry("a", 60)).wait().await.unwrap();

        let key = StoreKey::derive("fact", "a");
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("text-a"));
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.read_count(), 1);

        let missing = StoreKey::derive("fact", "b");
        assert_eq!(store.get(&missing).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires() {
        let store = MemoryStore::new();
        store.set(&entry("a", 1)).wait().await.unwrap();
        let key = StoreKey::derive("fact", "a");
        assert!(store.contains(&key));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(store.contains(&key));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!store.contains(&key));
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_writes_not_stored() {
        let store = MemoryStore::new();
        store.reject_writes(true);
        let err = store.set(&entry("a", 60)).wait().await.unwrap_err();
        assert!(matches!(err, ProbeError::Server(_)));
        assert!(store.is_empty());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_mirror_filter() {
        let primary = MemoryStore::shared();
        let replica = MemoryStore::shared();
        let mirror = MirroredStore::with_filter(primary.clone(), replica.clone(), |k| {
            k.identifier() != "b"
        });

        for id in ["a", "b", "c"] {
            mirror.set(&entry(id, 60)).wait().await.unwrap();
        }

        assert_eq!(primary.len(), 3);
        assert_eq!(
            replica.keys(),
            vec![StoreKey::derive("fact", "a"), StoreKey::derive("fact", "c")]
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryStore::new();
        let key = StoreKey::derive("fact", "a");
        store.insert(&key, "v", Duration::from_secs(60));
        assert!(store.remove(&key));
        assert!(!store.remove(&key));
    }
}
