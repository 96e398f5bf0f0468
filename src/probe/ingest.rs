//! Writing records to the primary store.

use super::key::StoreKey;
use crate::core::error::{ProbeError, ProbeResult};
use crate::source::RawRecord;
use crate::store::{PrimaryStore, TtlEntry};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How write acknowledgments are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Dispatch every write and never wait for its acknowledgment.
    #[default]
    BestEffort,
    /// Wait for each acknowledgment before dispatching the next write.
    AwaitEach,
}

impl WriteMode {
    /// Configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::BestEffort => "best_effort",
            WriteMode::AwaitEach => "await_each",
        }
    }
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives entries from records and writes them to the primary.
///
/// Writes are dispatched in record order. Whatever the mode, a failed write
/// never aborts the batch and its key is still reported as attempted.
#[derive(Debug)]
pub struct RecordIngestor<P> {
    store: P,
    namespace: String,
    ttl_seconds: u64,
    mode: WriteMode,
}

impl<P: PrimaryStore> RecordIngestor<P> {
    /// Ingestor writing `namespace:<id>` keys that live for `ttl_seconds`.
    pub fn new(
        store: P,
        namespace: impl Into<String>,
        ttl_seconds: u64,
        mode: WriteMode,
    ) -> ProbeResult<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(ProbeError::invalid_argument("namespace must not be empty"));
        }
        if ttl_seconds == 0 {
            return Err(ProbeError::invalid_argument("ttl_seconds must be > 0"));
        }
        Ok(Self {
            store,
            namespace,
            ttl_seconds,
            mode,
        })
    }

    /// Key namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Entry TTL in seconds.
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Write mode.
    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Write every well-formed record and return the attempted keys in input
    /// order. Malformed records are skipped.
    pub async fn ingest(&self, records: &[RawRecord]) -> Vec<StoreKey> {
        let mut attempted = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let Some(entry) = self.entry_for(record) else {
                debug!(index, "skipping record without identifier or text");
                continue;
            };

            let ack = self.store.set(&entry);
            match self.mode {
                WriteMode::BestEffort => drop(ack),
                WriteMode::AwaitEach => {
                    if let Err(e) = ack.wait().await {
                        debug!(key = %entry.key, error = %e, "write failed");
                    }
                }
            }
            attempted.push(entry.key);
        }

        attempted
    }

    fn entry_for(&self, record: &RawRecord) -> Option<TtlEntry> {
        if !record.is_well_formed() {
            return None;
        }
        let (id, text) = (record.identifier.as_deref()?, record.text.as_deref()?);
        Some(TtlEntry {
            key: StoreKey::derive(&self.namespace, id),
            value: text.to_string(),
            ttl_seconds: self.ttl_seconds,
        })
    }
}
