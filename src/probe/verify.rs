//! Reading keys back from the replica.

use super::key::StoreKey;
use crate::core::error::{ProbeError, ProbeResult};
use crate::store::ReplicaStore;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{debug, warn};

/// Order in which attempted keys are read back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VerifyOrder {
    /// Last written first.
    #[default]
    Reverse,
    /// Write order.
    Forward,
}

impl VerifyOrder {
    /// Arrange `keys`, given in write order.
    pub fn apply(&self, mut keys: Vec<StoreKey>) -> Vec<StoreKey> {
        if *self == VerifyOrder::Reverse {
            keys.reverse();
        }
        keys
    }

    /// Configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyOrder::Reverse => "reverse",
            VerifyOrder::Forward => "forward",
        }
    }
}

impl std::fmt::Display for VerifyOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of reading one key from the replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome {
    /// Key that was read.
    pub key: StoreKey,
    /// Observed value; `None` when the replica had nothing.
    pub value: Option<String>,
}

impl VerificationOutcome {
    /// Whether the replica held a value.
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

/// Reads keys from the replica in the order given.
#[derive(Debug)]
pub struct ReplicationVerifier<R> {
    store: R,
    concurrency: usize,
}

impl<R: ReplicaStore> ReplicationVerifier<R> {
    /// Verifier with one read in flight at a time.
    pub fn new(store: R) -> Self {
        Self {
            store,
            concurrency: 1,
        }
    }

    /// Allow up to `concurrency` reads in flight. Outcome order is unaffected.
    pub fn with_concurrency(mut self, concurrency: usize) -> ProbeResult<Self> {
        if concurrency == 0 {
            return Err(ProbeError::invalid_argument("concurrency must be >= 1"));
        }
        self.concurrency = concurrency;
        Ok(self)
    }

    /// Reads allowed in flight.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Read every key, printing present ones to stdout when `echo` is set.
    pub async fn verify(&self, keys: &[StoreKey], echo: bool) -> Vec<VerificationOutcome> {
        if echo {
            let mut stdout = std::io::stdout();
            self.verify_into(keys, Some(&mut stdout)).await
        } else {
            self.verify_into(keys, None).await
        }
    }

    /// Read every key, echoing present ones to `echo`.
    ///
    /// Outcomes follow the order of `keys`. An empty value counts as absent. A
    /// key whose read fails gets no outcome at all.
    pub async fn verify_into(
        &self,
        keys: &[StoreKey],
        mut echo: Option<&mut (dyn Write + Send)>,
    ) -> Vec<VerificationOutcome> {
        let store = &self.store;
        let mut reads = stream::iter(keys)
            .map(|key| async move { (key, store.get(key).await) })
            .buffered(self.concurrency);

        let mut outcomes = Vec::with_capacity(keys.len());
        while let Some((key, result)) = reads.next().await {
            match result {
                Ok(value) => {
                    let value = value.filter(|v| !v.is_empty());
                    match (&value, echo.as_mut()) {
                        (Some(v), Some(out)) => {
                            if let Err(e) = writeln!(out, "{} --> \t [{}]", key, v) {
                                debug!(key = %key, error = %e, "echo write failed");
                            }
                        }
                        (None, _) => debug!(key = %key, "not on replica"),
                        _ => {}
                    }
                    outcomes.push(VerificationOutcome {
                        key: key.clone(),
                        value,
                    });
                }
                Err(e) => warn!(key = %key, error = %e, "read failed, key not verified"),
            }
        }

        outcomes
    }
}
