//! The write-then-verify replication probe.
//!
//! A run moves one batch through four steps: fetch records from a
//! [`SourceFetcher`](crate::source::SourceFetcher), write them to the primary
//! with a TTL ([`ingest`]), read the same keys back from the replica
//! ([`verify`]), and aggregate the outcomes ([`report`]). [`pipeline`] ties the
//! steps together and times them.

pub mod ingest;
pub mod key;
pub mod pipeline;
pub mod report;
pub mod verify;

pub use ingest::{RecordIngestor, WriteMode};
pub use key::StoreKey;
pub use pipeline::{ProbeRun, ReplicationProbe, StageTimings};
pub use report::ConsistencyReport;
pub use verify::{ReplicationVerifier, VerificationOutcome, VerifyOrder};
