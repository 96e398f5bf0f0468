//! replica-probe - write-then-verify replication checker.
//!
//! The probe writes a batch of externally sourced records to a primary
//! Redis-compatible store, each with a TTL, then reads the same keys back from a
//! replica and reports how many arrived before they expired. It detects
//! replication lag or loss between two independently reachable instances.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   records   ┌────────────────┐   keys   ┌─────────────────────┐
//! │ SourceFetcher│ ──────────▶ │ RecordIngestor │ ───────▶ │ ReplicationVerifier │
//! │  HTTP / file │             │ SET k v EX ttl │          │  GET k (in order)   │
//! └──────────────┘             └───────┬────────┘          └──────────┬──────────┘
//!                                      │ primary                      │ replica
//!                                      ▼                              ▼
//!                               ┌────────────┐   replication   ┌────────────┐
//!                               │  Primary   │ ──────────────▶ │  Replica   │
//!                               └────────────┘                 └────────────┘
//! ```
//!
//! Data flows one way. Fatal errors (missing credential, source failure, store
//! bootstrap failure) stop the run before a report exists; a failed individual
//! write or read only lowers the verified count.
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types
//!
//! ## Probe
//! - [`probe::key`] - Store key derivation
//! - [`probe::ingest`] - Writes with TTL to the primary
//! - [`probe::verify`] - Reads from the replica
//! - [`probe::report`] - Aggregated result
//! - [`probe::pipeline`] - End-to-end run with stage timings
//!
//! ## Stores and sources
//! - [`store`] - Primary/replica store traits and in-process doubles
//! - [`adapters::redis`] - RESP2 codec and pipelined client
//! - [`source`] - Record sources (HTTP, static/file)
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations

// Core infrastructure
pub mod core;

// Probe stages
pub mod probe;

// Store abstraction
pub mod store;

// Record sources
pub mod source;

// Protocol adapters
pub mod adapters;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error};
pub use adapters::redis::{ConnectOptions, RedisClient};
pub use self::core::error::{ProbeError, ProbeResult};
pub use probe::{
    ConsistencyReport, ProbeRun, RecordIngestor, ReplicationProbe, ReplicationVerifier, StoreKey,
    VerificationOutcome, VerifyOrder, WriteMode,
};
pub use source::{HttpSource, RawRecord, SourceFetcher, StaticSource};
pub use store::{MemoryStore, MirroredStore, PrimaryStore, ReplicaStore, TtlEntry};
