//! Wire adapters for external stores.

pub mod redis;
