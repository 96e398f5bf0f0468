//! Error types for the probe pipeline.
//!
//! Errors fall into two classes. Fatal errors stop a run before a report is
//! produced (missing credential, source failures, store bootstrap failures).
//! Per-item errors (a single write or read) never surface from the pipeline;
//! they are folded into the aggregate counts by the ingestor and verifier.

use crate::adapters::redis::RedisError;
use thiserror::Error;

/// Common probe error conditions.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The store credential was not supplied.
    #[error("missing credential: {hint}")]
    MissingCredential { hint: String },

    /// A caller supplied an unusable argument (zero TTL, empty namespace, ...).
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The upstream source could not be reached or returned a failure status.
    #[error("source fetch failed: {message}")]
    SourceFetch { message: String },

    /// The upstream source answered with a body that is not a record batch.
    #[error("source decode failed: {message}")]
    SourceDecode { message: String },

    /// TCP connection to a store could not be established.
    #[error("connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    /// The store rejected the credential.
    #[error("authentication to {endpoint} failed: {source}")]
    Authentication {
        endpoint: String,
        #[source]
        source: RedisError,
    },

    /// The connection was closed while a request was outstanding.
    #[error("connection to {endpoint} closed")]
    ConnectionClosed { endpoint: String },

    /// The store answered a request with an error reply.
    #[error("server error: {0}")]
    Server(#[from] RedisError),

    /// The store answered with a frame that could not be interpreted.
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl ProbeError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a Protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a ConnectionClosed error.
    pub fn closed(endpoint: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            endpoint: endpoint.into(),
        }
    }

    /// Check if this error must abort a run.
    ///
    /// Per-item store errors (`Server`, `ConnectionClosed`, `Protocol`) are
    /// absorbed by the ingestor and verifier; everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Server(_) | Self::ConnectionClosed { .. } | Self::Protocol { .. }
        )
    }

    /// Check if this error is a precondition failure detected before any
    /// network activity.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential { .. } | Self::InvalidArgument { .. }
        )
    }
}

/// Result type using ProbeError.
pub type ProbeResult<T> = Result<T, ProbeError>;
