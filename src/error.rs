//! Error types for index construction and decoding.
//!
//! Lookups on a built index never fail; every fallible path is either a
//! build-time or a decode-time error.

use thiserror::Error;

/// Errors surfaced by builders, decoders and configuration validation.
#[derive(Debug, Error)]
pub enum Error {
    /// Cuckoo placement failed even after growing the bucket count.
    #[error(
        "cuckoo placement exhausted after {attempts} attempts \
         ({num_values} values, last tried {num_buckets} buckets)"
    )]
    BuildExhaustion {
        attempts: usize,
        num_values: usize,
        num_buckets: usize,
    },

    /// No fingerprint length of at most 64 bits satisfies the constraints.
    #[error("exhausted all 64 fingerprint bits and still colliding")]
    FingerprintOverflow,

    /// A decoded length or bit-width exceeds its expected bounds.
    #[error("malformed encoding: {0}")]
    SerializationFormat(String),

    /// API misuse, e.g. a stripe or slot id beyond the valid range.
    #[error("{what} {index} out of range (limit {limit})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        limit: usize,
    },

    /// Rejected configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Underlying I/O failure (CSV ingest, compression).
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::SerializationFormat(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }
}
