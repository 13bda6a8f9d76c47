use thiserror::Error;

/// Error taxonomy for the observation pipeline and the hash-chained log.
///
/// `MalformedTree` is fatal to a single observation only; the pipeline
/// keeps accepting subsequent snapshots. Chain errors are never retried
/// implicitly: a failed append leaves the chain untouched and the
/// caller must re-check the tip before trying again.
#[derive(Debug, Error)]
pub enum DriftError {
    #[error("malformed tree: {0}")]
    MalformedTree(String),

    #[error("duplicate baseline id: {0}")]
    DuplicateBaseline(String),

    #[error("chain integrity violation at entry {index}")]
    ChainIntegrity { index: u64 },

    #[error("append failed: {0}")]
    AppendFailed(String),

    #[error("store error: {0}")]
    Store(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
