//! Error types for the failure detector

use thiserror::Error;

/// Result type alias for the failure detector
pub type Result<T> = std::result::Result<T, Error>;

/// Failure detector errors
///
/// Probe errors carried on samples are data, not failures of the detector,
/// so they never surface here.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The live store has a single owner, so batches cannot fan out
    #[error("Unsupported worker count {0}: the live store requires exactly one worker")]
    UnsupportedWorkerCount(usize),

    /// The ingestion queue no longer accepts samples
    #[error("Ingestion queue closed")]
    QueueClosed,

    /// A worker task failed
    #[error("Worker error: {0}")]
    Worker(String),
}
