//! Sync error types.

use thiserror::Error;

/// Errors that can occur while shipping batches.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed or returned a non-success status.
    #[error("Sync request failed: {0}")]
    RequestFailed(String),

    /// Request timed out.
    #[error("Sync request timed out after {0}ms")]
    Timeout(u64),

    /// Endpoint unreachable or not configured.
    #[error("Sync endpoint unavailable: {0}")]
    Unavailable(String),

    /// Batch could not be encoded or decoded.
    #[error("Sync batch encoding failed: {0}")]
    Encode(String),

    /// All retry attempts exhausted.
    #[error("All sync retry attempts exhausted after {attempts} tries: {last_error}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// Error of the final attempt.
        last_error: String,
    },

    /// Queue at capacity; the batch was dropped.
    #[error("Sync queue full ({0} pending)")]
    QueueFull(usize),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(0)
        } else if err.is_connect() {
            SyncError::Unavailable(err.to_string())
        } else {
            SyncError::RequestFailed(err.to_string())
        }
    }
}

impl From<rmp_serde::encode::Error> for SyncError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        SyncError::Encode(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for SyncError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        SyncError::Encode(err.to_string())
    }
}
