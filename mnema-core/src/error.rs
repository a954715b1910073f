//! Error types for the MNEMA core library.
//!
//! The per-tick cognition pipeline is infallible by construction (capacity
//! exhaustion evicts, missing data reads as empty). Only configuration
//! loading and snapshot persistence surface errors.

use thiserror::Error;

/// Top-level error type for fallible MNEMA operations.
#[derive(Error, Debug)]
pub enum MnemaError {
    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested agent has no cognition state.
    #[error("Unknown agent: {0}")]
    UnknownAgent(crate::AgentId),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, MnemaError>;
