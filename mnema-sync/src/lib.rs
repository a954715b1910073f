//! # mnema-sync — Cloud Sync for MNEMA
//!
//! Ships compressed snapshots of agent memory to an HTTP endpoint without
//! ever blocking the simulation tick:
//!
//! ```text
//! tick ──enqueue──▶ SyncQueue ──worker task──▶ SyncClient ──▶ Transport (HTTP)
//!                   (bounded,                  (retry n × delay,
//!                    drops when full)           then logged drop)
//! ```
//!
//! Batches are MessagePack-encoded [`SyncBatch`]es. Delivery is best effort:
//! a batch that exhausts its retries is counted as failed and discarded.

pub mod client;
pub mod error;
pub mod queue;
pub mod types;

pub use client::{HttpTransport, SyncClient, Transport, WorkerHandle, spawn_worker};
pub use error::SyncError;
pub use queue::{QueueStats, SyncQueue};
pub use types::{CompressedRecord, PatternSnapshot, SyncBatch};
