//! Wire types for sync batches.
//!
//! Records are compressed before they leave the process: positions are
//! quantised to a tenth of a world unit, importance to a byte, and the entity
//! kind to its one-byte code. Bodies are MessagePack with named fields.

use serde::{Deserialize, Serialize};

use mnema_core::memory::{EpisodicRecord, SemanticPattern};
use mnema_core::types::{AgentId, EntityKind, Position, Tick};

use crate::error::SyncError;

/// Quantisation steps per world unit.
pub const POSITION_SCALE: f32 = 10.0;

/// One episodic record in compressed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedRecord {
    /// Source entity.
    pub entity: u32,
    /// `EntityKind::code`.
    pub kind: u8,
    /// Quantised x.
    pub x: u16,
    /// Quantised y.
    pub y: u16,
    /// Importance × 255.
    pub importance: u8,
    /// When recorded.
    pub tick: Tick,
}

fn quantise(value: f32, scale: f32, max: f32) -> f32 {
    (value * scale).round().clamp(0.0, max)
}

impl CompressedRecord {
    /// Compress a record.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_record(record: &EpisodicRecord) -> Self {
        Self {
            entity: record.source_entity.0,
            kind: record.source_kind.code(),
            x: quantise(record.position.x, POSITION_SCALE, f32::from(u16::MAX)) as u16,
            y: quantise(record.position.y, POSITION_SCALE, f32::from(u16::MAX)) as u16,
            importance: quantise(record.importance, 255.0, 255.0) as u8,
            tick: record.timestamp,
        }
    }

    /// Dequantised position.
    #[must_use]
    pub fn position(&self) -> Position {
        Position::new(f32::from(self.x) / POSITION_SCALE, f32::from(self.y) / POSITION_SCALE)
    }

    /// Dequantised importance.
    #[must_use]
    pub fn importance(&self) -> f32 {
        f32::from(self.importance) / 255.0
    }

    /// Entity kind, if the code is known.
    #[must_use]
    pub fn entity_kind(&self) -> Option<EntityKind> {
        EntityKind::from_code(self.kind)
    }
}

/// Summary of one semantic pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSnapshot {
    /// Pattern identifier (e.g. `resource_clustering`).
    pub name: String,
    /// Confidence at batch time.
    pub confidence: f32,
    /// Records the confidence was computed over.
    pub source_count: u32,
    /// When last re-observed.
    pub last_confirmed: Tick,
}

impl From<&SemanticPattern> for PatternSnapshot {
    fn from(pattern: &SemanticPattern) -> Self {
        Self {
            name: pattern.pattern_type.name(),
            confidence: pattern.confidence,
            source_count: pattern.source_count,
            last_confirmed: pattern.last_confirmed,
        }
    }
}

/// One agent's delta since its previous batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncBatch {
    /// Owning agent.
    pub agent: AgentId,
    /// Tick the batch was built.
    pub tick: Tick,
    /// Compressed records.
    pub records: Vec<CompressedRecord>,
    /// Pattern summaries.
    pub patterns: Vec<PatternSnapshot>,
}

impl SyncBatch {
    /// Empty batch for `agent`.
    #[must_use]
    pub fn new(agent: AgentId, tick: Tick) -> Self {
        Self {
            agent,
            tick,
            records: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /// Build a batch from the newest `max_records` of `records`.
    #[must_use]
    pub fn from_parts<'a>(
        agent: AgentId,
        tick: Tick,
        records: impl IntoIterator<Item = &'a EpisodicRecord>,
        patterns: impl IntoIterator<Item = &'a SemanticPattern>,
        max_records: usize,
    ) -> Self {
        let mut compressed: Vec<CompressedRecord> = records.into_iter().map(CompressedRecord::from_record).collect();
        if compressed.len() > max_records {
            compressed.drain(..compressed.len() - max_records);
        }
        Self {
            agent,
            tick,
            records: compressed,
            patterns: patterns.into_iter().map(PatternSnapshot::from).collect(),
        }
    }

    /// Nothing to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.patterns.is_empty()
    }

    /// MessagePack body.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Parse a MessagePack body.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Encode`] if the body is not a valid batch.
    pub fn decode(body: &[u8]) -> Result<Self, SyncError> {
        Ok(rmp_serde::from_slice(body)?)
    }
}
