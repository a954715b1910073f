//! Episodic memory layers and the semantic patterns distilled from them.
//!
//! Data flows one way: perceptions land in the short-term ring and the
//! episodic log ([`store::EpisodicStore`]); the distiller reads the log
//! through [`MemoryView`] and produces [`semantic::SemanticPattern`]s.

pub mod episodic;
pub mod semantic;
pub mod short_term;
pub mod spatial;
pub mod store;

pub use episodic::{EpisodicRecord, Observation, SyntheticSource};
pub use semantic::{PatternSet, PatternType, SemanticPattern};
pub use short_term::{ShortTermBuffer, ShortTermSlot};
pub use spatial::SpatialGrid;
pub use store::EpisodicStore;

use crate::types::{RecordId, Tick};

/// Read-only view of an agent's episodic memory.
///
/// Higher layers (distiller, knowledge hierarchy, sync) depend on this
/// trait instead of the concrete store.
pub trait MemoryView {
    /// The most recent `limit` live records, oldest first.
    fn recent_records(&self, limit: usize) -> Vec<&EpisodicRecord>;

    /// Live records with `timestamp >= since`, oldest first.
    fn records_since(&self, since: Tick) -> Vec<&EpisodicRecord>;

    /// Look up a live record by id.
    fn find_record(&self, id: RecordId) -> Option<&EpisodicRecord>;
}
