//! Per-agent episodic store.
//!
//! Owns the short-term ring, the rolling episodic log, the long-term list and
//! the spatial index. Recording never fails: the ring overwrites, the log
//! drops its oldest record once `max_log_records` is reached.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EpisodicConfig;
use crate::consolidation;
use crate::decay;
use crate::memory::MemoryView;
use crate::memory::episodic::{EpisodicRecord, Observation, RECONSTRUCTED_TAG, SyntheticSource};
use crate::memory::short_term::{ShortTermBuffer, ShortTermSlot};
use crate::memory::spatial::SpatialGrid;
use crate::types::{Position, RecordId, Tick, Value};

/// Fidelity multiplier applied by each reconstruction.
pub const RECONSTRUCTION_FIDELITY_FACTOR: f32 = 0.9;

/// Importance after the peak-emotion salience bias.
///
/// Records formed while the emotional scalar is outside the calm band get a
/// flat bonus; the result is clamped to `[0, 1]`.
#[must_use]
pub fn salience_adjusted(importance: f32, emotional_state: f32, config: &EpisodicConfig) -> f32 {
    let boosted = if emotional_state < config.salience_low || emotional_state > config.salience_high {
        importance + config.salience_boost
    } else {
        importance
    };
    boosted.clamp(0.0, 1.0)
}

/// Outcome of a decay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecayReport {
    /// Records still alive after the pass.
    pub retained: usize,
    /// Records removed for falling under the importance floor.
    pub pruned: usize,
}

/// Short-term ring + episodic log + long-term list + spatial grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicStore {
    short_term: ShortTermBuffer,
    log: VecDeque<EpisodicRecord>,
    long_term: Vec<EpisodicRecord>,
    grid: SpatialGrid,
    last_consolidation: Tick,
    total_recorded: u64,
}

impl EpisodicStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: &EpisodicConfig) -> Self {
        Self {
            short_term: ShortTermBuffer::new(config.short_term_capacity),
            log: VecDeque::new(),
            long_term: Vec::new(),
            grid: SpatialGrid::new(config.spatial_cell_size),
            last_consolidation: 0,
            total_recorded: 0,
        }
    }

    /// Record a perception.
    ///
    /// Writes the next short-term slot, appends to the log and indexes the
    /// record spatially. Returns the stored record.
    pub fn record(
        &mut self,
        observation: Observation,
        emotional_state: f32,
        now: Tick,
        config: &EpisodicConfig,
    ) -> EpisodicRecord {
        let record = EpisodicRecord {
            id: RecordId::new(),
            timestamp: now,
            source_entity: observation.entity,
            source_kind: observation.kind,
            position: observation.position,
            importance: salience_adjusted(observation.importance, emotional_state, config),
            fidelity: observation.fidelity.clamp(0.0, 1.0),
            context: observation.context,
            tags: observation.tags,
            emotional_impact: observation.emotional_impact.clamp(0.0, 100.0),
        };

        let (slot, overwrote) = self.short_term.write(ShortTermSlot::from(&record));
        debug!(
            record = %record.id,
            kind = %record.source_kind,
            importance = record.importance,
            slot,
            overwrote,
            "Episodic record stored"
        );
        self.append(record.clone(), config);
        record
    }

    /// Record a self-generated event (dream, narrative, imagination).
    pub fn record_synthetic(
        &mut self,
        source: SyntheticSource,
        position: Position,
        importance: f32,
        emotional_state: f32,
        now: Tick,
        config: &EpisodicConfig,
    ) -> EpisodicRecord {
        self.record(
            Observation::synthetic(source, position, importance),
            emotional_state,
            now,
            config,
        )
    }

    /// Re-remember an existing record with a modified context.
    ///
    /// The original is left untouched; a new record is appended with the
    /// merged context, reduced fidelity and the `reconstructed` tag. Returns
    /// `None` if `id` is unknown (e.g. already pruned).
    pub fn reconstruct(
        &mut self,
        id: RecordId,
        changes: BTreeMap<String, Value>,
        now: Tick,
        config: &EpisodicConfig,
    ) -> Option<EpisodicRecord> {
        let original = self.find_record(id)?;
        let mut record = original.clone();
        record.id = RecordId::new();
        record.timestamp = now;
        record.fidelity = (original.fidelity * RECONSTRUCTION_FIDELITY_FACTOR).clamp(0.0, 1.0);
        record.context.extend(changes);
        record.tags.insert(RECONSTRUCTED_TAG.to_string());
        debug!(original = %id, reconstructed = %record.id, "Episodic record reconstructed");
        self.append(record.clone(), config);
        Some(record)
    }

    fn append(&mut self, record: EpisodicRecord, config: &EpisodicConfig) {
        self.grid.insert(record.id, record.position);
        self.log.push_back(record);
        self.total_recorded += 1;
        while self.log.len() > config.max_log_records.max(1) {
            if let Some(oldest) = self.log.pop_front() {
                self.grid.remove(oldest.id, &oldest.position);
            }
        }
    }

    /// Decay every record (log, long-term and short-term) and prune records
    /// that fall under the importance floor.
    ///
    /// Not idempotent: each call multiplies the current importance again.
    pub fn apply_decay(&mut self, now: Tick, config: &EpisodicConfig) -> DecayReport {
        let mut pruned: Vec<(RecordId, Position)> = Vec::new();
        self.log.retain_mut(|r| {
            let alive = decay::decay_record(r, now, config);
            if !alive {
                pruned.push((r.id, r.position));
            }
            alive
        });
        self.long_term.retain_mut(|r| {
            let alive = decay::decay_record(r, now, config);
            if !alive {
                pruned.push((r.id, r.position));
            }
            alive
        });
        for slot in self.short_term.iter_mut() {
            decay::decay_slot(slot, now, config);
        }
        for (id, position) in &pruned {
            self.grid.remove(*id, position);
        }
        if !pruned.is_empty() {
            debug!(pruned = pruned.len(), tick = now, "Pruned decayed episodic records");
        }
        DecayReport {
            retained: self.log.len() + self.long_term.len(),
            pruned: pruned.len(),
        }
    }

    /// Run a consolidation pass if the interval has elapsed. Returns the
    /// number of records moved to long-term storage.
    pub fn maybe_consolidate(&mut self, now: Tick, config: &EpisodicConfig) -> usize {
        if !consolidation::is_due(self.last_consolidation, now, config.consolidation_interval_ticks) {
            return 0;
        }
        self.consolidate(now, config)
    }

    /// Periodic upkeep: when consolidation is due, decay every record first
    /// and then consolidate the survivors. Returns `None` between passes.
    pub fn maintain(&mut self, now: Tick, config: &EpisodicConfig) -> Option<(DecayReport, usize)> {
        if !consolidation::is_due(self.last_consolidation, now, config.consolidation_interval_ticks) {
            return None;
        }
        let decay = self.apply_decay(now, config);
        Some((decay, self.consolidate(now, config)))
    }

    /// Move high-importance log records into the long-term list.
    pub fn consolidate(&mut self, now: Tick, config: &EpisodicConfig) -> usize {
        self.last_consolidation = now;
        let moved = consolidation::consolidate(
            &mut self.log,
            &mut self.long_term,
            config.consolidation_threshold,
        );
        if moved > 0 {
            debug!(moved, long_term = self.long_term.len(), tick = now, "Consolidated episodic records");
        }
        moved
    }

    /// Records perceived within `radius` of `center`.
    #[must_use]
    pub fn nearby(&self, center: &Position, radius: f32) -> Vec<&EpisodicRecord> {
        self.grid
            .query(center, radius)
            .into_iter()
            .filter_map(|id| self.find_record(id))
            .collect()
    }

    /// The short-term ring.
    #[must_use]
    pub fn short_term(&self) -> &ShortTermBuffer {
        &self.short_term
    }

    /// The rolling episodic log, oldest first.
    #[must_use]
    pub fn log(&self) -> &VecDeque<EpisodicRecord> {
        &self.log
    }

    /// Consolidated long-term records.
    #[must_use]
    pub fn long_term(&self) -> &[EpisodicRecord] {
        &self.long_term
    }

    /// Records ever written (including ones since evicted or pruned).
    #[must_use]
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    /// Live records in the log and long-term list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len() + self.long_term.len()
    }

    /// Whether no live record exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Restore a store from persisted long-term records.
    #[must_use]
    pub fn from_long_term(records: Vec<EpisodicRecord>, config: &EpisodicConfig) -> Self {
        let mut store = Self::new(config);
        for record in &records {
            store.grid.insert(record.id, record.position);
        }
        store.long_term = records;
        store
    }
}

impl MemoryView for EpisodicStore {
    fn recent_records(&self, limit: usize) -> Vec<&EpisodicRecord> {
        let mut all: Vec<&EpisodicRecord> = self.log.iter().chain(self.long_term.iter()).collect();
        all.sort_by_key(|r| r.timestamp);
        let skip = all.len().saturating_sub(limit);
        all.into_iter().skip(skip).collect()
    }

    fn records_since(&self, since: Tick) -> Vec<&EpisodicRecord> {
        let mut found: Vec<&EpisodicRecord> = self
            .log
            .iter()
            .chain(self.long_term.iter())
            .filter(|r| r.timestamp >= since)
            .collect();
        found.sort_by_key(|r| r.timestamp);
        found
    }

    fn find_record(&self, id: RecordId) -> Option<&EpisodicRecord> {
        self.log
            .iter()
            .rev()
            .chain(self.long_term.iter())
            .find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityId, EntityKind};

    fn obs(n: u32, x: f32, importance: f32) -> Observation {
        Observation::new(EntityId(n), EntityKind::Resource, Position::new(x, 0.0), importance)
    }

    #[test]
    fn calm_state_leaves_importance_untouched() {
        let config = EpisodicConfig::default();
        let mut store = EpisodicStore::new(&config);
        let r = store.record(obs(1, 0.0, 0.4), 50.0, 0, &config);
        assert!((r.importance - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn peak_emotion_boosts_and_clamps() {
        let config = EpisodicConfig::default();
        let mut store = EpisodicStore::new(&config);
        let low = store.record(obs(1, 0.0, 0.4), 10.0, 0, &config);
        assert!((low.importance - 0.6).abs() < 1e-6);
        let high = store.record(obs(2, 0.0, 0.95), 90.0, 0, &config);
        assert!((high.importance - 1.0).abs() < f32::EPSILON);
        let edge = store.record(obs(3, 0.0, 0.4), 70.0, 0, &config);
        assert!((edge.importance - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn ring_wraps_while_log_keeps_everything() {
        let config = EpisodicConfig::default();
        let mut store = EpisodicStore::new(&config);
        for n in 0..11 {
            store.record(obs(n, n as f32, 0.5), 50.0, u64::from(n), &config);
        }
        assert_eq!(store.short_term().len(), 10);
        assert_eq!(store.short_term().last_index(), Some(0));
        assert_eq!(store.short_term().slot(0).map(|s| s.entity), Some(EntityId(10)));
        assert_eq!(store.log().len(), 11);
    }

    #[test]
    fn decay_prunes_from_log_and_grid() {
        let config = EpisodicConfig {
            decay_rate: 0.1,
            importance_floor: 0.05,
            ..EpisodicConfig::default()
        };
        let mut store = EpisodicStore::new(&config);
        store.record(obs(1, 1.0, 0.1), 50.0, 0, &config);
        store.record(obs(2, 2.0, 0.9), 50.0, 95, &config);
        let report = store.apply_decay(100, &config);
        assert_eq!(report.pruned, 1);
        assert_eq!(report.retained, 1);
        assert_eq!(store.nearby(&Position::new(0.0, 0.0), 5.0).len(), 1);
        // Short-term slots decay in place but are never removed.
        assert_eq!(store.short_term().len(), 2);
    }

    #[test]
    fn consolidation_runs_on_interval() {
        let config = EpisodicConfig::default();
        let mut store = EpisodicStore::new(&config);
        store.record(obs(1, 0.0, 0.9), 50.0, 0, &config);
        store.record(obs(2, 0.0, 0.3), 50.0, 0, &config);
        assert_eq!(store.maybe_consolidate(50, &config), 0);
        assert_eq!(store.maybe_consolidate(100, &config), 1);
        assert_eq!(store.long_term().len(), 1);
        assert_eq!(store.log().len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn reconstruction_creates_a_new_tagged_record() {
        let config = EpisodicConfig::default();
        let mut store = EpisodicStore::new(&config);
        let original = store.record(obs(1, 0.0, 0.5), 50.0, 0, &config);
        let mut changes = BTreeMap::new();
        changes.insert("colour".to_string(), Value::from("red"));
        let rebuilt = store
            .reconstruct(original.id, changes, 5, &config)
            .expect("record exists");
        assert_ne!(rebuilt.id, original.id);
        assert!(rebuilt.has_tag(RECONSTRUCTED_TAG));
        assert!((rebuilt.fidelity - 0.9).abs() < 1e-6);
        let stored = store.find_record(original.id).expect("original kept");
        assert!(stored.context.is_empty());
        assert!(store.reconstruct(RecordId::new(), BTreeMap::new(), 6, &config).is_none());
    }

    #[test]
    fn synthetic_records_are_tagged_by_source() {
        let config = EpisodicConfig::default();
        let mut store = EpisodicStore::new(&config);
        let r = store.record_synthetic(SyntheticSource::Dream, Position::new(1.0, 1.0), 0.3, 50.0, 2, &config);
        assert_eq!(r.source_kind, EntityKind::Synthetic);
        assert!(r.has_tag("dream"));
        assert!(r.fidelity < 1.0);
    }

    #[test]
    fn log_cap_drops_oldest() {
        let config = EpisodicConfig {
            max_log_records: 3,
            ..EpisodicConfig::default()
        };
        let mut store = EpisodicStore::new(&config);
        for n in 0..5 {
            store.record(obs(n, 0.0, 0.5), 50.0, u64::from(n), &config);
        }
        assert_eq!(store.log().len(), 3);
        assert_eq!(store.log().front().map(|r| r.source_entity), Some(EntityId(2)));
        assert_eq!(store.total_recorded(), 5);
    }

    #[test]
    fn recent_records_are_chronological() {
        let config = EpisodicConfig::default();
        let mut store = EpisodicStore::new(&config);
        for n in 0..5 {
            store.record(obs(n, 0.0, 0.9), 50.0, u64::from(n), &config);
        }
        store.consolidate(3, &config);
        store.record(obs(9, 0.0, 0.2), 50.0, 10, &config);
        let recent: Vec<u32> = store.recent_records(3).iter().map(|r| r.source_entity.0).collect();
        assert_eq!(recent, vec![3, 4, 9]);
        assert_eq!(store.records_since(4).len(), 2);
    }

    #[test]
    fn maintenance_decays_before_consolidating() {
        let config = EpisodicConfig {
            decay_rate: 0.01,
            ..EpisodicConfig::default()
        };
        let mut store = EpisodicStore::new(&config);
        store.record(obs(1, 0.0, 0.75), 50.0, 0, &config);
        store.record(obs(2, 0.0, 0.95), 50.0, 0, &config);
        assert!(store.maintain(50, &config).is_none());

        // 0.75·e^-1 falls under the consolidation threshold, 0.95·e^-1 too,
        // so nothing moves even though both were above 0.7 when recorded.
        let (decay, moved) = store.maintain(100, &config).expect("pass due");
        assert_eq!(decay.pruned, 0);
        assert_eq!(moved, 0);
        assert!(store.maintain(150, &config).is_none());
    }
}
