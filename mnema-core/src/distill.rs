//! Semantic distillation — episodic records → recurring patterns.
//!
//! Four independent rules, each additive:
//!
//! | Rule            | Counts                                                | Emitted when            |
//! |-----------------|-------------------------------------------------------|-------------------------|
//! | Proximity       | reference records with a target record nearby in time | count / total > 0.3     |
//! | Clustering      | records with ≥ 2 same-kind neighbours                 | count / total > 0.4     |
//! | Shift stability | hazards displaced across the first reality shift      | a shift was observed    |
//! | Sequence        | consecutive kind → kind transitions                   | ≥ 3 occurrences         |
//!
//! [`distill`] is a pure function of its input. [`SemanticDistiller`] adds
//! the per-agent merge into a [`PatternSet`] and the pass interval.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::DistillConfig;
use crate::memory::episodic::EpisodicRecord;
use crate::memory::semantic::{PatternSet, PatternType, SemanticPattern};
use crate::memory::MemoryView;
use crate::rng::RandomSource;
use crate::types::{EntityKind, RecordId, Tick};

/// `(reference, target)` kind pairs checked by the proximity rule.
pub const PROXIMITY_PAIRS: [(EntityKind, EntityKind); 3] = [
    (EntityKind::Resource, EntityKind::Obstacle),
    (EntityKind::Hazard, EntityKind::Resource),
    (EntityKind::Agent, EntityKind::Resource),
];

/// Distill patterns from a set of records. Synthetic records are ignored.
#[must_use]
pub fn distill(records: &[&EpisodicRecord], now: Tick, config: &DistillConfig) -> Vec<SemanticPattern> {
    let perceived: Vec<&EpisodicRecord> = records
        .iter()
        .copied()
        .filter(|r| r.source_kind != EntityKind::Synthetic)
        .collect();

    let mut patterns = Vec::new();
    for (reference, target) in PROXIMITY_PAIRS {
        patterns.extend(proximity(&perceived, reference, target, now, config));
    }
    for kind in EntityKind::PERCEIVABLE {
        patterns.extend(clustering(&perceived, kind, now, config));
    }
    patterns.extend(shift_stability(&perceived, now, config));
    patterns.extend(sequences(&perceived, now, config));
    patterns
}

fn of_kind<'a>(records: &[&'a EpisodicRecord], kind: EntityKind) -> Vec<&'a EpisodicRecord> {
    records.iter().copied().filter(|r| r.source_kind == kind).collect()
}

/// Proximity rule for one `(reference, target)` pair.
#[must_use]
pub fn proximity(
    records: &[&EpisodicRecord],
    reference: EntityKind,
    target: EntityKind,
    now: Tick,
    config: &DistillConfig,
) -> Option<SemanticPattern> {
    let refs = of_kind(records, reference);
    let targets = of_kind(records, target);
    if refs.is_empty() || targets.is_empty() {
        return None;
    }

    let evidence: BTreeSet<RecordId> = refs
        .iter()
        .filter(|r| {
            targets.iter().any(|t| {
                t.id != r.id
                    && t.position.distance(&r.position) <= config.proximity_distance
                    && t.timestamp.abs_diff(r.timestamp) <= config.proximity_window_ticks
            })
        })
        .map(|r| r.id)
        .collect();

    let confidence = evidence.len() as f32 / refs.len() as f32;
    if confidence <= config.proximity_min_confidence {
        return None;
    }
    Some(SemanticPattern::new(
        PatternType::Proximity { reference, target },
        format!(
            "{reference} is usually found within {:.0} units of {target}",
            config.proximity_distance
        ),
        confidence,
        refs.len() as u32,
        now,
        evidence,
    ))
}

/// Clustering rule for one kind.
#[must_use]
pub fn clustering(
    records: &[&EpisodicRecord],
    kind: EntityKind,
    now: Tick,
    config: &DistillConfig,
) -> Option<SemanticPattern> {
    let same = of_kind(records, kind);
    if same.is_empty() {
        return None;
    }

    let evidence: BTreeSet<RecordId> = same
        .iter()
        .filter(|r| {
            let neighbours = same
                .iter()
                .filter(|o| o.id != r.id && o.position.distance(&r.position) <= config.cluster_distance)
                .count();
            neighbours >= config.cluster_min_neighbors
        })
        .map(|r| r.id)
        .collect();

    let confidence = evidence.len() as f32 / same.len() as f32;
    if confidence <= config.cluster_min_confidence {
        return None;
    }
    Some(SemanticPattern::new(
        PatternType::Clustering { kind },
        format!("{kind} tends to appear in groups"),
        confidence,
        same.len() as u32,
        now,
        evidence,
    ))
}

/// Shift-stability rule for hazards.
///
/// Hazard records are split at the first record flagged `realityShift`. A
/// before-record counts as displaced when every comparable after-record
/// (same entity if the entity was seen again, otherwise every after-record)
/// is further away than `shift_displacement`.
#[must_use]
pub fn shift_stability(
    records: &[&EpisodicRecord],
    now: Tick,
    config: &DistillConfig,
) -> Option<SemanticPattern> {
    let shift_tick = records
        .iter()
        .filter(|r| r.marks_reality_shift())
        .map(|r| r.timestamp)
        .min()?;

    let hazards = of_kind(records, EntityKind::Hazard);
    let (before, after): (Vec<&EpisodicRecord>, Vec<&EpisodicRecord>) =
        hazards.into_iter().partition(|r| r.timestamp < shift_tick);
    if before.is_empty() || after.is_empty() {
        return None;
    }

    let displaced: Vec<&EpisodicRecord> = before
        .iter()
        .copied()
        .filter(|b| {
            let same_entity: Vec<&&EpisodicRecord> =
                after.iter().filter(|a| a.source_entity == b.source_entity).collect();
            let candidates: Vec<&&EpisodicRecord> = if same_entity.is_empty() {
                after.iter().collect()
            } else {
                same_entity
            };
            candidates
                .iter()
                .all(|a| a.position.distance(&b.position) > config.shift_displacement)
        })
        .collect();

    let fraction = displaced.len() as f32 / before.len() as f32;
    let confidence = (0.5 + 0.5 * fraction).min(0.95);
    let evidence = displaced.iter().map(|r| r.id).collect();
    Some(SemanticPattern::new(
        PatternType::ShiftStability { kind: EntityKind::Hazard },
        format!("{:.0}% of hazards moved across a reality shift", fraction * 100.0),
        confidence,
        before.len() as u32,
        now,
        evidence,
    ))
}

/// Sequence rule: kind → kind transitions between consecutive records.
#[must_use]
pub fn sequences(records: &[&EpisodicRecord], now: Tick, config: &DistillConfig) -> Vec<SemanticPattern> {
    if records.len() < 2 {
        return Vec::new();
    }
    let mut ordered: Vec<&EpisodicRecord> = records.to_vec();
    ordered.sort_by_key(|r| r.timestamp);

    let mut tally: BTreeMap<(EntityKind, EntityKind), BTreeSet<RecordId>> = BTreeMap::new();
    let mut counts: BTreeMap<(EntityKind, EntityKind), usize> = BTreeMap::new();
    for pair in ordered.windows(2) {
        let key = (pair[0].source_kind, pair[1].source_kind);
        *counts.entry(key).or_default() += 1;
        let evidence = tally.entry(key).or_default();
        evidence.insert(pair[0].id);
        evidence.insert(pair[1].id);
    }

    let transitions = (ordered.len() - 1) as f32;
    counts
        .into_iter()
        .filter(|(_, count)| *count >= config.sequence_min_occurrences)
        .map(|((from, to), count)| {
            SemanticPattern::new(
                PatternType::Sequence { from, to },
                format!("{from} is often followed by {to}"),
                count as f32 / transitions,
                (ordered.len() - 1) as u32,
                now,
                tally.remove(&(from, to)).unwrap_or_default(),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Per-agent distiller
// ---------------------------------------------------------------------------

/// Per-agent distiller: runs [`distill`] on an interval and merges results.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SemanticDistiller {
    patterns: PatternSet,
    last_run: Option<Tick>,
    passes: u64,
}

impl SemanticDistiller {
    /// Create a distiller with no patterns.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a distiller around an existing pattern set.
    #[must_use]
    pub fn with_patterns(patterns: PatternSet) -> Self {
        Self {
            patterns,
            ..Self::default()
        }
    }

    /// Distill if `interval_ticks` have passed since the last pass. Returns
    /// the number of patterns produced by this pass.
    pub fn maybe_run(&mut self, memory: &dyn MemoryView, now: Tick, config: &DistillConfig) -> usize {
        let due = match self.last_run {
            None => true,
            Some(last) => now.saturating_sub(last) >= config.interval_ticks.max(1),
        };
        if !due {
            return 0;
        }
        self.run(memory, now, config)
    }

    /// Distill the most recent window of records and merge into the set.
    pub fn run(&mut self, memory: &dyn MemoryView, now: Tick, config: &DistillConfig) -> usize {
        let window = memory.recent_records(config.window_records);
        let fresh = distill(&window, now, config);
        let produced = fresh.len();
        self.patterns.merge_all(fresh, config.max_patterns);
        self.last_run = Some(now);
        self.passes += 1;
        debug!(
            tick = now,
            window = window.len(),
            produced,
            active = self.patterns.len(),
            "Distillation pass"
        );
        produced
    }

    /// Active patterns.
    #[must_use]
    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Completed passes.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Sample the kind expected after perceiving `from`.
    ///
    /// Each sequence pattern starting at `from` is chosen with probability
    /// proportional to its confidence; the remaining mass (if the confidences
    /// sum below 1) predicts nothing.
    pub fn predict_next(&self, from: EntityKind, rng: &mut dyn RandomSource) -> Option<EntityKind> {
        let candidates: Vec<(EntityKind, f32)> = self
            .patterns
            .patterns()
            .iter()
            .filter_map(|p| match p.pattern_type {
                PatternType::Sequence { from: f, to } if f == from => Some((to, p.confidence)),
                _ => None,
            })
            .collect();
        let total: f32 = candidates.iter().map(|(_, c)| c).sum();
        if total <= 0.0 {
            return None;
        }
        let mut roll = rng.next_unit() * total.max(1.0);
        for (kind, confidence) in candidates {
            if roll < confidence {
                return Some(kind);
            }
            roll -= confidence;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EpisodicConfig;
    use crate::memory::episodic::Observation;
    use crate::memory::store::EpisodicStore;
    use crate::rng::ScriptedRandom;
    use crate::types::{EntityId, Position};

    fn store_with(entries: &[(EntityKind, f32, f32, Tick)]) -> EpisodicStore {
        let config = EpisodicConfig::default();
        let mut store = EpisodicStore::new(&config);
        for (i, (kind, x, y, t)) in entries.iter().enumerate() {
            let obs = Observation::new(EntityId(i as u32), *kind, Position::new(*x, *y), 0.6);
            store.record(obs, 50.0, *t, &config);
        }
        store
    }

    #[test]
    fn repeated_resource_sightings_cluster() {
        let store = store_with(&[
            (EntityKind::Resource, 12.0, 11.0, 1),
            (EntityKind::Resource, 12.0, 11.0, 2),
            (EntityKind::Resource, 12.0, 11.0, 3),
        ]);
        let config = DistillConfig::default();
        let patterns = distill(&store.recent_records(100), 3, &config);
        let p = patterns
            .iter()
            .find(|p| p.pattern_type.name() == "resource_clustering")
            .expect("clustering pattern");
        assert!((p.confidence - 1.0).abs() < f32::EPSILON);
        assert_eq!(p.evidence.len(), 3);
    }

    #[test]
    fn proximity_respects_time_window() {
        let config = DistillConfig::default();
        let near_in_time = store_with(&[
            (EntityKind::Resource, 0.0, 0.0, 0),
            (EntityKind::Obstacle, 5.0, 0.0, 5),
        ]);
        let p = proximity(&near_in_time.recent_records(10), EntityKind::Resource, EntityKind::Obstacle, 5, &config);
        assert!(p.is_some());

        let far_in_time = store_with(&[
            (EntityKind::Resource, 0.0, 0.0, 0),
            (EntityKind::Obstacle, 5.0, 0.0, 50),
        ]);
        let p = proximity(&far_in_time.recent_records(10), EntityKind::Resource, EntityKind::Obstacle, 50, &config);
        assert!(p.is_none());
    }

    #[test]
    fn shift_stability_needs_a_shift() {
        let config = DistillConfig::default();
        let store = store_with(&[
            (EntityKind::Hazard, 0.0, 0.0, 0),
            (EntityKind::Hazard, 50.0, 0.0, 10),
        ]);
        assert!(shift_stability(&store.recent_records(10), 10, &config).is_none());
    }

    #[test]
    fn displaced_hazards_raise_shift_confidence() {
        let config = EpisodicConfig::default();
        let mut store = EpisodicStore::new(&config);
        store.record(Observation::new(EntityId(1), EntityKind::Hazard, Position::new(0.0, 0.0), 0.6), 50.0, 0, &config);
        store.record(Observation::new(EntityId(2), EntityKind::Hazard, Position::new(80.0, 80.0), 0.6), 50.0, 1, &config);
        store.record(
            Observation::new(EntityId(9), EntityKind::Agent, Position::new(50.0, 50.0), 0.6).with_reality_shift(),
            50.0,
            5,
            &config,
        );
        // Entity 1 moved far away; entity 2 stayed put.
        store.record(Observation::new(EntityId(1), EntityKind::Hazard, Position::new(60.0, 0.0), 0.6), 50.0, 6, &config);
        store.record(Observation::new(EntityId(2), EntityKind::Hazard, Position::new(81.0, 80.0), 0.6), 50.0, 7, &config);

        let p = shift_stability(&store.recent_records(10), 7, &DistillConfig::default()).expect("shift observed");
        assert!((p.confidence - 0.75).abs() < 1e-6);
        assert_eq!(p.evidence.len(), 1);
    }

    #[test]
    fn sequences_need_three_occurrences() {
        let config = DistillConfig::default();
        let mut entries = Vec::new();
        for i in 0..4 {
            entries.push((EntityKind::Resource, 0.0, 0.0, i * 2));
            entries.push((EntityKind::Hazard, 90.0, 90.0, i * 2 + 1));
        }
        let store = store_with(&entries);
        let patterns = sequences(&store.recent_records(100), 8, &config);
        let rh = patterns
            .iter()
            .find(|p| p.pattern_type.name() == "resource->hazard")
            .expect("resource->hazard");
        // 4 occurrences over 7 transitions.
        assert!((rh.confidence - 4.0 / 7.0).abs() < 1e-6);
        let hr = patterns.iter().find(|p| p.pattern_type.name() == "hazard->resource").expect("hazard->resource");
        assert!((hr.confidence - 3.0 / 7.0).abs() < 1e-6);
    }

    #[test]
    fn distiller_respects_interval_and_merges() {
        let store = store_with(&[
            (EntityKind::Resource, 12.0, 11.0, 1),
            (EntityKind::Resource, 12.0, 11.0, 2),
            (EntityKind::Resource, 12.0, 11.0, 3),
        ]);
        let config = DistillConfig::default();
        let mut distiller = SemanticDistiller::new();
        assert!(distiller.maybe_run(&store, 3, &config) > 0);
        assert_eq!(distiller.maybe_run(&store, 4, &config), 0);
        assert!(distiller.maybe_run(&store, 8, &config) > 0);
        let p = distiller.patterns().by_name("resource_clustering").expect("merged");
        assert_eq!(p.source_count, 6);
        assert_eq!(p.evidence.len(), 3);
        assert_eq!(distiller.passes(), 2);
    }

    #[test]
    fn prediction_samples_by_confidence() {
        let mut entries = Vec::new();
        for i in 0..4 {
            entries.push((EntityKind::Resource, 0.0, 0.0, i * 2));
            entries.push((EntityKind::Hazard, 90.0, 90.0, i * 2 + 1));
        }
        let store = store_with(&entries);
        let mut distiller = SemanticDistiller::new();
        distiller.run(&store, 8, &DistillConfig::default());

        let mut low = ScriptedRandom::new(vec![0.1]);
        assert_eq!(distiller.predict_next(EntityKind::Resource, &mut low), Some(EntityKind::Hazard));
        let mut high = ScriptedRandom::new(vec![0.9]);
        assert_eq!(distiller.predict_next(EntityKind::Resource, &mut high), None);
        assert_eq!(distiller.predict_next(EntityKind::Agent, &mut low), None);
    }
}
