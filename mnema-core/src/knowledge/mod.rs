//! Knowledge hierarchy — "What I've learned" across environments.
//!
//! Three capacity-bounded tiers:
//!
//! | Tier | Capacity | Applies                                   | Decay × | Adaptation weight |
//! |------|----------|-------------------------------------------|---------|-------------------|
//! | Low  | 20       | originating environment only              | 1.2     | 0.7               |
//! | Mid  | 15       | untested, or mean transfer success ≥ 0.7  | 1.0     | 0.4               |
//! | High | 10       | everywhere                                | 0.8     | 0.1               |
//!
//! The hierarchy cycles: ingest low entries from recent important
//! experiences → every `generalization_interval_ticks` promote low → mid
//! then mid → high → decay all tiers → prune under `minimum_confidence`.

pub mod condition;
pub mod entry;
pub mod generalize;

pub use condition::{Condition, ConditionValue, Context, Operator};
pub use entry::{Instance, InstanceSource, KnowledgeEntry, KnowledgePattern, TransferRecord};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EnvironmentConfig, KnowledgeConfig};
use crate::decay;
use crate::memory::MemoryView;
use crate::memory::episodic::EpisodicRecord;
use crate::types::{EntityKind, EnvironmentId, KnowledgeId, MatchScore, RecordId, Tick, Value};

/// Context key carrying the active reality-flux effect (0 = none).
pub const FLUX_EFFECT_KEY: &str = "flux_effect";

/// Abstraction tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeLevel {
    /// Environment-specific.
    Low,
    /// Cross-environment.
    Mid,
    /// Universal.
    High,
}

impl KnowledgeLevel {
    /// Every tier, lowest first.
    pub const ALL: [Self; 3] = [Self::Low, Self::Mid, Self::High];

    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
        }
    }
}

impl fmt::Display for KnowledgeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a knowledge entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeType {
    /// Where resources are.
    ResourceLocation,
    /// How hazards behave.
    HazardBehavior,
    /// What obstacles are like.
    ObstacleProperties,
    /// How other agents respond.
    AgentInteraction,
    /// What a reality-flux state does.
    RealityFluxEffect,
}

impl KnowledgeType {
    /// Snake-case identifier, e.g. `resource_location`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResourceLocation => "resource_location",
            Self::HazardBehavior => "hazard_behavior",
            Self::ObstacleProperties => "obstacle_properties",
            Self::AgentInteraction => "agent_interaction",
            Self::RealityFluxEffect => "reality_flux_effect",
        }
    }

    /// Type of knowledge an experience of `kind` produces. Flux experiences
    /// override the entity kind; synthetic records produce none.
    #[must_use]
    pub fn from_experience(kind: EntityKind, in_flux: bool) -> Option<Self> {
        if in_flux {
            return Some(Self::RealityFluxEffect);
        }
        match kind {
            EntityKind::Resource => Some(Self::ResourceLocation),
            EntityKind::Hazard => Some(Self::HazardBehavior),
            EntityKind::Obstacle => Some(Self::ObstacleProperties),
            EntityKind::Agent => Some(Self::AgentInteraction),
            EntityKind::Synthetic => None,
        }
    }

    /// How an agent should respond to this kind of knowledge.
    #[must_use]
    pub fn approach(self) -> &'static str {
        match self {
            Self::ResourceLocation => "approach",
            Self::HazardBehavior => "avoid",
            Self::ObstacleProperties => "navigate",
            Self::AgentInteraction => "interact",
            Self::RealityFluxEffect => "adapt",
        }
    }
}

impl fmt::Display for KnowledgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A knowledge entry that matched a context.
#[derive(Debug, Clone)]
pub struct KnowledgeMatch {
    /// Matched entry.
    pub id: KnowledgeId,
    /// Its tier.
    pub level: KnowledgeLevel,
    /// Its type.
    pub kind: KnowledgeType,
    /// Entry confidence × satisfied-condition fraction.
    pub score: MatchScore,
    /// Copy of the entry's outcome map.
    pub outcome: BTreeMap<String, Value>,
}

/// Entry counts per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    /// Low-tier entries.
    pub low: usize,
    /// Mid-tier entries.
    pub mid: usize,
    /// High-tier entries.
    pub high: usize,
}

impl TierCounts {
    /// Sum over all tiers.
    #[must_use]
    pub fn total(&self) -> usize {
        self.low + self.mid + self.high
    }
}

/// Outcome of one generalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneralizationReport {
    /// Mid entries created.
    pub mid_created: usize,
    /// Mid entries merged into.
    pub mid_merged: usize,
    /// High entries created.
    pub high_created: usize,
    /// High entries merged into.
    pub high_merged: usize,
}

/// Read-only view used by the decision engine.
pub trait KnowledgeView {
    /// Entries of `level` applicable in `environment` whose match confidence
    /// against `context` reaches the validation threshold, best first.
    fn find_applicable(
        &self,
        level: KnowledgeLevel,
        context: &Context,
        environment: EnvironmentId,
        config: &KnowledgeConfig,
    ) -> Vec<KnowledgeMatch>;

    /// Look up an entry in any tier.
    fn entry(&self, id: KnowledgeId) -> Option<&KnowledgeEntry>;
}

/// Per-agent three-tier knowledge store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeHierarchy {
    low: Vec<KnowledgeEntry>,
    mid: Vec<KnowledgeEntry>,
    high: Vec<KnowledgeEntry>,
    known_environments: BTreeSet<EnvironmentId>,
    last_generalization: Tick,
    #[serde(skip)]
    ingested: HashMap<RecordId, Tick>,
}

impl KnowledgeHierarchy {
    /// Create an empty hierarchy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries of one tier.
    #[must_use]
    pub fn tier(&self, level: KnowledgeLevel) -> &[KnowledgeEntry] {
        match level {
            KnowledgeLevel::Low => &self.low,
            KnowledgeLevel::Mid => &self.mid,
            KnowledgeLevel::High => &self.high,
        }
    }

    fn tier_mut(&mut self, level: KnowledgeLevel) -> &mut Vec<KnowledgeEntry> {
        match level {
            KnowledgeLevel::Low => &mut self.low,
            KnowledgeLevel::Mid => &mut self.mid,
            KnowledgeLevel::High => &mut self.high,
        }
    }

    /// Entry counts per tier.
    #[must_use]
    pub fn counts(&self) -> TierCounts {
        TierCounts {
            low: self.low.len(),
            mid: self.mid.len(),
            high: self.high.len(),
        }
    }

    /// Environments this agent has been in.
    #[must_use]
    pub fn known_environments(&self) -> &BTreeSet<EnvironmentId> {
        &self.known_environments
    }

    /// Tick of the last generalization pass.
    #[must_use]
    pub fn last_generalization(&self) -> Tick {
        self.last_generalization
    }

    /// Remember an environment. Universal entries extend to it.
    pub fn register_environment(&mut self, environment: EnvironmentId) {
        if self.known_environments.insert(environment) {
            for entry in self.high.iter_mut().filter(|e| e.universal_principle) {
                entry.environment_ids.insert(environment);
            }
        }
    }

    /// Insert into the entry's tier, evicting the strictly lowest-confidence
    /// entry (first found on ties) when the tier is full. Returns the evicted
    /// entry.
    pub fn insert(&mut self, entry: KnowledgeEntry, config: &KnowledgeConfig) -> Option<KnowledgeEntry> {
        let level = entry.level;
        let capacity = config.capacity(level);
        if capacity == 0 {
            return Some(entry);
        }
        let tier = self.tier_mut(level);
        let mut evicted = None;
        if tier.len() >= capacity {
            if let Some(index) = lowest_confidence_index(tier) {
                let removed = tier.remove(index);
                debug!(level = %level, evicted = %removed.id, confidence = removed.confidence, "Knowledge tier full, evicting");
                evicted = Some(removed);
            }
        }
        tier.push(entry);
        evicted
    }

    /// Create low-tier entries from important recent experiences.
    ///
    /// Each record is ingested at most once. Returns the number of entries
    /// created.
    pub fn ingest_experiences(
        &mut self,
        memory: &dyn MemoryView,
        environment: EnvironmentId,
        now: Tick,
        config: &KnowledgeConfig,
    ) -> usize {
        let window = config.experience_window_ticks;
        self.ingested.retain(|_, seen| now.saturating_sub(*seen) < window);

        let candidates: Vec<&EpisodicRecord> = memory
            .records_since(now.saturating_sub(window))
            .into_iter()
            .filter(|r| r.importance > config.experience_importance_threshold && r.age(now) < window)
            .collect();

        let mut created = 0;
        for record in candidates {
            if self.ingested.insert(record.id, record.timestamp).is_some() {
                continue;
            }
            if let Some(entry) = experience_entry(record, environment, now, config) {
                self.insert(entry, config);
                created += 1;
            }
        }
        if created > 0 {
            debug!(created, env = %environment, tick = now, "Ingested low-level knowledge");
        }
        created
    }

    /// Decay every tier by elapsed time and prune entries under
    /// `minimum_confidence`. Returns the number pruned.
    pub fn decay(&mut self, now: Tick, config: &KnowledgeConfig) -> usize {
        let mut pruned = 0;
        for level in KnowledgeLevel::ALL {
            let multiplier = config.decay_multiplier(level);
            let tier = self.tier_mut(level);
            for entry in tier.iter_mut() {
                let elapsed = now.saturating_sub(entry.last_decayed);
                entry.confidence = (entry.confidence
                    - decay::knowledge_decay(config.decay_rate, elapsed, config.decay_time_unit_ticks, multiplier))
                .max(0.0);
                entry.last_decayed = now;
            }
            let before = tier.len();
            tier.retain(|e| e.confidence >= config.minimum_confidence);
            pruned += before - tier.len();
        }
        if pruned > 0 {
            debug!(pruned, tick = now, "Pruned low-confidence knowledge");
        }
        pruned
    }

    /// Run a generalization pass if the interval has elapsed.
    pub fn maybe_generalize(&mut self, now: Tick, config: &KnowledgeConfig) -> Option<GeneralizationReport> {
        let interval = config.generalization_interval_ticks.max(1);
        if now.saturating_sub(self.last_generalization) < interval {
            return None;
        }
        Some(self.generalize(now, config))
    }

    /// Promote low → mid, then mid → high.
    pub fn generalize(&mut self, now: Tick, config: &KnowledgeConfig) -> GeneralizationReport {
        self.last_generalization = now;
        let mut report = GeneralizationReport::default();

        for promotion in generalize::promote_low_to_mid(&self.low, config, now) {
            if self.merge_or_insert(promotion.entry, config) {
                report.mid_merged += 1;
            } else {
                report.mid_created += 1;
            }
        }

        let candidates = generalize::promote_mid_to_high(&self.mid, &self.known_environments, config, now);
        for promotion in candidates {
            if self.merge_or_insert(promotion.entry, config) {
                report.high_merged += 1;
            } else {
                report.high_created += 1;
            }
        }

        if report != GeneralizationReport::default() {
            info!(
                tick = now,
                mid_created = report.mid_created,
                mid_merged = report.mid_merged,
                high_created = report.high_created,
                high_merged = report.high_merged,
                "Knowledge generalized"
            );
        }
        report
    }

    /// Merge into an existing entry of the same tier and type, or insert.
    /// Returns `true` if merged.
    fn merge_or_insert(&mut self, candidate: KnowledgeEntry, config: &KnowledgeConfig) -> bool {
        let tier = self.tier_mut(candidate.level);
        if let Some(existing) = tier.iter_mut().find(|e| e.pattern.kind == candidate.pattern.kind) {
            let old_weight = existing.instances.len().max(1) as f32;
            let new_weight = candidate.instances.len().max(1) as f32;
            existing.confidence = ((existing.confidence * old_weight + candidate.confidence * new_weight)
                / (old_weight + new_weight))
                .clamp(0.0, 1.0);
            existing.pattern.conditions = candidate.pattern.conditions;
            existing.pattern.outcome = candidate.pattern.outcome;
            existing.environment_ids.extend(candidate.environment_ids);
            for instance in candidate.instances {
                existing.add_instance(instance);
            }
            existing.universal_principle |= candidate.universal_principle;
            return true;
        }
        self.insert(candidate, config);
        false
    }

    /// Discount entries that do not cover `new_environment` after a
    /// significant environment change.
    ///
    /// `confidence *= 1 − (1 − similarity) · tier_weight`. Call before
    /// [`Self::register_environment`] so universal entries are still judged
    /// on the environments they actually covered. Returns the number of
    /// entries affected.
    pub fn adapt(&mut self, new_environment: EnvironmentId, similarity: f32, config: &EnvironmentConfig) -> usize {
        let factor = (1.0 - similarity).clamp(0.0, 1.0);
        let mut affected = 0;
        for level in KnowledgeLevel::ALL {
            let discount = 1.0 - factor * config.adaptation_weight(level);
            for entry in self
                .tier_mut(level)
                .iter_mut()
                .filter(|e| !e.environment_ids.contains(&new_environment))
            {
                entry.confidence = (entry.confidence * discount).clamp(0.0, 1.0);
                affected += 1;
            }
        }
        affected
    }

    /// Feed a decision outcome back into an entry. Returns `false` if the
    /// entry no longer exists.
    pub fn record_outcome(&mut self, id: KnowledgeId, environment: EnvironmentId, success: bool, now: Tick) -> bool {
        for level in KnowledgeLevel::ALL {
            if let Some(entry) = self.tier_mut(level).iter_mut().find(|e| e.id == id) {
                entry.record_application(environment, success, now);
                return true;
            }
        }
        false
    }

    /// Restore a hierarchy from persisted tiers.
    #[must_use]
    pub fn from_parts(
        low: Vec<KnowledgeEntry>,
        mid: Vec<KnowledgeEntry>,
        high: Vec<KnowledgeEntry>,
        known_environments: BTreeSet<EnvironmentId>,
    ) -> Self {
        Self {
            low,
            mid,
            high,
            known_environments,
            ..Self::default()
        }
    }
}

impl KnowledgeView for KnowledgeHierarchy {
    fn find_applicable(
        &self,
        level: KnowledgeLevel,
        context: &Context,
        environment: EnvironmentId,
        config: &KnowledgeConfig,
    ) -> Vec<KnowledgeMatch> {
        let mut matches: Vec<KnowledgeMatch> = self
            .tier(level)
            .iter()
            .filter(|e| e.confidence >= config.minimum_confidence)
            .filter(|e| e.is_applicable_in(environment, config.validation_threshold))
            .filter_map(|e| {
                let score = e.match_confidence(context);
                (score >= config.validation_threshold).then(|| KnowledgeMatch {
                    id: e.id,
                    level: e.level,
                    kind: e.pattern.kind,
                    score: MatchScore::new(score),
                    outcome: e.pattern.outcome.clone(),
                })
            })
            .collect();
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches
    }

    fn entry(&self, id: KnowledgeId) -> Option<&KnowledgeEntry> {
        self.low
            .iter()
            .chain(self.mid.iter())
            .chain(self.high.iter())
            .find(|e| e.id == id)
    }
}

/// Index of the strictly lowest-confidence entry; the first one wins ties.
fn lowest_confidence_index(entries: &[KnowledgeEntry]) -> Option<usize> {
    let mut lowest: Option<(usize, f32)> = None;
    for (index, entry) in entries.iter().enumerate() {
        if lowest.is_none_or(|(_, c)| entry.confidence < c) {
            lowest = Some((index, entry.confidence));
        }
    }
    lowest.map(|(index, _)| index)
}

/// Low-tier entry describing one experience.
fn experience_entry(
    record: &EpisodicRecord,
    environment: EnvironmentId,
    now: Tick,
    config: &KnowledgeConfig,
) -> Option<KnowledgeEntry> {
    let flux = record
        .context
        .get(FLUX_EFFECT_KEY)
        .and_then(Value::as_number)
        .filter(|effect| *effect > 0.0);
    let kind = KnowledgeType::from_experience(record.source_kind, flux.is_some())?;

    let mut conditions = vec![
        Condition::near("x", record.position.x, config.near_threshold),
        Condition::near("y", record.position.y, config.near_threshold),
    ];
    if let Some(effect) = flux {
        conditions.push(Condition::equals(FLUX_EFFECT_KEY, effect));
    }

    let mut outcome = BTreeMap::new();
    outcome.insert("target_x".to_string(), Value::Number(record.position.x));
    outcome.insert("target_y".to_string(), Value::Number(record.position.y));
    outcome.insert("entity_kind".to_string(), Value::from(record.source_kind.as_str()));
    outcome.insert("importance".to_string(), Value::Number(record.importance));
    outcome.insert("approach".to_string(), Value::from(kind.approach()));

    let pattern = KnowledgePattern {
        kind,
        conditions,
        outcome,
    };
    let mut entry = KnowledgeEntry::new(pattern, KnowledgeLevel::Low, record.importance, environment, now);
    entry.add_instance(Instance {
        source: InstanceSource::Record(record.id),
        environment,
        observed_at: record.timestamp,
    });
    Some(entry)
}
