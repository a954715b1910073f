//! Per-agent cognition — one [`AgentMind`] per agent, stepped once per tick.
//!
//! ## Tick order
//!
//! 1. environment update (detection, profiling, transition)
//! 2. adaptation of knowledge after a dissimilar transition
//! 3. episodic ingest of the perception feed
//! 4. periodic semantic distillation
//! 5. low-level knowledge ingest
//! 6. periodic episodic decay, then generalization followed by knowledge decay
//! 7. decision application
//! 8. success feedback into the knowledge that drove the previous goal
//!
//! Every step only touches the owning agent's state; minds are independent.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::MnemaConfig;
use crate::decision::{self, Decision, DecisionEngine, DecisionSource, DecisionStats, Goal, Situation};
use crate::distill::SemanticDistiller;
use crate::environment::{self, EnvironmentProfile, EnvironmentTracker, EnvironmentTransition, Percept};
use crate::error::{MnemaError, Result};
use crate::knowledge::{Context, FLUX_EFFECT_KEY, GeneralizationReport, KnowledgeEntry, KnowledgeHierarchy, KnowledgeLevel, TierCounts};
use crate::memory::{EpisodicRecord, EpisodicStore, Observation, PatternSet, SyntheticSource};
use crate::metrics::MnemaCounters;
use crate::rng::RandomSource;
use crate::types::{AgentId, EntityKind, EnvironmentId, Position, RecordId, Tick, Value};

/// Base importance of a perceived entity, before the salience bias.
#[must_use]
pub fn percept_importance(kind: EntityKind) -> f32 {
    match kind {
        EntityKind::Hazard => 0.8,
        EntityKind::Resource => 0.6,
        EntityKind::Agent => 0.5,
        EntityKind::Obstacle => 0.3,
        EntityKind::Synthetic => 0.2,
    }
}

// ---------------------------------------------------------------------------
// Agent scalar state
// ---------------------------------------------------------------------------

/// Scalar state the host simulation owns and the pipeline reads / writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Current position.
    pub position: Position,
    /// Emotional scalar (0 to 100, 50 is calm).
    pub emotional_state: f32,
    /// Current goal; the pipeline's only output.
    pub goal: Goal,
    /// Active reality-flux effect (0 none, 1 teleport, 2 phase, 3 transform).
    pub flux_effect: u8,
    /// Environment forced by the host, bypassing detection.
    pub environment_override: Option<EnvironmentId>,
}

impl AgentState {
    /// Calm agent at `position` with an explore goal.
    #[must_use]
    pub fn new(position: Position) -> Self {
        Self {
            position,
            emotional_state: 50.0,
            ..Self::default()
        }
    }

    /// Properties exposed to knowledge condition matching.
    #[must_use]
    pub fn context(&self) -> Context {
        let mut context = Context::new();
        context.insert("x".to_string(), Value::Number(self.position.x));
        context.insert("y".to_string(), Value::Number(self.position.y));
        context.insert(FLUX_EFFECT_KEY.to_string(), Value::Number(f32::from(self.flux_effect)));
        context.insert("emotional_state".to_string(), Value::Number(self.emotional_state));
        context.insert("goal".to_string(), Value::from(self.goal.kind.as_str()));
        context
    }
}

// ---------------------------------------------------------------------------
// Derived state
// ---------------------------------------------------------------------------

/// Environment history of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalState {
    /// Environment the agent is in.
    pub current_environment: Option<EnvironmentId>,
    /// Environment it came from.
    pub previous_environment: Option<EnvironmentId>,
    /// Similarity of the last transition.
    pub similarity: f32,
    /// When the last transition happened.
    pub transition_tick: Option<Tick>,
}

impl Default for TemporalState {
    fn default() -> Self {
        Self {
            current_environment: None,
            previous_environment: None,
            similarity: 1.0,
            transition_tick: None,
        }
    }
}

/// Summary of one agent's knowledge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeState {
    /// Entries per tier.
    pub counts: TierCounts,
    /// Tick of the last generalization pass.
    pub last_generalization: Tick,
    /// Share of entries discounted by the last adaptation.
    pub adaptation_rate: f32,
    /// How abstract the knowledge is: `(mid + 2·high) / (2·total)`.
    pub abstraction_level: f32,
    /// Mean transfer success over entries applied in some environment.
    pub transfer_success_rate: f32,
}

/// Per-agent counters for dashboards and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CognitionStats {
    /// Records ever written.
    pub total_recorded: u64,
    /// Live records in the log.
    pub log_records: usize,
    /// Long-term records.
    pub long_term_records: usize,
    /// Active semantic patterns.
    pub patterns: usize,
    /// Distillation passes.
    pub distill_passes: u64,
    /// Knowledge entries per tier.
    pub knowledge: TierCounts,
    /// Decisions by source.
    pub decisions: DecisionStats,
    /// Environment transitions.
    pub transitions: u64,
}

/// What one tick did.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Environment the agent was in.
    pub environment: EnvironmentId,
    /// Transition, if the environment changed.
    pub transition: Option<EnvironmentTransition>,
    /// Entries discounted by adaptation.
    pub adapted: usize,
    /// Records written from the perception feed.
    pub recorded: usize,
    /// Patterns produced by distillation (0 when no pass ran).
    pub patterns_produced: usize,
    /// Low-tier entries ingested.
    pub ingested: usize,
    /// Episodic records pruned by decay.
    pub records_pruned: usize,
    /// Records consolidated.
    pub consolidated: usize,
    /// Knowledge entries pruned by decay.
    pub knowledge_pruned: usize,
    /// Generalization outcome, when a pass ran.
    pub generalization: Option<GeneralizationReport>,
    /// Decision applied to the goal.
    pub decision: Decision,
    /// Feedback sent to knowledge: `(entry, success)`.
    pub feedback: Option<(DecisionSource, bool)>,
}

#[derive(Debug, Clone, Copy)]
struct PendingFeedback {
    source: DecisionSource,
    environment: EnvironmentId,
}

// ---------------------------------------------------------------------------
// AgentMind
// ---------------------------------------------------------------------------

/// The full cognition stack of one agent.
#[derive(Debug)]
pub struct AgentMind {
    id: AgentId,
    store: EpisodicStore,
    distiller: SemanticDistiller,
    hierarchy: KnowledgeHierarchy,
    tracker: EnvironmentTracker,
    engine: DecisionEngine,
    temporal: TemporalState,
    knowledge_state: KnowledgeState,
    pending: Option<PendingFeedback>,
}

impl AgentMind {
    /// Empty mind for `id`.
    #[must_use]
    pub fn new(id: AgentId, config: &MnemaConfig) -> Self {
        Self {
            id,
            store: EpisodicStore::new(&config.episodic),
            distiller: SemanticDistiller::new(),
            hierarchy: KnowledgeHierarchy::new(),
            tracker: EnvironmentTracker::new(&config.environment),
            engine: DecisionEngine::new(),
            temporal: TemporalState::default(),
            knowledge_state: KnowledgeState::default(),
            pending: None,
        }
    }

    /// Owning agent.
    #[must_use]
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Episodic store.
    #[must_use]
    pub fn store(&self) -> &EpisodicStore {
        &self.store
    }

    /// Semantic distiller.
    #[must_use]
    pub fn distiller(&self) -> &SemanticDistiller {
        &self.distiller
    }

    /// Knowledge hierarchy.
    #[must_use]
    pub fn hierarchy(&self) -> &KnowledgeHierarchy {
        &self.hierarchy
    }

    /// Mutable knowledge hierarchy, for hosts that seed knowledge.
    pub fn hierarchy_mut(&mut self) -> &mut KnowledgeHierarchy {
        &mut self.hierarchy
    }

    /// Environment tracker.
    #[must_use]
    pub fn tracker(&self) -> &EnvironmentTracker {
        &self.tracker
    }

    /// Environment history.
    #[must_use]
    pub fn temporal(&self) -> TemporalState {
        self.temporal
    }

    /// Knowledge summary as of the last tick.
    #[must_use]
    pub fn knowledge_state(&self) -> KnowledgeState {
        self.knowledge_state
    }

    /// Record an event directly (outside the perception feed).
    pub fn record(&mut self, observation: Observation, emotional_state: f32, now: Tick, config: &MnemaConfig) -> EpisodicRecord {
        self.store.record(observation, emotional_state, now, &config.episodic)
    }

    /// Record a dream, narrative or imagined event.
    pub fn record_synthetic(
        &mut self,
        source: SyntheticSource,
        position: Position,
        importance: f32,
        emotional_state: f32,
        now: Tick,
        config: &MnemaConfig,
    ) -> EpisodicRecord {
        self.store
            .record_synthetic(source, position, importance, emotional_state, now, &config.episodic)
    }

    /// Re-remember a record with modified context.
    pub fn reconstruct(
        &mut self,
        id: RecordId,
        changes: BTreeMap<String, Value>,
        now: Tick,
        config: &MnemaConfig,
    ) -> Option<EpisodicRecord> {
        self.store.reconstruct(id, changes, now, &config.episodic)
    }

    /// Run the full pipeline for one tick.
    ///
    /// `percepts` is truncated to the configured perception capacity. The
    /// agent's goal is rewritten in place.
    #[allow(clippy::too_many_lines)]
    pub fn tick(
        &mut self,
        state: &mut AgentState,
        percepts: &[Percept],
        now: Tick,
        rng: &mut dyn RandomSource,
        config: &MnemaConfig,
        counters: Option<&MnemaCounters>,
    ) -> TickReport {
        let percepts = &percepts[..percepts.len().min(config.environment.perception_capacity)];

        // 1. Environment.
        let environment = environment::detect_environment(
            state.position,
            state.flux_effect,
            state.environment_override,
            &config.environment,
        );
        let transition = self
            .tracker
            .update(environment, percepts, state.position, now, &config.environment);
        self.temporal.current_environment = Some(environment);
        if let Some(t) = transition {
            self.temporal.previous_environment = Some(t.from);
            self.temporal.similarity = t.similarity;
            self.temporal.transition_tick = Some(t.tick);
        }

        // 2. Adaptation.
        let mut adapted = 0;
        if let Some(t) = transition.filter(|t| t.requires_adaptation) {
            adapted = self.hierarchy.adapt(t.to, t.similarity, &config.environment);
            let total = self.hierarchy.counts().total();
            self.knowledge_state.adaptation_rate = if total == 0 { 0.0 } else { adapted as f32 / total as f32 };
            debug!(agent = %self.id, affected = adapted, similarity = t.similarity, "Knowledge adapted");
        }
        self.hierarchy.register_environment(environment);

        // 3. Episodic ingest.
        let reality_shift = transition.is_some_and(|t| t.from.is_flux() != t.to.is_flux());
        for percept in percepts {
            let mut observation =
                Observation::new(percept.entity, percept.kind, percept.position, percept_importance(percept.kind))
                    .with_context(FLUX_EFFECT_KEY, f32::from(state.flux_effect))
                    .with_emotional_impact(state.emotional_state);
            if reality_shift {
                observation = observation.with_reality_shift();
            }
            self.store.record(observation, state.emotional_state, now, &config.episodic);
        }

        // 4. Distillation.
        let passes_before = self.distiller.passes();
        let patterns_produced = self.distiller.maybe_run(&self.store, now, &config.distill);

        // 5. Low-level knowledge.
        let ingested = self
            .hierarchy
            .ingest_experiences(&self.store, environment, now, &config.knowledge);

        // 6. Generalization, then decay on the same interval.
        let (records_pruned, consolidated) = self
            .store
            .maintain(now, &config.episodic)
            .map_or((0, 0), |(decay, moved)| (decay.pruned, moved));
        let generalization = self.hierarchy.maybe_generalize(now, &config.knowledge);
        let knowledge_pruned = if generalization.is_some() {
            self.hierarchy.decay(now, &config.knowledge)
        } else {
            0
        };

        // 7. Decision.
        state.goal.update_completion(state.position);
        let previous_success = decision::is_success(&state.goal, &config.decision);
        let situation = Situation {
            position: state.position,
            goal_kind: state.goal.kind,
            environment,
            percepts: percepts.to_vec(),
            context: state.context(),
        };
        let decided = self
            .engine
            .decide(&self.hierarchy, &situation, rng, &config.knowledge, &config.decision);
        let restarted = decision::apply(&decided, &mut state.goal, state.position);

        // 8. Feedback.
        let feedback = self.feedback(restarted, previous_success, &decided, state, environment, now, config);

        self.refresh_knowledge_state();
        if let Some(counters) = counters {
            MnemaCounters::add(&counters.records_created, percepts.len() as u64);
            MnemaCounters::add(&counters.records_pruned, records_pruned as u64);
            MnemaCounters::add(&counters.records_consolidated, consolidated as u64);
            MnemaCounters::add(&counters.knowledge_ingested, ingested as u64);
            MnemaCounters::add(&counters.knowledge_pruned, knowledge_pruned as u64);
            MnemaCounters::add(&counters.distill_passes, self.distiller.passes() - passes_before);
            if let Some(report) = generalization {
                let promoted = report.mid_created + report.mid_merged + report.high_created + report.high_merged;
                MnemaCounters::add(&counters.promotions, promoted as u64);
            }
            if transition.is_some() {
                MnemaCounters::add(&counters.environment_transitions, 1);
            }
            if adapted > 0 {
                MnemaCounters::add(&counters.adaptations, 1);
            }
            if decided.source.is_some() {
                MnemaCounters::add(&counters.knowledge_decisions, 1);
            } else {
                MnemaCounters::add(&counters.fallback_decisions, 1);
            }
        }
        trace!(agent = %self.id, tick = now, decision = %decided.kind, "Cognition tick");

        TickReport {
            environment,
            transition,
            adapted,
            recorded: percepts.len(),
            patterns_produced,
            ingested,
            records_pruned,
            consolidated,
            knowledge_pruned,
            generalization,
            decision: decided,
            feedback,
        }
    }

    /// Resolve the pending goal: a restarted goal reports whether the old
    /// one had succeeded; a kept goal reports once it crosses the success
    /// threshold.
    #[allow(clippy::too_many_arguments)]
    fn feedback(
        &mut self,
        restarted: bool,
        previous_success: bool,
        decided: &Decision,
        state: &AgentState,
        environment: EnvironmentId,
        now: Tick,
        config: &MnemaConfig,
    ) -> Option<(DecisionSource, bool)> {
        let resolved = if restarted {
            let outcome = self.pending.take().map(|p| (p, previous_success));
            self.pending = decided.source.map(|source| PendingFeedback { source, environment });
            outcome
        } else if decision::is_success(&state.goal, &config.decision) {
            self.pending.take().map(|p| (p, true))
        } else {
            None
        };

        let (pending, success) = resolved?;
        if self
            .hierarchy
            .record_outcome(pending.source.id, pending.environment, success, now)
        {
            debug!(
                agent = %self.id,
                knowledge = %pending.source.id,
                level = %pending.source.level,
                success,
                "Decision feedback"
            );
        }
        Some((pending.source, success))
    }

    fn refresh_knowledge_state(&mut self) {
        let counts = self.hierarchy.counts();
        let total = counts.total();
        self.knowledge_state.counts = counts;
        self.knowledge_state.last_generalization = self.hierarchy.last_generalization();
        self.knowledge_state.abstraction_level = if total == 0 {
            0.0
        } else {
            (counts.mid + 2 * counts.high) as f32 / (2 * total) as f32
        };
        let rates: Vec<f32> = KnowledgeLevel::ALL
            .iter()
            .flat_map(|level| self.hierarchy.tier(*level))
            .filter_map(KnowledgeEntry::mean_transfer_success)
            .collect();
        self.knowledge_state.transfer_success_rate = if rates.is_empty() {
            0.0
        } else {
            rates.iter().sum::<f32>() / rates.len() as f32
        };
    }

    /// Per-agent counters.
    #[must_use]
    pub fn stats(&self) -> CognitionStats {
        CognitionStats {
            total_recorded: self.store.total_recorded(),
            log_records: self.store.log().len(),
            long_term_records: self.store.long_term().len(),
            patterns: self.distiller.patterns().len(),
            distill_passes: self.distiller.passes(),
            knowledge: self.hierarchy.counts(),
            decisions: self.engine.stats(),
            transitions: self.tracker.transitions(),
        }
    }

    /// Persistable state.
    #[must_use]
    pub fn snapshot(&self, now: Tick) -> MindSnapshot {
        MindSnapshot {
            agent: self.id,
            tick: now,
            long_term: self.store.long_term().to_vec(),
            patterns: self.distiller.patterns().clone(),
            low: self.hierarchy.tier(KnowledgeLevel::Low).to_vec(),
            mid: self.hierarchy.tier(KnowledgeLevel::Mid).to_vec(),
            high: self.hierarchy.tier(KnowledgeLevel::High).to_vec(),
            known_environments: self.hierarchy.known_environments().clone(),
            profiles: self.tracker.profiles(),
            temporal: self.temporal,
        }
    }

    /// Rebuild a mind from a snapshot. The short-term ring and rolling log
    /// start empty.
    #[must_use]
    pub fn restore(snapshot: MindSnapshot, config: &MnemaConfig) -> Self {
        let mut tracker = EnvironmentTracker::new(&config.environment);
        tracker.restore_profiles(snapshot.profiles);
        let mut mind = Self {
            id: snapshot.agent,
            store: EpisodicStore::from_long_term(snapshot.long_term, &config.episodic),
            distiller: SemanticDistiller::with_patterns(snapshot.patterns),
            hierarchy: KnowledgeHierarchy::from_parts(
                snapshot.low,
                snapshot.mid,
                snapshot.high,
                snapshot.known_environments,
            ),
            tracker,
            engine: DecisionEngine::new(),
            temporal: snapshot.temporal,
            knowledge_state: KnowledgeState::default(),
            pending: None,
        };
        mind.refresh_knowledge_state();
        mind
    }
}

/// Serializable cut of an [`AgentMind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MindSnapshot {
    /// Owning agent.
    pub agent: AgentId,
    /// When the snapshot was taken.
    pub tick: Tick,
    /// Consolidated records.
    pub long_term: Vec<EpisodicRecord>,
    /// Semantic patterns.
    pub patterns: PatternSet,
    /// Low-tier knowledge.
    pub low: Vec<KnowledgeEntry>,
    /// Mid-tier knowledge.
    pub mid: Vec<KnowledgeEntry>,
    /// High-tier knowledge.
    pub high: Vec<KnowledgeEntry>,
    /// Environments visited.
    pub known_environments: BTreeSet<EnvironmentId>,
    /// Cached environment profiles.
    pub profiles: Vec<EnvironmentProfile>,
    /// Environment history.
    pub temporal: TemporalState,
}

impl MindSnapshot {
    /// Knowledge entries across all tiers.
    #[must_use]
    pub fn knowledge_len(&self) -> usize {
        self.low.len() + self.mid.len() + self.high.len()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// All minds in a world, keyed by agent.
#[derive(Debug, Default)]
pub struct MindRegistry {
    minds: HashMap<AgentId, AgentMind>,
}

impl MindRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The agent's mind, created on first use.
    pub fn mind_mut(&mut self, agent: AgentId, config: &MnemaConfig) -> &mut AgentMind {
        self.minds
            .entry(agent)
            .or_insert_with(|| AgentMind::new(agent, config))
    }

    /// The agent's mind, if it has one.
    #[must_use]
    pub fn get(&self, agent: AgentId) -> Option<&AgentMind> {
        self.minds.get(&agent)
    }

    /// Mutable access without creating a mind.
    pub fn get_mut(&mut self, agent: AgentId) -> Option<&mut AgentMind> {
        self.minds.get_mut(&agent)
    }

    /// The agent's mind, or [`MnemaError::UnknownAgent`].
    ///
    /// # Errors
    /// Returns `UnknownAgent` if the agent has never been initialised.
    pub fn require(&self, agent: AgentId) -> Result<&AgentMind> {
        self.minds.get(&agent).ok_or(MnemaError::UnknownAgent(agent))
    }

    /// Record an event for `agent`, initialising its mind if needed.
    pub fn record(
        &mut self,
        agent: AgentId,
        observation: Observation,
        emotional_state: f32,
        now: Tick,
        config: &MnemaConfig,
    ) -> EpisodicRecord {
        self.mind_mut(agent, config)
            .record(observation, emotional_state, now, config)
    }

    /// Nearby records of `agent`; empty for an unknown agent.
    #[must_use]
    pub fn nearby(&self, agent: AgentId, center: &Position, radius: f32) -> Vec<&EpisodicRecord> {
        self.minds
            .get(&agent)
            .map(|m| m.store.nearby(center, radius))
            .unwrap_or_default()
    }

    /// Insert a restored mind, replacing any existing one.
    pub fn insert(&mut self, mind: AgentMind) -> Option<AgentMind> {
        self.minds.insert(mind.id, mind)
    }

    /// Drop an agent's mind.
    pub fn remove(&mut self, agent: AgentId) -> Option<AgentMind> {
        self.minds.remove(&agent)
    }

    /// Agents with a mind, sorted.
    #[must_use]
    pub fn agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<AgentId> = self.minds.keys().copied().collect();
        agents.sort();
        agents
    }

    /// Number of minds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.minds.len()
    }

    /// Whether no mind exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.minds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::ScriptedRandom;
    use crate::types::EntityId;

    fn resource_at(n: u32, x: f32, y: f32) -> Percept {
        Percept::new(EntityId(n), EntityKind::Resource, Position::new(x, y))
    }

    #[test]
    fn context_exposes_position_and_flux() {
        let mut state = AgentState::new(Position::new(3.0, 4.0));
        state.flux_effect = 2;
        let ctx = state.context();
        assert_eq!(ctx.get("x").and_then(Value::as_number), Some(3.0));
        assert_eq!(ctx.get(FLUX_EFFECT_KEY).and_then(Value::as_number), Some(2.0));
        assert_eq!(ctx.get("goal").and_then(Value::as_text), Some("explore"));
    }

    #[test]
    fn tick_records_percepts_and_sets_a_goal() {
        let config = MnemaConfig::default();
        let mut mind = AgentMind::new(AgentId(1), &config);
        let mut state = AgentState::new(Position::new(10.0, 10.0));
        let mut rng = ScriptedRandom::new(vec![0.5]);
        let counters = MnemaCounters::new();

        let report = mind.tick(&mut state, &[resource_at(7, 12.0, 11.0)], 1, &mut rng, &config, Some(&counters));
        assert_eq!(report.environment, EnvironmentId(1));
        assert_eq!(report.recorded, 1);
        assert_eq!(mind.store().log().len(), 1);
        assert!(state.goal.target_position.is_some());
        assert_eq!(counters.snapshot().records_created, 1);
        assert_eq!(mind.temporal().current_environment, Some(EnvironmentId(1)));
    }

    #[test]
    fn perception_feed_is_capped() {
        let config = MnemaConfig::default();
        let mut mind = AgentMind::new(AgentId(1), &config);
        let mut state = AgentState::new(Position::new(10.0, 10.0));
        let mut rng = ScriptedRandom::new(vec![0.5]);
        let feed: Vec<Percept> = (0..15).map(|n| resource_at(n, 10.0, 10.0)).collect();
        let report = mind.tick(&mut state, &feed, 1, &mut rng, &config, None);
        assert_eq!(report.recorded, 10);
    }

    #[test]
    fn quadrant_change_is_a_transition() {
        let config = MnemaConfig::default();
        let mut mind = AgentMind::new(AgentId(1), &config);
        let mut state = AgentState::new(Position::new(10.0, 10.0));
        let mut rng = ScriptedRandom::new(vec![0.5]);
        mind.tick(&mut state, &[], 1, &mut rng, &config, None);
        state.position = Position::new(10.0, 80.0);
        let report = mind.tick(&mut state, &[], 2, &mut rng, &config, None);

        let t = report.transition.expect("transition");
        assert_eq!((t.from, t.to), (EnvironmentId(1), EnvironmentId(3)));
        assert_eq!(mind.temporal().previous_environment, Some(EnvironmentId(1)));
        assert_eq!(mind.temporal().transition_tick, Some(2));
        assert_eq!(mind.stats().transitions, 1);
    }

    #[test]
    fn fresh_low_entries_promote_before_decay() {
        let config = MnemaConfig::default();
        let mut mind = AgentMind::new(AgentId(1), &config);
        let mut state = AgentState::new(Position::new(10.0, 10.0));
        let mut rng = ScriptedRandom::new(vec![0.5]);
        let feed: Vec<Percept> = (0..5).map(|n| resource_at(n, 12.0 + n as f32, 11.0)).collect();
        for t in 40..=45 {
            mind.tick(&mut state, &feed, t, &mut rng, &config, None);
        }
        for t in 46..50 {
            mind.tick(&mut state, &[], t, &mut rng, &config, None);
        }
        assert_eq!(mind.hierarchy().counts().mid, 0);

        let report = mind.tick(&mut state, &[], 50, &mut rng, &config, None);
        let generalization = report.generalization.expect("generalization tick");
        assert_eq!(generalization.mid_created, 1);
        assert_eq!(mind.hierarchy().counts().mid, 1);
        assert!(mind.hierarchy().tier(KnowledgeLevel::Low).iter().all(|e| e.confidence < 0.6));
    }

    #[test]
    fn snapshot_restores_knowledge_and_patterns() {
        let config = MnemaConfig::default();
        let mut mind = AgentMind::new(AgentId(4), &config);
        let mut state = AgentState::new(Position::new(10.0, 10.0));
        let mut rng = ScriptedRandom::new(vec![0.5]);
        for t in 1..=4 {
            mind.tick(&mut state, &[resource_at(7, 12.0, 11.0)], t, &mut rng, &config, None);
        }
        let snapshot = mind.snapshot(4);
        assert!(snapshot.knowledge_len() > 0);

        let restored = AgentMind::restore(snapshot.clone(), &config);
        assert_eq!(restored.id(), AgentId(4));
        assert_eq!(restored.hierarchy().counts(), mind.hierarchy().counts());
        assert_eq!(restored.distiller().patterns().len(), mind.distiller().patterns().len());
        assert_eq!(restored.temporal(), mind.temporal());
    }

    #[test]
    fn registry_initialises_on_first_record() {
        let config = MnemaConfig::default();
        let mut registry = MindRegistry::new();
        assert!(registry.require(AgentId(9)).is_err());
        assert!(registry.nearby(AgentId(9), &Position::new(0.0, 0.0), 5.0).is_empty());

        let obs = Observation::new(EntityId(1), EntityKind::Hazard, Position::new(1.0, 1.0), 0.5);
        registry.record(AgentId(9), obs, 50.0, 0, &config);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.nearby(AgentId(9), &Position::new(0.0, 0.0), 5.0).len(), 1);
        assert!(registry.require(AgentId(9)).is_ok());
    }
}
