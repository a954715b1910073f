//! Decision engine — knowledge → goal directives.
//!
//! Precedence: high-tier match → mid-tier match → low-tier match → fallback
//! by current goal kind. A matched knowledge type maps to a decision kind:
//!
//! | Knowledge type        | Decision          |
//! |-----------------------|-------------------|
//! | `resource_location`   | seek resource     |
//! | `hazard_behavior`     | avoid hazard      |
//! | `obstacle_properties` | navigate obstacle |
//! | `agent_interaction`   | interact agent    |
//! | `reality_flux_effect` | adapt to flux     |
//!
//! Applying a decision rewrites the agent's [`Goal`]; that is the only side
//! effect visible outside the cognition pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DecisionConfig, KnowledgeConfig};
use crate::environment::Percept;
use crate::knowledge::{Context, KnowledgeLevel, KnowledgeMatch, KnowledgeType, KnowledgeView};
use crate::rng::RandomSource;
use crate::types::{EntityId, EntityKind, EnvironmentId, KnowledgeId, Position, Value};

/// Distance under which two targets count as the same goal.
const SAME_TARGET_DISTANCE: f32 = 1.0;

/// What the agent should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Move toward a resource.
    SeekResource,
    /// Move away from a hazard.
    AvoidHazard,
    /// Route around an obstacle.
    NavigateObstacle,
    /// Approach another agent.
    InteractAgent,
    /// Adjust to the active reality flux.
    AdaptFlux,
    /// Wander to a random point.
    Explore,
}

impl DecisionKind {
    /// Decision driven by a knowledge type.
    #[must_use]
    pub fn from_knowledge(kind: KnowledgeType) -> Self {
        match kind {
            KnowledgeType::ResourceLocation => Self::SeekResource,
            KnowledgeType::HazardBehavior => Self::AvoidHazard,
            KnowledgeType::ObstacleProperties => Self::NavigateObstacle,
            KnowledgeType::AgentInteraction => Self::InteractAgent,
            KnowledgeType::RealityFluxEffect => Self::AdaptFlux,
        }
    }

    /// Goal kind this decision sets.
    #[must_use]
    pub fn goal_kind(self) -> GoalKind {
        match self {
            Self::SeekResource => GoalKind::SeekResource,
            Self::AvoidHazard => GoalKind::AvoidHazard,
            Self::NavigateObstacle => GoalKind::Navigate,
            Self::InteractAgent => GoalKind::SocialApproach,
            Self::AdaptFlux => GoalKind::Adapt,
            Self::Explore => GoalKind::Explore,
        }
    }

    /// Snake-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SeekResource => "seek_resource",
            Self::AvoidHazard => "avoid_hazard",
            Self::NavigateObstacle => "navigate_obstacle",
            Self::InteractAgent => "interact_agent",
            Self::AdaptFlux => "adapt_flux",
            Self::Explore => "explore",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary goal kind read by the movement system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    /// Collect resources.
    SeekResource,
    /// Keep away from hazards.
    AvoidHazard,
    /// Approach other agents.
    SocialApproach,
    /// Wander.
    #[default]
    Explore,
    /// Route around obstacles.
    Navigate,
    /// Adjust to reality flux.
    Adapt,
}

impl GoalKind {
    /// Snake-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SeekResource => "seek_resource",
            Self::AvoidHazard => "avoid_hazard",
            Self::SocialApproach => "social_approach",
            Self::Explore => "explore",
            Self::Navigate => "navigate",
            Self::Adapt => "adapt",
        }
    }
}

/// The agent's current goal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Primary kind.
    pub kind: GoalKind,
    /// Where to go.
    pub target_position: Option<Position>,
    /// What to go to.
    pub target_entity: Option<EntityId>,
    /// Urgency (0.0 to 1.0).
    pub priority: f32,
    /// Progress toward the target (0 to 100).
    pub completion: f32,
    /// Agent position when the current target was set.
    pub origin: Option<Position>,
}

impl Goal {
    /// Recompute completion from the agent's current position.
    ///
    /// `100 × (1 − remaining / initial distance)`; a goal with no target
    /// keeps its completion.
    pub fn update_completion(&mut self, position: Position) {
        let (Some(target), Some(origin)) = (self.target_position, self.origin) else {
            return;
        };
        let initial = origin.distance(&target);
        self.completion = if initial <= f32::EPSILON {
            100.0
        } else {
            (100.0 * (1.0 - position.distance(&target) / initial)).clamp(0.0, 100.0)
        };
    }
}

/// Which knowledge entry drove a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionSource {
    /// Entry id.
    pub id: KnowledgeId,
    /// Entry tier.
    pub level: KnowledgeLevel,
}

/// A goal directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// What to do.
    pub kind: DecisionKind,
    /// Where.
    pub target: Option<Position>,
    /// Toward whom / what.
    pub target_entity: Option<EntityId>,
    /// Urgency (match confidence, or the fallback priority).
    pub priority: f32,
    /// Extra detail (hazard position, flux effect...).
    pub parameters: BTreeMap<String, Value>,
    /// Matched knowledge; `None` for fallbacks.
    pub source: Option<DecisionSource>,
}

/// Everything the engine needs to know about the agent this tick.
#[derive(Debug, Clone)]
pub struct Situation {
    /// Agent position.
    pub position: Position,
    /// Current goal kind (drives the fallback).
    pub goal_kind: GoalKind,
    /// Current environment.
    pub environment: EnvironmentId,
    /// This tick's perception feed.
    pub percepts: Vec<Percept>,
    /// Properties exposed to knowledge matching.
    pub context: Context,
}

impl Situation {
    fn nearest(&self, kind: EntityKind) -> Option<&Percept> {
        self.percepts
            .iter()
            .filter(|p| p.kind == kind)
            .min_by(|a, b| {
                a.position
                    .distance(&self.position)
                    .total_cmp(&b.position.distance(&self.position))
            })
    }
}

/// Counts of decisions by source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionStats {
    /// Decisions driven by high-tier knowledge.
    pub high: u64,
    /// Decisions driven by mid-tier knowledge.
    pub mid: u64,
    /// Decisions driven by low-tier knowledge.
    pub low: u64,
    /// Fallback decisions.
    pub fallback: u64,
}

/// Per-agent decision engine.
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    stats: DecisionStats,
}

impl DecisionEngine {
    /// Create an engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decisions made so far, by source.
    #[must_use]
    pub fn stats(&self) -> DecisionStats {
        self.stats
    }

    /// Pick a decision: best high-tier match, else mid, else low, else a
    /// fallback for the current goal kind.
    pub fn decide(
        &mut self,
        knowledge: &dyn KnowledgeView,
        situation: &Situation,
        rng: &mut dyn RandomSource,
        knowledge_config: &KnowledgeConfig,
        config: &DecisionConfig,
    ) -> Decision {
        for level in [KnowledgeLevel::High, KnowledgeLevel::Mid, KnowledgeLevel::Low] {
            let matches = knowledge.find_applicable(level, &situation.context, situation.environment, knowledge_config);
            if let Some(best) = matches.into_iter().next() {
                match level {
                    KnowledgeLevel::High => self.stats.high += 1,
                    KnowledgeLevel::Mid => self.stats.mid += 1,
                    KnowledgeLevel::Low => self.stats.low += 1,
                }
                let decision = from_knowledge(&best, situation, config);
                debug!(
                    decision = %decision.kind,
                    level = %level,
                    knowledge = %best.id,
                    score = best.score.value(),
                    "Knowledge-driven decision"
                );
                return decision;
            }
        }
        self.stats.fallback += 1;
        let decision = fallback(situation, rng, config);
        debug!(decision = %decision.kind, goal = situation.goal_kind.as_str(), "Fallback decision");
        decision
    }
}

fn outcome_target(outcome: &BTreeMap<String, Value>) -> Option<Position> {
    let x = outcome.get("target_x").and_then(Value::as_number)?;
    let y = outcome.get("target_y").and_then(Value::as_number)?;
    Some(Position::new(x, y))
}

/// Point `distance` away from `threat`, on the far side of `from`, clamped
/// to the world.
fn retreat_point(from: Position, threat: Position, config: &DecisionConfig) -> Position {
    let dx = from.x - threat.x;
    let dy = from.y - threat.y;
    let len = (dx * dx + dy * dy).sqrt();
    let (ux, uy) = if len <= f32::EPSILON { (1.0, 0.0) } else { (dx / len, dy / len) };
    Position::new(
        (from.x + ux * config.retreat_distance).clamp(0.0, config.world_width),
        (from.y + uy * config.retreat_distance).clamp(0.0, config.world_height),
    )
}

fn from_knowledge(matched: &KnowledgeMatch, situation: &Situation, config: &DecisionConfig) -> Decision {
    let kind = DecisionKind::from_knowledge(matched.kind);
    let mut parameters = matched.outcome.clone();
    parameters.insert("match_confidence".to_string(), Value::Number(matched.score.value()));
    let learned = outcome_target(&matched.outcome);

    let target = match kind {
        DecisionKind::AvoidHazard => {
            let threat = learned
                .or_else(|| situation.nearest(EntityKind::Hazard).map(|p| p.position))
                .unwrap_or(situation.position);
            parameters.insert("hazard_x".to_string(), Value::Number(threat.x));
            parameters.insert("hazard_y".to_string(), Value::Number(threat.y));
            Some(retreat_point(situation.position, threat, config))
        }
        DecisionKind::AdaptFlux => learned.or(Some(situation.position)),
        _ => learned,
    };

    Decision {
        kind,
        target,
        target_entity: None,
        priority: matched.score.value().clamp(0.0, 1.0),
        parameters,
        source: Some(DecisionSource {
            id: matched.id,
            level: matched.level,
        }),
    }
}

fn explore(rng: &mut dyn RandomSource, config: &DecisionConfig) -> Decision {
    let target = Position::new(
        rng.next_range(0.0, config.world_width),
        rng.next_range(0.0, config.world_height),
    );
    Decision {
        kind: DecisionKind::Explore,
        target: Some(target),
        target_entity: None,
        priority: config.fallback_priority,
        parameters: BTreeMap::new(),
        source: None,
    }
}

fn toward(kind: DecisionKind, percept: &Percept, config: &DecisionConfig) -> Decision {
    Decision {
        kind,
        target: Some(percept.position),
        target_entity: Some(percept.entity),
        priority: config.fallback_priority,
        parameters: BTreeMap::new(),
        source: None,
    }
}

/// Hardcoded behaviour for the current goal kind when no knowledge applies.
#[must_use]
pub fn fallback(situation: &Situation, rng: &mut dyn RandomSource, config: &DecisionConfig) -> Decision {
    match situation.goal_kind {
        GoalKind::SeekResource => situation
            .nearest(EntityKind::Resource)
            .map(|p| toward(DecisionKind::SeekResource, p, config)),
        GoalKind::SocialApproach => situation
            .nearest(EntityKind::Agent)
            .map(|p| toward(DecisionKind::InteractAgent, p, config)),
        GoalKind::AvoidHazard => situation.nearest(EntityKind::Hazard).map(|p| {
            let mut parameters = BTreeMap::new();
            parameters.insert("hazard_x".to_string(), Value::Number(p.position.x));
            parameters.insert("hazard_y".to_string(), Value::Number(p.position.y));
            Decision {
                kind: DecisionKind::AvoidHazard,
                target: Some(retreat_point(situation.position, p.position, config)),
                target_entity: Some(p.entity),
                priority: config.fallback_priority,
                parameters,
                source: None,
            }
        }),
        GoalKind::Explore | GoalKind::Navigate | GoalKind::Adapt => None,
    }
    .unwrap_or_else(|| explore(rng, config))
}

/// Write a decision into the agent's goal.
///
/// Progress is kept when the goal kind and target are unchanged; otherwise
/// the goal restarts from `position` with zero completion. Returns `true`
/// when the goal restarted.
pub fn apply(decision: &Decision, goal: &mut Goal, position: Position) -> bool {
    let kind = decision.kind.goal_kind();
    let same_target = match (goal.target_position, decision.target) {
        (Some(a), Some(b)) => a.distance(&b) <= SAME_TARGET_DISTANCE,
        (None, None) => true,
        _ => false,
    };
    let restarted = goal.kind != kind || !same_target;
    if restarted {
        goal.origin = Some(position);
        goal.completion = 0.0;
    }
    goal.kind = kind;
    goal.target_position = decision.target;
    goal.target_entity = decision.target_entity;
    goal.priority = decision.priority;
    restarted
}

/// Whether the goal counts as a success for feedback purposes.
#[must_use]
pub fn is_success(goal: &Goal, config: &DecisionConfig) -> bool {
    goal.completion > config.success_completion_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{Condition, KnowledgeEntry, KnowledgeHierarchy, KnowledgePattern};
    use crate::rng::ScriptedRandom;

    fn situation(goal_kind: GoalKind, percepts: Vec<Percept>) -> Situation {
        let mut context = Context::new();
        context.insert("x".into(), Value::Number(10.0));
        context.insert("y".into(), Value::Number(10.0));
        Situation {
            position: Position::new(10.0, 10.0),
            goal_kind,
            environment: EnvironmentId(1),
            percepts,
            context,
        }
    }

    fn entry(kind: KnowledgeType, level: KnowledgeLevel, conf: f32) -> KnowledgeEntry {
        let mut outcome = BTreeMap::new();
        outcome.insert("target_x".to_string(), Value::Number(12.0));
        outcome.insert("target_y".to_string(), Value::Number(11.0));
        let pattern = KnowledgePattern {
            kind,
            conditions: vec![Condition::near("x", 10.0, 15.0), Condition::near("y", 10.0, 15.0)],
            outcome,
        };
        KnowledgeEntry::new(pattern, level, conf, EnvironmentId(1), 0)
    }

    #[test]
    fn knowledge_types_map_to_decisions() {
        assert_eq!(DecisionKind::from_knowledge(KnowledgeType::ResourceLocation), DecisionKind::SeekResource);
        assert_eq!(DecisionKind::from_knowledge(KnowledgeType::HazardBehavior), DecisionKind::AvoidHazard);
        assert_eq!(DecisionKind::from_knowledge(KnowledgeType::ObstacleProperties), DecisionKind::NavigateObstacle);
        assert_eq!(DecisionKind::from_knowledge(KnowledgeType::AgentInteraction), DecisionKind::InteractAgent);
        assert_eq!(DecisionKind::from_knowledge(KnowledgeType::RealityFluxEffect), DecisionKind::AdaptFlux);
    }

    #[test]
    fn high_tier_wins_over_lower_tiers() {
        let kc = KnowledgeConfig::default();
        let dc = DecisionConfig::default();
        let mut h = KnowledgeHierarchy::new();
        h.insert(entry(KnowledgeType::ResourceLocation, KnowledgeLevel::Low, 0.99), &kc);
        h.insert(entry(KnowledgeType::AgentInteraction, KnowledgeLevel::Mid, 0.95), &kc);
        let high = entry(KnowledgeType::HazardBehavior, KnowledgeLevel::High, 0.8);
        let high_id = high.id;
        h.insert(high, &kc);

        let mut engine = DecisionEngine::new();
        let mut rng = ScriptedRandom::new(vec![0.5]);
        let d = engine.decide(&h, &situation(GoalKind::Explore, Vec::new()), &mut rng, &kc, &dc);
        assert_eq!(d.kind, DecisionKind::AvoidHazard);
        assert_eq!(d.source.map(|s| s.id), Some(high_id));
        assert_eq!(engine.stats().high, 1);
        // Retreat leads away from the learned hazard at (12, 11).
        let hazard = Position::new(12.0, 11.0);
        let target = d.target.expect("retreat target");
        assert!(target.distance(&hazard) > Position::new(10.0, 10.0).distance(&hazard));
        assert!(target.x >= 0.0 && target.x < 10.0);
    }

    #[test]
    fn fallback_follows_goal_kind() {
        let dc = DecisionConfig::default();
        let mut rng = ScriptedRandom::new(vec![0.25, 0.75]);
        let feed = vec![
            Percept::new(EntityId(1), EntityKind::Resource, Position::new(30.0, 30.0)),
            Percept::new(EntityId(2), EntityKind::Resource, Position::new(12.0, 10.0)),
        ];
        let d = fallback(&situation(GoalKind::SeekResource, feed), &mut rng, &dc);
        assert_eq!(d.kind, DecisionKind::SeekResource);
        assert_eq!(d.target_entity, Some(EntityId(2)));
        assert!((d.priority - 0.3).abs() < f32::EPSILON);

        let d = fallback(&situation(GoalKind::SocialApproach, Vec::new()), &mut rng, &dc);
        assert_eq!(d.kind, DecisionKind::Explore);
        assert_eq!(d.target, Some(Position::new(25.0, 75.0)));
    }

    #[test]
    fn empty_hierarchy_falls_back() {
        let mut engine = DecisionEngine::new();
        let mut rng = ScriptedRandom::new(vec![0.1]);
        let d = engine.decide(
            &KnowledgeHierarchy::new(),
            &situation(GoalKind::Explore, Vec::new()),
            &mut rng,
            &KnowledgeConfig::default(),
            &DecisionConfig::default(),
        );
        assert_eq!(d.kind, DecisionKind::Explore);
        assert!(d.source.is_none());
        assert_eq!(engine.stats().fallback, 1);
    }

    #[test]
    fn apply_keeps_progress_for_same_target() {
        let dc = DecisionConfig::default();
        let decision = Decision {
            kind: DecisionKind::SeekResource,
            target: Some(Position::new(20.0, 10.0)),
            target_entity: None,
            priority: 0.8,
            parameters: BTreeMap::new(),
            source: None,
        };
        let mut goal = Goal::default();
        assert!(apply(&decision, &mut goal, Position::new(10.0, 10.0)));
        assert_eq!(goal.kind, GoalKind::SeekResource);
        assert!(!is_success(&goal, &dc));

        goal.update_completion(Position::new(16.0, 10.0));
        assert!((goal.completion - 60.0).abs() < 1e-4);
        assert!(!apply(&decision, &mut goal, Position::new(16.0, 10.0)));
        assert!(is_success(&goal, &dc));

        let elsewhere = Decision {
            target: Some(Position::new(0.0, 0.0)),
            ..decision
        };
        assert!(apply(&elsewhere, &mut goal, Position::new(16.0, 10.0)));
        assert!((goal.completion).abs() < f32::EPSILON);
    }
}
