//! Environment tracking — "Where am I, and is it like where I was?"
//!
//! An environment is a coarse partition of agent state:
//!
//! ```text
//! override (if set)  →  id as given
//! flux effect e > 0  →  1000 + e          (disjoint from spatial ids)
//! otherwise          →  quadrant + 1      (1..=4, split at the world centre)
//! ```
//!
//! Each visited environment keeps an EMA profile of what the agent perceives
//! there. Profiles live in an LRU cache (default 5); evicted environments fall
//! back to the heuristic similarity until they are profiled again.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EnvironmentConfig;
use crate::types::{EntityId, EntityKind, EnvironmentId, Position, Tick};

/// One entry of the perception feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percept {
    /// Perceived entity.
    pub entity: EntityId,
    /// Its kind.
    pub kind: EntityKind,
    /// Where it is.
    pub position: Position,
}

impl Percept {
    /// Create a percept.
    #[must_use]
    pub fn new(entity: EntityId, kind: EntityKind, position: Position) -> Self {
        Self { entity, kind, position }
    }
}

/// Detect the environment id from agent state.
#[must_use]
pub fn detect_environment(
    position: Position,
    flux_effect: u8,
    global_override: Option<EnvironmentId>,
    config: &EnvironmentConfig,
) -> EnvironmentId {
    if let Some(id) = global_override {
        return id;
    }
    if flux_effect > 0 {
        return EnvironmentId(EnvironmentId::FLUX_BASE + u32::from(flux_effect));
    }
    let east = u32::from(position.x >= config.world_center_x);
    let south = u32::from(position.y >= config.world_center_y);
    EnvironmentId(east + 2 * south + 1)
}

/// Similarity of two environments without profiles.
///
/// Same id → 1.0; flux vs non-flux → 0.2; ids 1 or 2 apart → 0.6; else 0.4.
#[must_use]
pub fn heuristic_similarity(a: EnvironmentId, b: EnvironmentId) -> f32 {
    if a == b {
        return 1.0;
    }
    if a.is_flux() != b.is_flux() {
        return 0.2;
    }
    match a.0.abs_diff(b.0) {
        1 | 2 => 0.6,
        _ => 0.4,
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Spatial characteristics of an environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialFeatures {
    /// Mean agent-to-percept distance.
    pub mean_distance: f32,
    /// Percepts per tick relative to the perception feed size.
    pub density: f32,
    /// Mean percept distance to the percept centroid.
    pub spread: f32,
}

/// How stable an environment is tick to tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StabilityMetrics {
    /// Share of percepts not seen on the previous tick.
    pub turnover: f32,
    /// Share of percepts that are hazards.
    pub hazard_ratio: f32,
}

/// EMA summary of what an agent perceives in one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentProfile {
    /// Environment.
    pub id: EnvironmentId,
    /// Share of each perceivable kind.
    pub entity_distribution: BTreeMap<EntityKind, f32>,
    /// Spatial characteristics.
    pub spatial: SpatialFeatures,
    /// Stability metrics.
    pub stability: StabilityMetrics,
    /// Ticks with percepts folded into the profile.
    pub visit_count: u64,
    /// Last update.
    pub last_updated: Tick,
}

fn ema(old: f32, new: f32, alpha: f32, first: bool) -> f32 {
    if first { new } else { old * (1.0 - alpha) + new * alpha }
}

impl EnvironmentProfile {
    /// Create an empty profile.
    #[must_use]
    pub fn new(id: EnvironmentId, now: Tick) -> Self {
        Self {
            id,
            entity_distribution: EntityKind::PERCEIVABLE.iter().map(|k| (*k, 0.0)).collect(),
            spatial: SpatialFeatures::default(),
            stability: StabilityMetrics::default(),
            visit_count: 0,
            last_updated: now,
        }
    }

    /// Whether at least one tick of percepts has been folded in.
    #[must_use]
    pub fn is_profiled(&self) -> bool {
        self.visit_count > 0
    }

    /// Fold one tick of percepts into the profile.
    pub fn observe(
        &mut self,
        percepts: &[Percept],
        agent_position: Position,
        previously_seen: &BTreeSet<EntityId>,
        now: Tick,
        config: &EnvironmentConfig,
    ) {
        self.last_updated = now;
        if percepts.is_empty() {
            return;
        }
        let alpha = config.profile_smoothing.clamp(0.0, 1.0);
        let first = self.visit_count == 0;
        let n = percepts.len() as f32;

        for kind in EntityKind::PERCEIVABLE {
            let share = percepts.iter().filter(|p| p.kind == kind).count() as f32 / n;
            let slot = self.entity_distribution.entry(kind).or_insert(0.0);
            *slot = ema(*slot, share, alpha, first);
        }

        let mean_distance = percepts.iter().map(|p| p.position.distance(&agent_position)).sum::<f32>() / n;
        let centroid = Position::new(
            percepts.iter().map(|p| p.position.x).sum::<f32>() / n,
            percepts.iter().map(|p| p.position.y).sum::<f32>() / n,
        );
        let spread = percepts.iter().map(|p| p.position.distance(&centroid)).sum::<f32>() / n;
        let density = (n / config.perception_capacity.max(1) as f32).min(1.0);
        self.spatial = SpatialFeatures {
            mean_distance: ema(self.spatial.mean_distance, mean_distance, alpha, first),
            density: ema(self.spatial.density, density, alpha, first),
            spread: ema(self.spatial.spread, spread, alpha, first),
        };

        let new_entities = percepts.iter().filter(|p| !previously_seen.contains(&p.entity)).count() as f32;
        let hazards = percepts.iter().filter(|p| p.kind == EntityKind::Hazard).count() as f32;
        self.stability = StabilityMetrics {
            turnover: ema(self.stability.turnover, new_entities / n, alpha, first),
            hazard_ratio: ema(self.stability.hazard_ratio, hazards / n, alpha, first),
        };
        self.visit_count += 1;
    }
}

fn unit_similarity(a: f32, b: f32) -> f32 {
    (1.0 - (a - b).abs()).clamp(0.0, 1.0)
}

fn scaled_similarity(a: f32, b: f32) -> f32 {
    let scale = a.abs().max(b.abs()).max(1.0);
    (1.0 - (a - b).abs() / scale).clamp(0.0, 1.0)
}

/// Mean per-feature similarity of two profiles (1.0 = identical).
#[must_use]
pub fn profile_similarity(a: &EnvironmentProfile, b: &EnvironmentProfile) -> f32 {
    let mut scores: Vec<f32> = EntityKind::PERCEIVABLE
        .iter()
        .map(|kind| {
            let x = a.entity_distribution.get(kind).copied().unwrap_or(0.0);
            let y = b.entity_distribution.get(kind).copied().unwrap_or(0.0);
            unit_similarity(x, y)
        })
        .collect();
    scores.push(scaled_similarity(a.spatial.mean_distance, b.spatial.mean_distance));
    scores.push(unit_similarity(a.spatial.density, b.spatial.density));
    scores.push(scaled_similarity(a.spatial.spread, b.spatial.spread));
    scores.push(unit_similarity(a.stability.turnover, b.stability.turnover));
    scores.push(unit_similarity(a.stability.hazard_ratio, b.stability.hazard_ratio));
    scores.iter().sum::<f32>() / scores.len() as f32
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// A detected change of environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentTransition {
    /// Environment left.
    pub from: EnvironmentId,
    /// Environment entered.
    pub to: EnvironmentId,
    /// Similarity between them.
    pub similarity: f32,
    /// When it happened.
    pub tick: Tick,
    /// Similarity fell under the transition threshold.
    pub requires_adaptation: bool,
}

/// Per-agent environment tracker.
#[derive(Debug)]
pub struct EnvironmentTracker {
    current: Option<EnvironmentId>,
    previous: Option<EnvironmentId>,
    similarity: f32,
    last_transition: Option<Tick>,
    transitions: u64,
    profiles: LruCache<EnvironmentId, EnvironmentProfile>,
    last_seen: BTreeSet<EntityId>,
}

impl EnvironmentTracker {
    /// Create a tracker with an empty profile cache.
    #[must_use]
    pub fn new(config: &EnvironmentConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_cached_profiles).unwrap_or(NonZeroUsize::MIN);
        Self {
            current: None,
            previous: None,
            similarity: 1.0,
            last_transition: None,
            transitions: 0,
            profiles: LruCache::new(capacity),
            last_seen: BTreeSet::new(),
        }
    }

    /// Enter (or stay in) `environment` and fold this tick's percepts into its
    /// profile. Returns the transition if the environment changed.
    pub fn update(
        &mut self,
        environment: EnvironmentId,
        percepts: &[Percept],
        agent_position: Position,
        now: Tick,
        config: &EnvironmentConfig,
    ) -> Option<EnvironmentTransition> {
        let transition = match self.current {
            Some(current) if current != environment => {
                let similarity = self.similarity(current, environment);
                self.previous = Some(current);
                self.similarity = similarity;
                self.last_transition = Some(now);
                self.transitions += 1;
                let requires_adaptation = similarity < config.transition_threshold;
                info!(
                    from = %current,
                    to = %environment,
                    similarity,
                    requires_adaptation,
                    tick = now,
                    "Environment transition"
                );
                Some(EnvironmentTransition {
                    from: current,
                    to: environment,
                    similarity,
                    tick: now,
                    requires_adaptation,
                })
            }
            _ => None,
        };
        self.current = Some(environment);

        if let Some(profile) = self.profiles.get_mut(&environment) {
            profile.observe(percepts, agent_position, &self.last_seen, now, config);
        } else {
            let mut profile = EnvironmentProfile::new(environment, now);
            profile.observe(percepts, agent_position, &self.last_seen, now, config);
            if let Some((evicted, _)) = self.profiles.push(environment, profile) {
                if evicted != environment {
                    debug!(evicted = %evicted, "Environment profile evicted from cache");
                }
            }
        }
        self.last_seen = percepts.iter().map(|p| p.entity).collect();
        transition
    }

    /// Similarity of two environments: profiled comparison when both have
    /// profiles, heuristic otherwise. Does not touch LRU order.
    #[must_use]
    pub fn similarity(&self, a: EnvironmentId, b: EnvironmentId) -> f32 {
        if a == b {
            return 1.0;
        }
        match (self.profiles.peek(&a), self.profiles.peek(&b)) {
            (Some(pa), Some(pb)) if pa.is_profiled() && pb.is_profiled() => profile_similarity(pa, pb),
            _ => heuristic_similarity(a, b),
        }
    }

    /// Current environment.
    #[must_use]
    pub fn current(&self) -> Option<EnvironmentId> {
        self.current
    }

    /// Environment before the last transition.
    #[must_use]
    pub fn previous(&self) -> Option<EnvironmentId> {
        self.previous
    }

    /// Similarity computed at the last transition (1.0 before any).
    #[must_use]
    pub fn last_similarity(&self) -> f32 {
        self.similarity
    }

    /// Tick of the last transition.
    #[must_use]
    pub fn last_transition(&self) -> Option<Tick> {
        self.last_transition
    }

    /// Number of transitions so far.
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Cached profile, without touching LRU order.
    #[must_use]
    pub fn profile(&self, id: EnvironmentId) -> Option<&EnvironmentProfile> {
        self.profiles.peek(&id)
    }

    /// Cached profiles, most recently used first.
    #[must_use]
    pub fn profiles(&self) -> Vec<EnvironmentProfile> {
        self.profiles.iter().map(|(_, p)| p.clone()).collect()
    }

    /// Re-seed the cache from persisted profiles (most recently used first).
    pub fn restore_profiles(&mut self, profiles: Vec<EnvironmentProfile>) {
        for profile in profiles.into_iter().rev() {
            self.profiles.put(profile.id, profile);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn percepts(kind: EntityKind, n: u32, base: f32) -> Vec<Percept> {
        (0..n)
            .map(|i| Percept::new(EntityId(i), kind, Position::new(base + i as f32, base)))
            .collect()
    }

    #[test]
    fn detection_order_is_override_flux_quadrant() {
        let config = EnvironmentConfig::default();
        let p = Position::new(10.0, 10.0);
        assert_eq!(detect_environment(p, 0, None, &config), EnvironmentId(1));
        assert_eq!(detect_environment(Position::new(60.0, 10.0), 0, None, &config), EnvironmentId(2));
        assert_eq!(detect_environment(Position::new(10.0, 60.0), 0, None, &config), EnvironmentId(3));
        assert_eq!(detect_environment(Position::new(50.0, 50.0), 0, None, &config), EnvironmentId(4));
        assert_eq!(detect_environment(p, 2, None, &config), EnvironmentId(1002));
        assert_eq!(detect_environment(p, 2, Some(EnvironmentId(7)), &config), EnvironmentId(7));
    }

    #[test]
    fn heuristic_table() {
        assert!((heuristic_similarity(EnvironmentId(1), EnvironmentId(1001)) - 0.2).abs() < f32::EPSILON);
        assert!((heuristic_similarity(EnvironmentId(1), EnvironmentId(2)) - 0.6).abs() < f32::EPSILON);
        assert!((heuristic_similarity(EnvironmentId(1), EnvironmentId(3)) - 0.6).abs() < f32::EPSILON);
        assert!((heuristic_similarity(EnvironmentId(1), EnvironmentId(4)) - 0.4).abs() < f32::EPSILON);
        assert!((heuristic_similarity(EnvironmentId(1001), EnvironmentId(1003)) - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn identical_profiles_are_fully_similar() {
        let config = EnvironmentConfig::default();
        let mut a = EnvironmentProfile::new(EnvironmentId(1), 0);
        let mut b = EnvironmentProfile::new(EnvironmentId(2), 0);
        let feed = percepts(EntityKind::Resource, 4, 10.0);
        a.observe(&feed, Position::new(0.0, 0.0), &BTreeSet::new(), 1, &config);
        b.observe(&feed, Position::new(0.0, 0.0), &BTreeSet::new(), 1, &config);
        assert!((profile_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn profile_uses_ema_after_first_visit() {
        let config = EnvironmentConfig::default();
        let mut p = EnvironmentProfile::new(EnvironmentId(1), 0);
        p.observe(&percepts(EntityKind::Resource, 2, 0.0), Position::new(0.0, 0.0), &BTreeSet::new(), 1, &config);
        assert!((p.entity_distribution[&EntityKind::Resource] - 1.0).abs() < f32::EPSILON);
        p.observe(&percepts(EntityKind::Hazard, 2, 0.0), Position::new(0.0, 0.0), &BTreeSet::new(), 2, &config);
        assert!((p.entity_distribution[&EntityKind::Resource] - 0.8).abs() < 1e-6);
        assert!((p.entity_distribution[&EntityKind::Hazard] - 0.2).abs() < 1e-6);
        assert_eq!(p.visit_count, 2);
    }

    #[test]
    fn transition_uses_profiles_once_both_exist() {
        let config = EnvironmentConfig::default();
        let mut tracker = EnvironmentTracker::new(&config);
        let origin = Position::new(0.0, 0.0);
        assert!(tracker.update(EnvironmentId(1), &percepts(EntityKind::Resource, 5, 5.0), origin, 1, &config).is_none());

        // Unprofiled destination: heuristic.
        let t = tracker
            .update(EnvironmentId(4), &percepts(EntityKind::Hazard, 5, 40.0), origin, 2, &config)
            .expect("changed");
        assert!((t.similarity - 0.4).abs() < f32::EPSILON);
        assert!(t.requires_adaptation);

        // Both profiled now: feature comparison.
        let back = tracker
            .update(EnvironmentId(1), &percepts(EntityKind::Resource, 5, 5.0), origin, 3, &config)
            .expect("changed back");
        assert!(back.similarity < 0.6);
        assert!(back.similarity > 0.0);
        assert!((back.similarity - heuristic_similarity(EnvironmentId(4), EnvironmentId(1))).abs() > f32::EPSILON);
        assert_eq!(tracker.previous(), Some(EnvironmentId(4)));
        assert_eq!(tracker.transitions(), 2);
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let config = EnvironmentConfig {
            max_cached_profiles: 2,
            ..EnvironmentConfig::default()
        };
        let mut tracker = EnvironmentTracker::new(&config);
        let feed = percepts(EntityKind::Resource, 1, 0.0);
        for (tick, env) in [1, 2, 3].into_iter().enumerate() {
            tracker.update(EnvironmentId(env), &feed, Position::new(0.0, 0.0), tick as u64, &config);
        }
        assert!(tracker.profile(EnvironmentId(1)).is_none());
        assert!(tracker.profile(EnvironmentId(3)).is_some());
        assert_eq!(tracker.profiles().len(), 2);
    }
}
