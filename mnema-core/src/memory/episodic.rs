//! Episodic records — "What I perceived".
//!
//! A record is created once per perception (or synthetic event) and is never
//! edited afterwards except by importance decay. Reconstruction produces a
//! brand-new record instead of rewriting history.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{EntityId, EntityKind, Position, RecordId, Tick, Value};

/// Source entity used for records the agent generated itself.
pub const SELF_SOURCE: EntityId = EntityId(u32::MAX);

/// Context flag marking the record that observed a reality shift.
pub const REALITY_SHIFT_FLAG: &str = "realityShift";

/// Tag carried by reconstructed records.
pub const RECONSTRUCTED_TAG: &str = "reconstructed";

/// A single episodic memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicRecord {
    /// Unique identifier for this record.
    pub id: RecordId,
    /// When the perception happened.
    pub timestamp: Tick,
    /// What was perceived.
    pub source_entity: EntityId,
    /// Classification of the perceived entity.
    pub source_kind: EntityKind,
    /// Where it was perceived.
    pub position: Position,
    /// How significant the record is (0.0 to 1.0). Decays over time.
    pub importance: f32,
    /// How accurate the record is (0.0 to 1.0).
    pub fidelity: f32,
    /// Free-form context captured with the record.
    pub context: BTreeMap<String, Value>,
    /// Labels (e.g. `"dream"`, `"reconstructed"`).
    pub tags: BTreeSet<String>,
    /// Emotional charge at formation time (0 to 100).
    pub emotional_impact: f32,
}

impl EpisodicRecord {
    /// Whether this record carries the reality-shift flag.
    #[must_use]
    pub fn marks_reality_shift(&self) -> bool {
        self.context
            .get(REALITY_SHIFT_FLAG)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Age in ticks at `now` (zero if the record is from the future).
    #[must_use]
    pub fn age(&self, now: Tick) -> Tick {
        now.saturating_sub(self.timestamp)
    }

    /// Whether this record carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Input to the episodic store: one perceived (or imagined) event.
#[derive(Debug, Clone)]
pub struct Observation {
    /// What was perceived.
    pub entity: EntityId,
    /// Kind of the perceived entity.
    pub kind: EntityKind,
    /// Where it was perceived.
    pub position: Position,
    /// Base importance before salience adjustment.
    pub importance: f32,
    /// Perception accuracy.
    pub fidelity: f32,
    /// Extra context.
    pub context: BTreeMap<String, Value>,
    /// Extra tags.
    pub tags: BTreeSet<String>,
    /// Emotional charge (0 to 100).
    pub emotional_impact: f32,
}

impl Observation {
    /// A plain perception with full fidelity and no emotional charge.
    #[must_use]
    pub fn new(entity: EntityId, kind: EntityKind, position: Position, importance: f32) -> Self {
        Self {
            entity,
            kind,
            position,
            importance,
            fidelity: 1.0,
            context: BTreeMap::new(),
            tags: BTreeSet::new(),
            emotional_impact: 0.0,
        }
    }

    /// A self-generated event (dream, narrative, imagination).
    #[must_use]
    pub fn synthetic(source: SyntheticSource, position: Position, importance: f32) -> Self {
        let mut obs = Self::new(SELF_SOURCE, EntityKind::Synthetic, position, importance);
        obs.fidelity = source.fidelity();
        obs.tags.insert(source.tag().to_string());
        obs
    }

    /// Attach a context value.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Override fidelity.
    #[must_use]
    pub fn with_fidelity(mut self, fidelity: f32) -> Self {
        self.fidelity = fidelity;
        self
    }

    /// Set emotional charge.
    #[must_use]
    pub fn with_emotional_impact(mut self, impact: f32) -> Self {
        self.emotional_impact = impact;
        self
    }

    /// Mark this observation as the one that witnessed a reality shift.
    #[must_use]
    pub fn with_reality_shift(self) -> Self {
        self.with_context(REALITY_SHIFT_FLAG, true)
    }
}

/// Where a synthetic record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticSource {
    /// Offline replay while resting.
    Dream,
    /// A story the agent told itself or heard.
    Narrative,
    /// A hypothetical scenario.
    Imagination,
}

impl SyntheticSource {
    /// Tag attached to records of this source.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Dream => "dream",
            Self::Narrative => "narrative",
            Self::Imagination => "imagination",
        }
    }

    /// Synthetic records are less reliable than perception.
    #[must_use]
    pub fn fidelity(self) -> f32 {
        match self {
            Self::Dream => 0.4,
            Self::Narrative => 0.6,
            Self::Imagination => 0.3,
        }
    }
}
