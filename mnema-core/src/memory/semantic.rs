//! Semantic patterns — "What keeps happening".
//!
//! A pattern is a recurring regularity distilled from the episodic log, with
//! a confidence score and the ids of the records that support it. One
//! pattern set is kept per agent; each distillation pass merges into it.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{EntityKind, RecordId, Tick};

/// Rule kinds the distiller can extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PatternType {
    /// Records of `reference` kind tend to appear near `target` kind.
    Proximity {
        /// Kind being counted.
        reference: EntityKind,
        /// Kind it is found near.
        target: EntityKind,
    },
    /// Records of `kind` tend to appear in groups.
    Clustering {
        /// Clustered kind.
        kind: EntityKind,
    },
    /// Whether `kind` entities stay put across a reality shift.
    ShiftStability {
        /// Observed kind.
        kind: EntityKind,
    },
    /// Perceiving `from` tends to be followed by perceiving `to`.
    Sequence {
        /// Earlier kind.
        from: EntityKind,
        /// Later kind.
        to: EntityKind,
    },
}

impl PatternType {
    /// Stable identifier, e.g. `resource_obstacle_proximity` or `resource->hazard`.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Proximity { reference, target } => format!("{reference}_{target}_proximity"),
            Self::Clustering { kind } => format!("{kind}_clustering"),
            Self::ShiftStability { kind } => format!("{kind}_shift_stability"),
            Self::Sequence { from, to } => format!("{from}->{to}"),
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A distilled regularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticPattern {
    /// Which rule produced it.
    pub pattern_type: PatternType,
    /// Human-readable rule.
    pub rule_description: String,
    /// Confidence (0.0 to 1.0).
    pub confidence: f32,
    /// Number of records the confidence was computed over.
    pub source_count: u32,
    /// When first distilled.
    pub created: Tick,
    /// When last re-observed.
    pub last_confirmed: Tick,
    /// Supporting records.
    pub evidence: BTreeSet<RecordId>,
}

impl SemanticPattern {
    /// Create a new pattern.
    #[must_use]
    pub fn new(
        pattern_type: PatternType,
        rule_description: impl Into<String>,
        confidence: f32,
        source_count: u32,
        now: Tick,
        evidence: BTreeSet<RecordId>,
    ) -> Self {
        Self {
            pattern_type,
            rule_description: rule_description.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source_count,
            created: now,
            last_confirmed: now,
            evidence,
        }
    }

    /// Fold a freshly distilled pattern of the same type into this one.
    ///
    /// Confidence becomes the count-weighted mean; evidence is the union.
    pub fn merge(&mut self, other: Self) {
        let total = self.source_count + other.source_count;
        if total > 0 {
            self.confidence = (self.confidence * self.source_count as f32
                + other.confidence * other.source_count as f32)
                / total as f32;
        }
        self.source_count = total;
        self.last_confirmed = self.last_confirmed.max(other.last_confirmed);
        self.rule_description = other.rule_description;
        self.evidence.extend(other.evidence);
    }
}

/// Per-agent set of active patterns, at most one per [`PatternType`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternSet {
    patterns: Vec<SemanticPattern>,
}

impl PatternSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge freshly distilled patterns, then keep at most `max_patterns`
    /// (lowest confidence dropped first).
    pub fn merge_all(&mut self, fresh: Vec<SemanticPattern>, max_patterns: usize) {
        for pattern in fresh {
            match self
                .patterns
                .iter_mut()
                .find(|p| p.pattern_type == pattern.pattern_type)
            {
                Some(existing) => existing.merge(pattern),
                None => self.patterns.push(pattern),
            }
        }
        if self.patterns.len() > max_patterns {
            self.patterns
                .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
            self.patterns.truncate(max_patterns);
        }
    }

    /// Pattern of the given type, if present.
    #[must_use]
    pub fn get(&self, pattern_type: &PatternType) -> Option<&SemanticPattern> {
        self.patterns.iter().find(|p| &p.pattern_type == pattern_type)
    }

    /// Pattern by identifier (e.g. `"resource_clustering"`).
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&SemanticPattern> {
        self.patterns.iter().find(|p| p.pattern_type.name() == name)
    }

    /// All active patterns.
    #[must_use]
    pub fn patterns(&self) -> &[SemanticPattern] {
        &self.patterns
    }

    /// Number of active patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no pattern has been distilled yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustering(conf: f32, count: u32, now: Tick) -> SemanticPattern {
        SemanticPattern::new(
            PatternType::Clustering { kind: EntityKind::Resource },
            "resources cluster",
            conf,
            count,
            now,
            [RecordId::new()].into_iter().collect(),
        )
    }

    #[test]
    fn names_follow_rule_kind() {
        let p = PatternType::Proximity {
            reference: EntityKind::Resource,
            target: EntityKind::Obstacle,
        };
        assert_eq!(p.name(), "resource_obstacle_proximity");
        let s = PatternType::Sequence {
            from: EntityKind::Resource,
            to: EntityKind::Hazard,
        };
        assert_eq!(s.name(), "resource->hazard");
    }

    #[test]
    fn merge_is_count_weighted() {
        let mut a = clustering(0.8, 3, 1);
        a.merge(clustering(0.4, 1, 5));
        assert!((a.confidence - 0.7).abs() < 1e-6);
        assert_eq!(a.source_count, 4);
        assert_eq!(a.evidence.len(), 2);
        assert_eq!(a.created, 1);
        assert_eq!(a.last_confirmed, 5);
    }

    #[test]
    fn cap_drops_lowest_confidence() {
        let mut set = PatternSet::new();
        set.merge_all(
            vec![
                clustering(0.5, 1, 0),
                SemanticPattern::new(
                    PatternType::Clustering { kind: EntityKind::Hazard },
                    "hazards cluster",
                    0.9,
                    1,
                    0,
                    BTreeSet::new(),
                ),
            ],
            1,
        );
        assert_eq!(set.len(), 1);
        assert!(set.by_name("hazard_clustering").is_some());
    }
}
