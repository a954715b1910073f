//! Knowledge entries — generalized, confidence-weighted rules.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::knowledge::condition::{Condition, Context, satisfied_fraction};
use crate::knowledge::{KnowledgeLevel, KnowledgeType};
use crate::types::{EnvironmentId, KnowledgeId, RecordId, Tick, Value};

/// Instances needed for a full instance factor.
pub const INSTANCE_SATURATION: f32 = 5.0;
/// Environments needed for a full environment factor.
pub const ENVIRONMENT_SATURATION: f32 = 3.0;
/// Application factor of an entry that was never applied.
pub const UNTESTED_APPLICATION_FACTOR: f32 = 0.5;

/// The rule an entry encodes: when `conditions` hold, expect `outcome`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgePattern {
    /// Category of knowledge.
    pub kind: KnowledgeType,
    /// Context tests.
    pub conditions: Vec<Condition>,
    /// What the rule predicts (target position, approach...).
    pub outcome: BTreeMap<String, Value>,
}

/// What an instance was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceSource {
    /// A single episodic record (low tier).
    Record(RecordId),
    /// A lower-tier entry (mid and high tiers).
    Entry(KnowledgeId),
}

/// One piece of supporting evidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Where the evidence came from.
    pub source: InstanceSource,
    /// Environment it was observed in.
    pub environment: EnvironmentId,
    /// When it was observed.
    pub observed_at: Tick,
}

/// Application outcomes in one environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Times applied there.
    pub applications: u32,
    /// Times it worked.
    pub successes: u32,
}

impl TransferRecord {
    /// Success rate, or `None` when never applied.
    #[must_use]
    pub fn rate(&self) -> Option<f32> {
        (self.applications > 0).then(|| self.successes as f32 / self.applications as f32)
    }
}

/// A knowledge entry in one tier of the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Unique identifier.
    pub id: KnowledgeId,
    /// Encoded rule.
    pub pattern: KnowledgePattern,
    /// Tier.
    pub level: KnowledgeLevel,
    /// Confidence (0.0 to 1.0).
    pub confidence: f32,
    /// Supporting evidence, deduplicated by source.
    pub instances: Vec<Instance>,
    /// Environment where the entry was first formed.
    pub origin_environment: EnvironmentId,
    /// Environments the entry is associated with.
    pub environment_ids: BTreeSet<EnvironmentId>,
    /// Times applied to a decision.
    pub application_count: u32,
    /// Times an application succeeded.
    pub success_count: u32,
    /// Per-environment application outcomes.
    pub transfer_success: BTreeMap<EnvironmentId, TransferRecord>,
    /// When formed.
    pub created: Tick,
    /// When last applied.
    pub last_used: Option<Tick>,
    /// When decay was last applied.
    pub last_decayed: Tick,
    /// Set on high-tier entries that hold in every environment.
    pub universal_principle: bool,
}

impl KnowledgeEntry {
    /// Create an entry formed in `environment`.
    #[must_use]
    pub fn new(
        pattern: KnowledgePattern,
        level: KnowledgeLevel,
        confidence: f32,
        environment: EnvironmentId,
        now: Tick,
    ) -> Self {
        Self {
            id: KnowledgeId::new(),
            pattern,
            level,
            confidence: confidence.clamp(0.0, 1.0),
            instances: Vec::new(),
            origin_environment: environment,
            environment_ids: std::iter::once(environment).collect(),
            application_count: 0,
            success_count: 0,
            transfer_success: BTreeMap::new(),
            created: now,
            last_used: None,
            last_decayed: now,
            universal_principle: false,
        }
    }

    /// Add evidence unless the same source is already recorded.
    pub fn add_instance(&mut self, instance: Instance) -> bool {
        if self.instances.iter().any(|i| i.source == instance.source) {
            return false;
        }
        self.environment_ids.insert(instance.environment);
        self.instances.push(instance);
        true
    }

    /// `successes / applications`, or 0.5 while untested.
    #[must_use]
    pub fn application_factor(&self) -> f32 {
        if self.application_count == 0 {
            UNTESTED_APPLICATION_FACTOR
        } else {
            self.success_count as f32 / self.application_count as f32
        }
    }

    /// Evidence-based confidence:
    /// `0.3·min(instances/5, 1) + 0.2·min(envs/3, 1) + 0.5·application_factor`.
    #[must_use]
    pub fn evidence_confidence(&self) -> f32 {
        let instance_factor = (self.instances.len() as f32 / INSTANCE_SATURATION).min(1.0);
        let environment_factor = (self.environment_ids.len() as f32 / ENVIRONMENT_SATURATION).min(1.0);
        (0.3 * instance_factor + 0.2 * environment_factor + 0.5 * self.application_factor()).clamp(0.0, 1.0)
    }

    /// Fold [`Self::evidence_confidence`] into the stored confidence by
    /// averaging the two. A success never lowers confidence.
    pub fn blend_evidence(&mut self, success: bool) {
        let blended = ((self.confidence + self.evidence_confidence()) / 2.0).clamp(0.0, 1.0);
        self.confidence = if success { blended.max(self.confidence) } else { blended };
    }

    /// Record the outcome of applying this entry in `environment`.
    pub fn record_application(&mut self, environment: EnvironmentId, success: bool, now: Tick) {
        self.application_count += 1;
        if success {
            self.success_count += 1;
        }
        let transfer = self.transfer_success.entry(environment).or_default();
        transfer.applications += 1;
        if success {
            transfer.successes += 1;
        }
        self.last_used = Some(now);
        self.blend_evidence(success);
    }

    /// Mean success rate across the environments it was applied in.
    #[must_use]
    pub fn mean_transfer_success(&self) -> Option<f32> {
        let rates: Vec<f32> = self.transfer_success.values().filter_map(TransferRecord::rate).collect();
        if rates.is_empty() {
            None
        } else {
            Some(rates.iter().sum::<f32>() / rates.len() as f32)
        }
    }

    /// Whether this entry may be used in `environment`.
    ///
    /// High entries apply everywhere. Mid entries apply while untested or
    /// while their mean transfer success reaches `validation_threshold`. Low
    /// entries apply only where they were formed.
    #[must_use]
    pub fn is_applicable_in(&self, environment: EnvironmentId, validation_threshold: f32) -> bool {
        match self.level {
            KnowledgeLevel::High => true,
            KnowledgeLevel::Mid => self
                .mean_transfer_success()
                .is_none_or(|rate| rate >= validation_threshold),
            KnowledgeLevel::Low => environment == self.origin_environment,
        }
    }

    /// Entry confidence × fraction of conditions satisfied by `context`.
    #[must_use]
    pub fn match_confidence(&self, context: &Context) -> f32 {
        self.confidence * satisfied_fraction(&self.pattern.conditions, context)
    }

    /// Numeric outcome field.
    #[must_use]
    pub fn outcome_number(&self, key: &str) -> Option<f32> {
        self.pattern.outcome.get(key).and_then(Value::as_number)
    }

    /// Text outcome field.
    #[must_use]
    pub fn outcome_text(&self, key: &str) -> Option<&str> {
        self.pattern.outcome.get(key).and_then(Value::as_text)
    }
}
