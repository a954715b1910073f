//! Configuration for the MNEMA cognition pipeline.
//!
//! Maps directly to `mnema.toml`. Every field has a serde default so partial
//! files are valid; the defaults are the reference tuning.

use serde::{Deserialize, Serialize};

use crate::knowledge::KnowledgeLevel;

/// Top-level MNEMA configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MnemaConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Short-term ring, episodic log and long-term consolidation.
    #[serde(default)]
    pub episodic: EpisodicConfig,
    /// Semantic pattern extraction.
    #[serde(default)]
    pub distill: DistillConfig,
    /// Knowledge hierarchy tiers, promotion and decay.
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    /// Environment detection, profiling and adaptation.
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// Decision engine tuning.
    #[serde(default)]
    pub decision: DecisionConfig,
    /// Snapshot persistence.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Optional cloud sync of records and patterns.
    #[serde(default)]
    pub sync: SyncConfig,
}

impl MnemaConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `MnemaError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::MnemaError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether cognition processing is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Episodic store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicConfig {
    /// Number of short-term ring slots per agent.
    #[serde(default = "default_10_usize")]
    pub short_term_capacity: usize,
    /// Spatial index cell size (world units).
    #[serde(default = "default_10_0")]
    pub spatial_cell_size: f32,
    /// Exponential importance decay constant per tick of age.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f32,
    /// Records whose importance falls below this are pruned.
    #[serde(default = "default_0_05")]
    pub importance_floor: f32,
    /// Ticks between long-term consolidation passes.
    #[serde(default = "default_100_u64")]
    pub consolidation_interval_ticks: u64,
    /// Records strictly above this importance move to long-term storage.
    #[serde(default = "default_0_7")]
    pub consolidation_threshold: f32,
    /// Lower bound of the calm emotional band.
    #[serde(default = "default_30_0")]
    pub salience_low: f32,
    /// Upper bound of the calm emotional band.
    #[serde(default = "default_70_0")]
    pub salience_high: f32,
    /// Importance bonus for records formed outside the calm band.
    #[serde(default = "default_0_2")]
    pub salience_boost: f32,
    /// Hard cap on the rolling episodic log (oldest dropped first).
    #[serde(default = "default_1000_usize")]
    pub max_log_records: usize,
}

impl Default for EpisodicConfig {
    fn default() -> Self {
        Self {
            short_term_capacity: 10,
            spatial_cell_size: 10.0,
            decay_rate: 0.001,
            importance_floor: 0.05,
            consolidation_interval_ticks: 100,
            consolidation_threshold: 0.7,
            salience_low: 30.0,
            salience_high: 70.0,
            salience_boost: 0.2,
            max_log_records: 1000,
        }
    }
}

/// Semantic distillation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistillConfig {
    /// Ticks between distillation passes.
    #[serde(default = "default_2_u64")]
    pub interval_ticks: u64,
    /// Only the most recent N log records are distilled.
    #[serde(default = "default_200_usize")]
    pub window_records: usize,
    /// Max distance for a proximity pairing.
    #[serde(default = "default_15_0")]
    pub proximity_distance: f32,
    /// Max tick difference for a proximity pairing.
    #[serde(default = "default_10_u64")]
    pub proximity_window_ticks: u64,
    /// Proximity patterns are emitted above this confidence.
    #[serde(default = "default_0_3")]
    pub proximity_min_confidence: f32,
    /// Max distance between clustered neighbours.
    #[serde(default = "default_20_0")]
    pub cluster_distance: f32,
    /// Same-kind neighbours needed to count as clustered.
    #[serde(default = "default_2_usize")]
    pub cluster_min_neighbors: usize,
    /// Clustering patterns are emitted above this confidence.
    #[serde(default = "default_0_4")]
    pub cluster_min_confidence: f32,
    /// Displacement beyond which a hazard counts as moved by a shift.
    #[serde(default = "default_20_0")]
    pub shift_displacement: f32,
    /// Transitions must occur at least this often to form a sequence pattern.
    #[serde(default = "default_3_usize")]
    pub sequence_min_occurrences: usize,
    /// Cap on stored patterns per agent (lowest confidence dropped).
    #[serde(default = "default_32_usize")]
    pub max_patterns: usize,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            interval_ticks: 2,
            window_records: 200,
            proximity_distance: 15.0,
            proximity_window_ticks: 10,
            proximity_min_confidence: 0.3,
            cluster_distance: 20.0,
            cluster_min_neighbors: 2,
            cluster_min_confidence: 0.4,
            shift_displacement: 20.0,
            sequence_min_occurrences: 3,
            max_patterns: 32,
        }
    }
}

/// Knowledge hierarchy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Low tier capacity.
    #[serde(default = "default_20_usize")]
    pub low_capacity: usize,
    /// Mid tier capacity.
    #[serde(default = "default_15_usize")]
    pub mid_capacity: usize,
    /// High tier capacity.
    #[serde(default = "default_10_usize")]
    pub high_capacity: usize,
    /// Ticks between generalization passes.
    #[serde(default = "default_50_u64")]
    pub generalization_interval_ticks: u64,
    /// Entries of one kind required before promotion is attempted.
    #[serde(default = "default_5_usize")]
    pub abstraction_instance_threshold: usize,
    /// Confidence an entry needs to count toward promotion.
    #[serde(default = "default_0_6")]
    pub abstraction_confidence_threshold: f32,
    /// Confident entries required for a low → mid promotion.
    #[serde(default = "default_3_usize")]
    pub min_confident_instances: usize,
    /// Distinct environments required for a mid → high promotion.
    #[serde(default = "default_2_usize")]
    pub min_environments_for_universal: usize,
    /// Share of qualifying entries a property must appear in to become universal.
    #[serde(default = "default_0_7")]
    pub universal_property_ratio: f32,
    /// Match confidence required for knowledge to drive a decision.
    #[serde(default = "default_0_7")]
    pub validation_threshold: f32,
    /// Entries below this confidence are pruned and never matched.
    #[serde(default = "default_0_2")]
    pub minimum_confidence: f32,
    /// Confidence lost per time unit (before the tier multiplier).
    #[serde(default = "default_0_05")]
    pub decay_rate: f32,
    /// Ticks per decay time unit.
    #[serde(default = "default_100_u64")]
    pub decay_time_unit_ticks: u64,
    /// Decay multiplier for the low tier.
    #[serde(default = "default_1_2")]
    pub low_decay_multiplier: f32,
    /// Decay multiplier for the mid tier.
    #[serde(default = "default_1_0")]
    pub mid_decay_multiplier: f32,
    /// Decay multiplier for the high tier.
    #[serde(default = "default_0_8")]
    pub high_decay_multiplier: f32,
    /// Experiences must be strictly more important than this to become knowledge.
    #[serde(default = "default_0_5")]
    pub experience_importance_threshold: f32,
    /// Experiences must be younger than this (ticks) to become knowledge.
    #[serde(default = "default_100_u64")]
    pub experience_window_ticks: u64,
    /// Tolerance of the `near` conditions derived from an experience.
    #[serde(default = "default_15_0")]
    pub near_threshold: f32,
}

impl KnowledgeConfig {
    /// Capacity of a tier.
    #[must_use]
    pub fn capacity(&self, level: KnowledgeLevel) -> usize {
        match level {
            KnowledgeLevel::Low => self.low_capacity,
            KnowledgeLevel::Mid => self.mid_capacity,
            KnowledgeLevel::High => self.high_capacity,
        }
    }

    /// Decay multiplier of a tier.
    #[must_use]
    pub fn decay_multiplier(&self, level: KnowledgeLevel) -> f32 {
        match level {
            KnowledgeLevel::Low => self.low_decay_multiplier,
            KnowledgeLevel::Mid => self.mid_decay_multiplier,
            KnowledgeLevel::High => self.high_decay_multiplier,
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            low_capacity: 20,
            mid_capacity: 15,
            high_capacity: 10,
            generalization_interval_ticks: 50,
            abstraction_instance_threshold: 5,
            abstraction_confidence_threshold: 0.6,
            min_confident_instances: 3,
            min_environments_for_universal: 2,
            universal_property_ratio: 0.7,
            validation_threshold: 0.7,
            minimum_confidence: 0.2,
            decay_rate: 0.05,
            decay_time_unit_ticks: 100,
            low_decay_multiplier: 1.2,
            mid_decay_multiplier: 1.0,
            high_decay_multiplier: 0.8,
            experience_importance_threshold: 0.5,
            experience_window_ticks: 100,
            near_threshold: 15.0,
        }
    }
}

/// Environment tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// World-centre X used for quadrant detection.
    #[serde(default = "default_50_0")]
    pub world_center_x: f32,
    /// World-centre Y used for quadrant detection.
    #[serde(default = "default_50_0")]
    pub world_center_y: f32,
    /// Transitions below this similarity trigger knowledge adaptation.
    #[serde(default = "default_0_6")]
    pub transition_threshold: f32,
    /// Max cached environment profiles (LRU).
    #[serde(default = "default_5_usize")]
    pub max_cached_profiles: usize,
    /// EMA smoothing factor for profile updates.
    #[serde(default = "default_0_2")]
    pub profile_smoothing: f32,
    /// Perception feed size, used to normalise density.
    #[serde(default = "default_10_usize")]
    pub perception_capacity: usize,
    /// Adaptation weight of the low tier.
    #[serde(default = "default_0_7")]
    pub low_adaptation_weight: f32,
    /// Adaptation weight of the mid tier.
    #[serde(default = "default_0_4")]
    pub mid_adaptation_weight: f32,
    /// Adaptation weight of the high tier.
    #[serde(default = "default_0_1")]
    pub high_adaptation_weight: f32,
}

impl EnvironmentConfig {
    /// How strongly a tier is discounted when the environment changes.
    #[must_use]
    pub fn adaptation_weight(&self, level: KnowledgeLevel) -> f32 {
        match level {
            KnowledgeLevel::Low => self.low_adaptation_weight,
            KnowledgeLevel::Mid => self.mid_adaptation_weight,
            KnowledgeLevel::High => self.high_adaptation_weight,
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            world_center_x: 50.0,
            world_center_y: 50.0,
            transition_threshold: 0.6,
            max_cached_profiles: 5,
            profile_smoothing: 0.2,
            perception_capacity: 10,
            low_adaptation_weight: 0.7,
            mid_adaptation_weight: 0.4,
            high_adaptation_weight: 0.1,
        }
    }
}

/// Decision engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Goal completion (percent) above which an applied decision counts as a success.
    #[serde(default = "default_50_0")]
    pub success_completion_threshold: f32,
    /// Priority assigned to fallback decisions.
    #[serde(default = "default_0_3")]
    pub fallback_priority: f32,
    /// Width of the world, used for exploration targets.
    #[serde(default = "default_100_0")]
    pub world_width: f32,
    /// Height of the world, used for exploration targets.
    #[serde(default = "default_100_0")]
    pub world_height: f32,
    /// Distance a hazard-avoidance fallback retreats.
    #[serde(default = "default_20_0")]
    pub retreat_distance: f32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            success_completion_threshold: 50.0,
            fallback_priority: 0.3,
            world_width: 100.0,
            world_height: 100.0,
            retreat_distance: 20.0,
        }
    }
}

/// Persistence / snapshot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Detect snapshot corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// Rotating backups kept next to the database file (0 disables).
    #[serde(default = "default_3_u32")]
    pub backup_count: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            checksum_enabled: true,
            backup_count: 3,
        }
    }
}

/// Cloud sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Opt-in only.
    #[serde(default)]
    pub enabled: bool,
    /// HTTP endpoint receiving batches.
    #[serde(default = "default_sync_endpoint")]
    pub endpoint: String,
    /// Ticks between batches for one agent.
    #[serde(default = "default_100_u64")]
    pub interval_ticks: u64,
    /// Max records per batch.
    #[serde(default = "default_50_usize")]
    pub max_records_per_batch: usize,
    /// Retries before a batch is dropped.
    #[serde(default = "default_3_u32")]
    pub max_retries: u32,
    /// Base retry delay; attempt `n` waits `n × delay`.
    #[serde(default = "default_500_u64")]
    pub retry_delay_ms: u64,
    /// Per-request timeout.
    #[serde(default = "default_5000_u64")]
    pub request_timeout_ms: u64,
    /// Pending batches kept before new ones are dropped.
    #[serde(default = "default_64_usize")]
    pub queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://127.0.0.1:8080/sync".to_string(),
            interval_ticks: 100,
            max_records_per_batch: 50,
            max_retries: 3,
            retry_delay_ms: 500,
            request_timeout_ms: 5000,
            queue_capacity: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_sync_endpoint() -> String { "http://127.0.0.1:8080/sync".to_string() }
fn default_0_05() -> f32 { 0.05 }
fn default_0_1() -> f32 { 0.1 }
fn default_0_2() -> f32 { 0.2 }
fn default_0_3() -> f32 { 0.3 }
fn default_0_4() -> f32 { 0.4 }
fn default_0_5() -> f32 { 0.5 }
fn default_0_6() -> f32 { 0.6 }
fn default_0_7() -> f32 { 0.7 }
fn default_0_8() -> f32 { 0.8 }
fn default_1_0() -> f32 { 1.0 }
fn default_1_2() -> f32 { 1.2 }
fn default_10_0() -> f32 { 10.0 }
fn default_15_0() -> f32 { 15.0 }
fn default_20_0() -> f32 { 20.0 }
fn default_30_0() -> f32 { 30.0 }
fn default_50_0() -> f32 { 50.0 }
fn default_70_0() -> f32 { 70.0 }
fn default_100_0() -> f32 { 100.0 }
fn default_decay_rate() -> f32 { 0.001 }
fn default_2_usize() -> usize { 2 }
fn default_3_usize() -> usize { 3 }
fn default_5_usize() -> usize { 5 }
fn default_10_usize() -> usize { 10 }
fn default_15_usize() -> usize { 15 }
fn default_20_usize() -> usize { 20 }
fn default_32_usize() -> usize { 32 }
fn default_50_usize() -> usize { 50 }
fn default_64_usize() -> usize { 64 }
fn default_200_usize() -> usize { 200 }
fn default_1000_usize() -> usize { 1000 }
fn default_3_u32() -> u32 { 3 }
fn default_2_u64() -> u64 { 2 }
fn default_10_u64() -> u64 { 10 }
fn default_50_u64() -> u64 { 50 }
fn default_100_u64() -> u64 { 100 }
fn default_500_u64() -> u64 { 500 }
fn default_5000_u64() -> u64 { 5000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = MnemaConfig::from_toml("").expect("empty config is valid");
        assert_eq!(config.episodic.short_term_capacity, 10);
        assert_eq!(config.knowledge.capacity(KnowledgeLevel::Mid), 15);
        assert!((config.environment.transition_threshold - 0.6).abs() < f32::EPSILON);
        assert!(!config.sync.enabled);
    }

    #[test]
    fn partial_sections_override_only_given_fields() {
        let config = MnemaConfig::from_toml(
            "[knowledge]\nlow_capacity = 4\n\n[distill]\ninterval_ticks = 1\n",
        )
        .expect("valid config");
        assert_eq!(config.knowledge.low_capacity, 4);
        assert_eq!(config.knowledge.high_capacity, 10);
        assert_eq!(config.distill.interval_ticks, 1);
        assert_eq!(config.distill.window_records, 200);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = MnemaConfig::from_toml("[knowledge\nlow_capacity = ").unwrap_err();
        assert!(matches!(err, crate::MnemaError::Config(_)));
    }

    #[test]
    fn tier_tables_use_reference_weights() {
        let env = EnvironmentConfig::default();
        assert!((env.adaptation_weight(KnowledgeLevel::Low) - 0.7).abs() < f32::EPSILON);
        assert!((env.adaptation_weight(KnowledgeLevel::High) - 0.1).abs() < f32::EPSILON);
        let k = KnowledgeConfig::default();
        assert!((k.decay_multiplier(KnowledgeLevel::Low) - 1.2).abs() < f32::EPSILON);
    }
}
