//! Host-side configuration layered on `mnema_core::config::MnemaConfig`.
//!
//! Profiles trade cognitive depth for per-tick cost. `Standard` is the
//! reference tuning; the other two scale capacities and intervals.

use serde::{Deserialize, Serialize};

use mnema_core::config::MnemaConfig;
use mnema_core::error::Result;

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Cost profile for a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimProfile {
    /// Small rings, infrequent passes. For crowds.
    Minimal,
    /// Reference tuning.
    #[default]
    Standard,
    /// Large tiers, frequent passes. For inspecting learning.
    Research,
}

impl SimProfile {
    /// Get a human-readable description.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Minimal => "Minimal: small memories, slow distillation",
            Self::Standard => "Standard: reference tuning",
            Self::Research => "Research: large tiers, distillation every tick",
        }
    }

    /// Recommended cap on agents ticked per frame.
    #[must_use]
    pub fn max_active_agents(self) -> usize {
        match self {
            Self::Minimal => 500,
            Self::Standard => 100,
            Self::Research => 20,
        }
    }
}

// ---------------------------------------------------------------------------
// Sim configuration
// ---------------------------------------------------------------------------

/// World bounds in world units; the origin is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    /// Extent along x.
    pub width: f32,
    /// Extent along y.
    pub height: f32,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 100.0,
        }
    }
}

/// Configuration for the host integration layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Core cognition configuration.
    #[serde(default)]
    pub core: MnemaConfig,
    /// Cost profile.
    #[serde(default)]
    pub profile: SimProfile,
    /// World bounds.
    #[serde(default)]
    pub world: WorldBounds,
    /// How far agents perceive (world units).
    #[serde(default = "default_perception_radius")]
    pub perception_radius: f32,
    /// Distance an agent moves toward its goal per tick.
    #[serde(default = "default_movement_speed")]
    pub movement_speed: f32,
    /// Per-tick budget in milliseconds for the whole cognition pass.
    #[serde(default = "default_tick_budget_ms")]
    pub tick_budget_ms: f64,
    /// Ticks between snapshot checkpoints (0 disables).
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_ticks: u64,
    /// RNG seed; `None` reads `MNEMA_SEED` or draws one.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_perception_radius() -> f32 { 30.0 }
fn default_movement_speed() -> f32 { 2.0 }
fn default_tick_budget_ms() -> f64 { 2.0 }
fn default_checkpoint_interval() -> u64 { 1000 }

impl SimConfig {
    /// Create a config tuned for `profile`.
    #[must_use]
    pub fn for_profile(profile: SimProfile) -> Self {
        let mut config = Self {
            profile,
            ..Self::default()
        };
        let core = &mut config.core;
        match profile {
            SimProfile::Minimal => {
                core.episodic.short_term_capacity = 5;
                core.episodic.max_log_records = 200;
                core.distill.interval_ticks = 10;
                core.knowledge.low_capacity = 10;
                core.knowledge.mid_capacity = 5;
                core.knowledge.high_capacity = 3;
                core.knowledge.generalization_interval_ticks = 100;
                core.environment.perception_capacity = 5;
                config.perception_radius = 20.0;
            }
            SimProfile::Standard => {}
            SimProfile::Research => {
                core.episodic.max_log_records = 5000;
                core.distill.interval_ticks = 1;
                core.knowledge.low_capacity = 40;
                core.knowledge.mid_capacity = 20;
                core.knowledge.high_capacity = 15;
                core.knowledge.generalization_interval_ticks = 25;
                config.perception_radius = 40.0;
                config.tick_budget_ms = 10.0;
            }
        }
        config.apply_world();
        config
    }

    /// Load from TOML, then align the core world-dependent settings.
    ///
    /// # Errors
    /// Returns `MnemaError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(toml_str).map_err(|e| mnema_core::MnemaError::Config(e.to_string()))?;
        config.apply_world();
        Ok(config)
    }

    /// Copy the world bounds into the decision and environment settings so
    /// exploration targets and quadrant detection agree with the host.
    pub fn apply_world(&mut self) {
        self.core.decision.world_width = self.world.width;
        self.core.decision.world_height = self.world.height;
        self.core.environment.world_center_x = self.world.width / 2.0;
        self.core.environment.world_center_y = self.world.height / 2.0;
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            core: MnemaConfig::default(),
            profile: SimProfile::Standard,
            world: WorldBounds::default(),
            perception_radius: default_perception_radius(),
            movement_speed: default_movement_speed(),
            tick_budget_ms: default_tick_budget_ms(),
            checkpoint_interval_ticks: default_checkpoint_interval(),
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_is_reference_tuning() {
        let config = SimConfig::for_profile(SimProfile::Standard);
        assert_eq!(config.core.knowledge.low_capacity, 20);
        assert_eq!(config.core.episodic.short_term_capacity, 10);
        assert_eq!(config.profile.max_active_agents(), 100);
    }

    #[test]
    fn minimal_shrinks_capacities() {
        let minimal = SimConfig::for_profile(SimProfile::Minimal);
        let standard = SimConfig::for_profile(SimProfile::Standard);
        assert!(minimal.core.knowledge.low_capacity < standard.core.knowledge.low_capacity);
        assert!(minimal.core.distill.interval_ticks > standard.core.distill.interval_ticks);
        assert!(minimal.perception_radius < standard.perception_radius);
    }

    #[test]
    fn research_distills_every_tick() {
        let config = SimConfig::for_profile(SimProfile::Research);
        assert_eq!(config.core.distill.interval_ticks, 1);
        assert!(config.core.knowledge.low_capacity > 20);
    }

    #[test]
    fn world_bounds_drive_core_settings() {
        let config = SimConfig::from_toml("profile = \"research\"\n\n[world]\nwidth = 400.0\nheight = 200.0\n")
            .expect("parse");
        assert_eq!(config.profile, SimProfile::Research);
        assert!((config.core.decision.world_width - 400.0).abs() < f32::EPSILON);
        assert!((config.core.environment.world_center_x - 200.0).abs() < f32::EPSILON);
        assert!((config.core.environment.world_center_y - 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        assert!(SimConfig::from_toml("profile = 7").is_err());
    }
}
