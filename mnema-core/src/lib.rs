//! # MNEMA Core Library
//!
//! Engine-agnostic memory and knowledge abstraction for simulated agents.
//!
//! Every agent gets an [`AgentMind`] that turns a perception feed into goal
//! directives through five layers:
//!
//! - **Episodic** — short-term ring, rolling log, long-term list, spatial grid
//! - **Semantic** — proximity / clustering / shift-stability / sequence patterns
//! - **Knowledge** — low / mid / high tiers with promotion, decay and transfer
//! - **Environment** — detection, EMA profiles, similarity and adaptation
//! - **Decision** — high → mid → low → fallback precedence and success feedback
//!
//! ## Tick contract
//!
//! The per-tick pipeline never fails: full containers evict, missing data
//! reads as empty, missing context properties do not match. Only
//! configuration loading and snapshot persistence return errors.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod agent;
pub mod config;
pub mod consolidation;
pub mod decay;
pub mod decision;
pub mod distill;
pub mod environment;
pub mod error;
pub mod knowledge;
pub mod memory;
pub mod metrics;
pub mod persistence;
pub mod rng;
pub mod types;

pub use agent::{AgentMind, AgentState, MindRegistry, MindSnapshot};
pub use config::MnemaConfig;
pub use decision::{Decision, DecisionEngine, DecisionKind, Goal, GoalKind};
pub use distill::SemanticDistiller;
pub use environment::{EnvironmentTracker, Percept};
pub use error::MnemaError;
pub use knowledge::{KnowledgeEntry, KnowledgeHierarchy, KnowledgeLevel, KnowledgeType};
pub use memory::{EpisodicRecord, EpisodicStore, Observation, SyntheticSource};
pub use rng::{RandomSource, SeededRandom};
pub use types::*;
