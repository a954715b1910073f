//! # mnema-sim — Host Integration for MNEMA
//!
//! Integration layer between the engine-agnostic `mnema-core` library and
//! a host simulation's entity loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                 Host loop                  │
//! │   hooks ──▶ SimEvent queue                 │
//! │                  │                         │
//! │                  ▼                         │
//! │   ┌──────────────────────────────────┐     │
//! │   │          CognitionRule           │     │
//! │   │  sense ─▶ AgentMind::tick ─▶ step │     │
//! │   └────────┬──────────────┬──────────┘     │
//! │            ▼              ▼                │
//! │   PersistenceEngine   SyncScheduler ──▶ mnema-sync worker
//! └────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `components` — agent bodies and perceivable world entities
//! - `config` — world bounds and cost profiles over `MnemaConfig`
//! - `events` — host events applied at the start of a tick
//! - `hooks` — constructors for those events
//! - `rule` — the per-tick driver
//! - `sync_bridge` — schedules sync batches per agent
//! - `systems` — sensing and movement
//! - `telemetry` — `tracing-subscriber` setup

pub mod components;
pub mod config;
pub mod events;
pub mod hooks;
pub mod rule;
pub mod sync_bridge;
pub mod systems;
pub mod telemetry;

pub use components::{AgentBody, WorldEntity};
pub use config::{SimConfig, SimProfile, WorldBounds};
pub use events::SimEvent;
pub use rule::{CognitionRule, FrameReport};
pub use sync_bridge::SyncScheduler;
