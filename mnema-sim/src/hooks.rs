//! Integration hooks for host systems.
//!
//! Thin constructors the host calls from its own systems (spawning, status
//! effects, rest, dialogue) to report changes to the cognition layer.

use std::collections::BTreeMap;

use mnema_core::memory::SyntheticSource;
use mnema_core::types::{AgentId, EnvironmentId, Position, RecordId, Value};

use crate::events::SimEvent;

/// An agent entered the world.
#[must_use]
pub fn on_spawn(agent: AgentId, position: Position) -> SimEvent {
    SimEvent::Spawned { agent, position }
}

/// An agent left the world.
#[must_use]
pub fn on_despawn(agent: AgentId) -> SimEvent {
    SimEvent::Despawned { agent }
}

/// A flux status effect was applied or cleared. Effects above 3 are capped.
#[must_use]
pub fn on_flux(agent: AgentId, effect: u8) -> SimEvent {
    SimEvent::FluxChanged {
        agent,
        effect: effect.min(3),
    }
}

/// A world event forced every agent into `environment` (or released them).
#[must_use]
pub fn on_global_override(environment: Option<EnvironmentId>) -> SimEvent {
    SimEvent::GlobalOverride { environment }
}

/// The agent's mood changed.
#[must_use]
pub fn on_emotion(agent: AgentId, value: f32) -> SimEvent {
    SimEvent::EmotionChanged {
        agent,
        value: value.clamp(0.0, 100.0),
    }
}

/// The agent dreamed of `position` while resting.
#[must_use]
pub fn on_dream(agent: AgentId, position: Position, importance: f32) -> SimEvent {
    SimEvent::Synthetic {
        agent,
        source: SyntheticSource::Dream,
        position,
        importance,
    }
}

/// The agent heard or told a story about `position`.
#[must_use]
pub fn on_narrative(agent: AgentId, position: Position, importance: f32) -> SimEvent {
    SimEvent::Synthetic {
        agent,
        source: SyntheticSource::Narrative,
        position,
        importance,
    }
}

/// The agent imagined something at `position`.
#[must_use]
pub fn on_imagination(agent: AgentId, position: Position, importance: f32) -> SimEvent {
    SimEvent::Synthetic {
        agent,
        source: SyntheticSource::Imagination,
        position,
        importance,
    }
}

/// The agent recalled `record` differently.
#[must_use]
pub fn on_recall(agent: AgentId, record: RecordId, changes: BTreeMap<String, Value>) -> SimEvent {
    SimEvent::Recalled { agent, record, changes }
}
