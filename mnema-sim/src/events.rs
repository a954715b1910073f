//! Host events that change agent state between ticks.
//!
//! Events are queued by the host (usually through [`crate::hooks`]) and
//! applied in order at the start of the next tick, before any agent thinks.

use std::collections::BTreeMap;

use mnema_core::memory::SyntheticSource;
use mnema_core::types::{AgentId, EntityId, EnvironmentId, Position, RecordId, Value};

use crate::components::WorldEntity;

/// Something the host reports to the cognition layer.
#[derive(Debug, Clone)]
pub enum SimEvent {
    /// A new cognitive agent entered the world.
    Spawned {
        agent: AgentId,
        position: Position,
    },

    /// An agent left the world. Its mind is dropped.
    Despawned { agent: AgentId },

    /// An agent was moved by something other than its own goal.
    Teleported {
        agent: AgentId,
        position: Position,
    },

    /// The reality flux affecting one agent changed (0 = none, 1–3).
    FluxChanged { agent: AgentId, effect: u8 },

    /// A world-wide environment override was set or cleared.
    GlobalOverride { environment: Option<EnvironmentId> },

    /// An agent's emotional scalar changed (0–100).
    EmotionChanged { agent: AgentId, value: f32 },

    /// An agent produced a self-generated record.
    Synthetic {
        agent: AgentId,
        source: SyntheticSource,
        position: Position,
        importance: f32,
    },

    /// An agent re-remembered a record with alterations.
    Recalled {
        agent: AgentId,
        record: RecordId,
        changes: BTreeMap<String, Value>,
    },

    /// A perceivable thing appeared.
    EntityAdded(WorldEntity),

    /// A perceivable thing moved.
    EntityMoved {
        entity: EntityId,
        position: Position,
    },

    /// A perceivable thing disappeared.
    EntityRemoved(EntityId),
}

impl SimEvent {
    /// Agent the event concerns, if any.
    #[must_use]
    pub fn agent(&self) -> Option<AgentId> {
        match self {
            Self::Spawned { agent, .. }
            | Self::Despawned { agent }
            | Self::Teleported { agent, .. }
            | Self::FluxChanged { agent, .. }
            | Self::EmotionChanged { agent, .. }
            | Self::Synthetic { agent, .. }
            | Self::Recalled { agent, .. } => Some(*agent),
            Self::GlobalOverride { .. }
            | Self::EntityAdded(_)
            | Self::EntityMoved { .. }
            | Self::EntityRemoved(_) => None,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Spawned { .. } => "spawned",
            Self::Despawned { .. } => "despawned",
            Self::Teleported { .. } => "teleported",
            Self::FluxChanged { .. } => "flux_changed",
            Self::GlobalOverride { .. } => "global_override",
            Self::EmotionChanged { .. } => "emotion_changed",
            Self::Synthetic { .. } => "synthetic",
            Self::Recalled { .. } => "recalled",
            Self::EntityAdded(_) => "entity_added",
            Self::EntityMoved { .. } => "entity_moved",
            Self::EntityRemoved(_) => "entity_removed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_events_name_their_agent() {
        let event = SimEvent::FluxChanged {
            agent: AgentId(3),
            effect: 2,
        };
        assert_eq!(event.agent(), Some(AgentId(3)));
        assert_eq!(event.name(), "flux_changed");
        assert_eq!(SimEvent::EntityRemoved(EntityId(1)).agent(), None);
    }
}
