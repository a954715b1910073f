//! Components attached to host entities.
//!
//! The host keeps one [`AgentBody`] per cognitive agent and one
//! [`WorldEntity`] per perceivable thing. The mind itself lives in the
//! rule's `MindRegistry`, keyed by the same `AgentId`.

use serde::{Deserialize, Serialize};

use mnema_core::agent::AgentState;
use mnema_core::types::{AgentId, EntityId, EntityKind, Position};

/// A perceivable thing in the world (resource, obstacle, hazard).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldEntity {
    /// Host identifier.
    pub id: EntityId,
    /// Classification.
    pub kind: EntityKind,
    /// Current position.
    pub position: Position,
}

impl WorldEntity {
    /// Create a world entity.
    #[must_use]
    pub fn new(id: EntityId, kind: EntityKind, position: Position) -> Self {
        Self { id, kind, position }
    }
}

/// The physical side of a cognitive agent.
#[derive(Debug, Clone)]
pub struct AgentBody {
    /// Scalar state read and written by the cognition tick.
    pub state: AgentState,
    /// Inactive bodies are skipped by the tick.
    pub active: bool,
}

impl AgentBody {
    /// Active body at `position` with a calm emotional state.
    #[must_use]
    pub fn new(position: Position) -> Self {
        Self {
            state: AgentState::new(position),
            active: true,
        }
    }

    /// How other agents see this one.
    #[must_use]
    pub fn as_entity(&self, agent: AgentId) -> WorldEntity {
        WorldEntity::new(entity_of(agent), EntityKind::Agent, self.state.position)
    }
}

/// Entity id under which an agent is perceived by others.
#[must_use]
pub fn entity_of(agent: AgentId) -> EntityId {
    EntityId(agent.0)
}
