//! Per-tick systems run by the host around each cognition tick.
//!
//! | System     | When                         |
//! |------------|------------------------------|
//! | `sense`    | Before the agent thinks      |
//! | `step`     | After the goal is rewritten  |
//! | `collide`  | Inside `step`, world bounds  |

use mnema_core::agent::AgentState;
use mnema_core::environment::Percept;
use mnema_core::types::{EntityId, Position};

use crate::components::WorldEntity;
use crate::config::WorldBounds;

/// Nearest-first percepts of everything within `radius` of `position`,
/// excluding `observer` itself, capped at `capacity`.
#[must_use]
pub fn sense(
    observer: EntityId,
    position: Position,
    visible: &[WorldEntity],
    radius: f32,
    capacity: usize,
) -> Vec<Percept> {
    let mut in_range: Vec<(f32, &WorldEntity)> = visible
        .iter()
        .filter(|e| e.id != observer)
        .map(|e| (e.position.distance(&position), e))
        .filter(|(d, _)| *d <= radius)
        .collect();
    in_range.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
    in_range
        .into_iter()
        .take(capacity)
        .map(|(_, e)| Percept::new(e.id, e.kind, e.position))
        .collect()
}

/// Move up to `speed` toward the goal target, then clamp to the world.
/// Returns the distance actually travelled.
pub fn step(state: &mut AgentState, speed: f32, bounds: WorldBounds) -> f32 {
    let Some(target) = state.goal.target_position else {
        return 0.0;
    };
    let from = state.position;
    let remaining = from.distance(&target);
    let moved = if remaining <= speed || remaining <= f32::EPSILON {
        target
    } else {
        let scale = speed / remaining;
        Position::new(from.x + (target.x - from.x) * scale, from.y + (target.y - from.y) * scale)
    };
    state.position = collide(moved, bounds);
    from.distance(&state.position)
}

/// Clamp a position into the world.
#[must_use]
pub fn collide(position: Position, bounds: WorldBounds) -> Position {
    Position::new(position.x.clamp(0.0, bounds.width), position.y.clamp(0.0, bounds.height))
}
