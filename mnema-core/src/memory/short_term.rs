//! Short-term ring buffer.
//!
//! A fixed number of slots with a circular write cursor. Writes always land
//! on the next slot and overwrite whatever is there, regardless of
//! importance: ingestion is O(1) and never fails.

use serde::{Deserialize, Serialize};

use crate::memory::episodic::EpisodicRecord;
use crate::types::{EntityId, EntityKind, Position, Tick};

/// One short-term slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortTermSlot {
    /// Perceived entity.
    pub entity: EntityId,
    /// Kind of the perceived entity.
    pub kind: EntityKind,
    /// Where it was perceived.
    pub position: Position,
    /// When it was perceived.
    pub timestamp: Tick,
    /// Importance (decays with the episodic log).
    pub importance: f32,
    /// Perception accuracy.
    pub fidelity: f32,
}

impl From<&EpisodicRecord> for ShortTermSlot {
    fn from(record: &EpisodicRecord) -> Self {
        Self {
            entity: record.source_entity,
            kind: record.source_kind,
            position: record.position,
            timestamp: record.timestamp,
            importance: record.importance,
            fidelity: record.fidelity,
        }
    }
}

/// Fixed-capacity circular buffer of recent perceptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortTermBuffer {
    slots: Vec<Option<ShortTermSlot>>,
    last_index: Option<usize>,
}

impl ShortTermBuffer {
    /// Create a buffer with `capacity` slots (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            last_index: None,
        }
    }

    /// Write into slot `(last + 1) mod capacity`. Returns the slot index and
    /// whether an occupied slot was overwritten.
    pub fn write(&mut self, slot: ShortTermSlot) -> (usize, bool) {
        let index = match self.last_index {
            Some(last) => (last + 1) % self.slots.len(),
            None => 0,
        };
        let overwrote = self.slots[index].replace(slot).is_some();
        self.last_index = Some(index);
        (index, overwrote)
    }

    /// Fixed number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_index.is_none()
    }

    /// Index of the most recent write.
    #[must_use]
    pub fn last_index(&self) -> Option<usize> {
        self.last_index
    }

    /// Slot contents by index.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&ShortTermSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Occupied slots, newest first.
    pub fn iter_recent(&self) -> impl Iterator<Item = &ShortTermSlot> {
        let cap = self.slots.len();
        let start = self.last_index.unwrap_or(0);
        let count = if self.last_index.is_some() { cap } else { 0 };
        (0..count).filter_map(move |i| self.slots[(start + cap - i) % cap].as_ref())
    }

    /// Mutable access to every occupied slot (used by decay).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ShortTermSlot> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: u32) -> ShortTermSlot {
        ShortTermSlot {
            entity: EntityId(n),
            kind: EntityKind::Resource,
            position: Position::new(n as f32, 0.0),
            timestamp: u64::from(n),
            importance: 0.5,
            fidelity: 1.0,
        }
    }

    #[test]
    fn first_write_lands_on_slot_zero() {
        let mut buf = ShortTermBuffer::new(10);
        let (index, overwrote) = buf.write(slot(1));
        assert_eq!(index, 0);
        assert!(!overwrote);
    }

    #[test]
    fn write_past_capacity_wraps_to_slot_zero() {
        let mut buf = ShortTermBuffer::new(10);
        for n in 0..10 {
            buf.write(slot(n));
        }
        assert_eq!(buf.len(), 10);
        let (index, overwrote) = buf.write(slot(99));
        assert_eq!(index, 0);
        assert!(overwrote);
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.slot(0).map(|s| s.entity), Some(EntityId(99)));
        assert_eq!(buf.slot(1).map(|s| s.entity), Some(EntityId(1)));
    }

    #[test]
    fn iter_recent_is_newest_first() {
        let mut buf = ShortTermBuffer::new(3);
        for n in 0..5 {
            buf.write(slot(n));
        }
        let order: Vec<u32> = buf.iter_recent().map(|s| s.entity.0).collect();
        assert_eq!(order, vec![4, 3, 2]);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut buf = ShortTermBuffer::new(0);
        buf.write(slot(1));
        buf.write(slot(2));
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.slot(0).map(|s| s.entity), Some(EntityId(2)));
    }
}
