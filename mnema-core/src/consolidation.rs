//! Long-term consolidation — "What I keep".
//!
//! Every `consolidation_interval_ticks` the store moves records whose
//! importance is strictly above `consolidation_threshold` out of the rolling
//! log into a per-agent long-term list. Everything else stays in the log and
//! keeps decaying there.

use std::collections::VecDeque;

use crate::memory::episodic::EpisodicRecord;
use crate::types::Tick;

/// Whether a consolidation pass is due at `now`.
#[must_use]
pub fn is_due(last_pass: Tick, now: Tick, interval: Tick) -> bool {
    interval > 0 && now.saturating_sub(last_pass) >= interval
}

/// Move records above `threshold` from `log` into `long_term`, keeping
/// relative order on both sides. Returns the number moved.
pub fn consolidate(
    log: &mut VecDeque<EpisodicRecord>,
    long_term: &mut Vec<EpisodicRecord>,
    threshold: f32,
) -> usize {
    let before = long_term.len();
    let mut kept = VecDeque::with_capacity(log.len());
    for record in log.drain(..) {
        if record.importance > threshold {
            long_term.push(record);
        } else {
            kept.push_back(record);
        }
    }
    *log = kept;
    long_term.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::episodic::{EpisodicRecord, Observation};
    use crate::config::EpisodicConfig;
    use crate::memory::store::EpisodicStore;
    use crate::types::{EntityId, EntityKind, Position};

    fn records(importances: &[f32]) -> VecDeque<EpisodicRecord> {
        let config = EpisodicConfig::default();
        let mut store = EpisodicStore::new(&config);
        importances
            .iter()
            .enumerate()
            .map(|(i, imp)| {
                let obs = Observation::new(
                    EntityId(i as u32),
                    EntityKind::Resource,
                    Position::new(0.0, 0.0),
                    *imp,
                );
                store.record(obs, 50.0, i as u64, &config)
            })
            .collect()
    }

    #[test]
    fn moves_only_strictly_above_threshold() {
        let mut log = records(&[0.9, 0.7, 0.71, 0.2]);
        let mut long_term = Vec::new();
        let moved = consolidate(&mut log, &mut long_term, 0.7);
        assert_eq!(moved, 2);
        assert_eq!(log.len(), 2);
        assert!(long_term.iter().all(|r| r.importance > 0.7));
        assert_eq!(long_term[0].source_entity, EntityId(0));
        assert_eq!(long_term[1].source_entity, EntityId(2));
    }

    #[test]
    fn due_after_interval() {
        assert!(!is_due(0, 99, 100));
        assert!(is_due(0, 100, 100));
        assert!(!is_due(0, 1000, 0));
    }
}
