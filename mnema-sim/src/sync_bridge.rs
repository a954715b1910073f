//! Sync Bridge — turns agent minds into sync batches on a schedule.
//!
//! The scheduler runs on the simulation thread and only enqueues; delivery
//! happens on the `mnema-sync` worker task.

use std::collections::HashMap;

use tracing::debug;

use mnema_core::agent::AgentMind;
use mnema_core::config::SyncConfig;
use mnema_core::consolidation;
use mnema_core::memory::MemoryView;
use mnema_core::metrics::MnemaCounters;
use mnema_core::types::{AgentId, Tick};
use mnema_sync::{HttpTransport, SyncBatch, SyncClient, SyncQueue, WorkerHandle, spawn_worker};

/// Per-agent batch schedule.
pub struct SyncScheduler {
    queue: SyncQueue,
    interval: Tick,
    max_records: usize,
    last_sync: HashMap<AgentId, Tick>,
}

impl SyncScheduler {
    /// Scheduler feeding a fresh queue sized from `config`.
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self::with_queue(SyncQueue::new(config.queue_capacity), config)
    }

    /// Scheduler feeding an existing queue.
    #[must_use]
    pub fn with_queue(queue: SyncQueue, config: &SyncConfig) -> Self {
        Self {
            queue,
            interval: config.interval_ticks.max(1),
            max_records: config.max_records_per_batch,
            last_sync: HashMap::new(),
        }
    }

    /// Scheduler plus an HTTP worker draining its queue. Must be called
    /// inside a tokio runtime.
    #[must_use]
    pub fn start(config: &SyncConfig) -> (Self, WorkerHandle) {
        let scheduler = Self::new(config);
        let client = SyncClient::from_config(HttpTransport::new(config), config);
        let worker = spawn_worker(client, scheduler.queue());
        (scheduler, worker)
    }

    /// Handle to the outgoing queue.
    #[must_use]
    pub fn queue(&self) -> SyncQueue {
        self.queue.clone()
    }

    /// Tick of the agent's last batch.
    #[must_use]
    pub fn last_sync(&self, agent: AgentId) -> Option<Tick> {
        self.last_sync.get(&agent).copied()
    }

    /// Drop an agent's schedule.
    pub fn forget(&mut self, agent: AgentId) {
        self.last_sync.remove(&agent);
    }

    /// Enqueue a batch of everything `mind` recorded since its last batch,
    /// log and long-term alike, if the interval has elapsed. Returns `true` if a batch was queued.
    pub fn maybe_enqueue(&mut self, mind: &AgentMind, now: Tick, counters: Option<&MnemaCounters>) -> bool {
        let agent = mind.id();
        let last = self.last_sync(agent);
        if !consolidation::is_due(last.unwrap_or(0), now, self.interval) {
            return false;
        }
        self.last_sync.insert(agent, now);

        let fresh = mind.store().records_since(last.map_or(0, |l| l + 1));
        let batch = SyncBatch::from_parts(
            agent,
            now,
            fresh,
            mind.distiller().patterns().patterns(),
            self.max_records,
        );
        if batch.is_empty() {
            return false;
        }
        let records = batch.records.len();
        if self.queue.push(batch).is_err() {
            return false;
        }
        if let Some(counters) = counters {
            MnemaCounters::add(&counters.sync_batches, 1);
        }
        debug!(agent = %agent, tick = now, records, "Sync batch queued");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnema_core::config::MnemaConfig;
    use mnema_core::memory::Observation;
    use mnema_core::types::{EntityId, EntityKind, Position};

    fn mind_with_records(ticks: &[Tick]) -> (AgentMind, MnemaConfig) {
        let config = MnemaConfig::default();
        let mut mind = AgentMind::new(AgentId(1), &config);
        for &tick in ticks {
            let obs = Observation::new(EntityId(5), EntityKind::Resource, Position::new(3.0, 3.0), 0.6);
            mind.record(obs, 50.0, tick, &config);
        }
        (mind, config)
    }

    fn sync_config(interval: Tick) -> SyncConfig {
        SyncConfig {
            enabled: true,
            interval_ticks: interval,
            ..SyncConfig::default()
        }
    }

    #[test]
    fn batches_follow_the_interval() {
        let (mind, _) = mind_with_records(&[1, 2, 3]);
        let mut scheduler = SyncScheduler::new(&sync_config(10));

        assert!(!scheduler.maybe_enqueue(&mind, 5, None));
        assert!(scheduler.maybe_enqueue(&mind, 10, None));
        assert_eq!(scheduler.last_sync(AgentId(1)), Some(10));
        assert!(!scheduler.maybe_enqueue(&mind, 15, None));

        let batch = scheduler.queue().pop().expect("queued");
        assert_eq!(batch.records.len(), 3);
    }

    #[test]
    fn only_new_records_are_sent() {
        let (mut mind, config) = mind_with_records(&[1, 2]);
        let mut scheduler = SyncScheduler::new(&sync_config(10));
        let counters = MnemaCounters::new();

        assert!(scheduler.maybe_enqueue(&mind, 10, Some(&counters)));
        let obs = Observation::new(EntityId(6), EntityKind::Hazard, Position::new(4.0, 4.0), 0.8);
        mind.record(obs, 50.0, 12, &config);
        assert!(scheduler.maybe_enqueue(&mind, 20, Some(&counters)));

        let queue = scheduler.queue();
        assert_eq!(queue.pop().expect("first").records.len(), 2);
        let second = queue.pop().expect("second");
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0].tick, 12);
        assert_eq!(counters.snapshot().sync_batches, 2);
    }

    #[test]
    fn consolidated_records_are_still_sent() {
        use mnema_core::agent::AgentState;
        use mnema_core::environment::Percept;
        use mnema_core::rng::ScriptedRandom;

        let config = MnemaConfig::default();
        let mut mind = AgentMind::new(AgentId(1), &config);
        let mut state = AgentState::new(Position::new(10.0, 10.0));
        let mut rng = ScriptedRandom::new(vec![0.5]);
        let mut scheduler = SyncScheduler::new(&sync_config(100));
        let hazard = Percept::new(EntityId(9), EntityKind::Hazard, Position::new(14.0, 10.0));

        for t in 95..=100 {
            let feed = if t == 98 { vec![hazard] } else { Vec::new() };
            mind.tick(&mut state, &feed, t, &mut rng, &config, None);
            scheduler.maybe_enqueue(&mind, t, None);
        }

        assert_eq!(mind.store().long_term().len(), 1);
        assert!(mind.store().log().is_empty());
        let batch = scheduler.queue().pop().expect("batch at tick 100");
        assert_eq!(batch.tick, 100);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].tick, 98);
        assert_eq!(batch.records[0].entity_kind(), Some(EntityKind::Hazard));
    }

    #[test]
    fn nothing_new_queues_nothing() {
        let (mind, _) = mind_with_records(&[]);
        let mut scheduler = SyncScheduler::new(&sync_config(1));
        assert!(!scheduler.maybe_enqueue(&mind, 3, None));
        assert!(scheduler.queue().is_empty());
    }

    #[test]
    fn full_queue_is_not_fatal() {
        let (mind, _) = mind_with_records(&[1]);
        let config = SyncConfig {
            queue_capacity: 1,
            ..sync_config(1)
        };
        let mut scheduler = SyncScheduler::new(&config);
        let mut other = AgentMind::new(AgentId(2), &MnemaConfig::default());
        other.record(
            Observation::new(EntityId(1), EntityKind::Agent, Position::new(0.0, 0.0), 0.5),
            50.0,
            1,
            &MnemaConfig::default(),
        );
        assert!(scheduler.maybe_enqueue(&mind, 2, None));
        assert!(!scheduler.maybe_enqueue(&other, 2, None));
        assert_eq!(scheduler.queue().stats().total_dropped, 1);
    }
}
