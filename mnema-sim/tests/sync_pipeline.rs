//! End-to-end: agents think, the scheduler queues batches, the worker
//! delivers them through a transport.

use std::sync::Arc;

use parking_lot::Mutex;

use mnema_core::config::SyncConfig;
use mnema_core::types::{AgentId, EntityId, EntityKind, Position};
use mnema_sim::{CognitionRule, SimConfig, SimProfile, SyncScheduler, WorldEntity};
use mnema_sync::{SyncBatch, SyncClient, SyncError, SyncQueue, Transport, spawn_worker};

#[derive(Clone, Default)]
struct Collector {
    bodies: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Transport for Collector {
    async fn send(&self, body: Vec<u8>) -> Result<(), SyncError> {
        self.bodies.lock().push(body);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn batches_reach_the_transport() {
    let sync = SyncConfig {
        enabled: true,
        interval_ticks: 5,
        ..SyncConfig::default()
    };
    let config = SimConfig {
        seed: Some(11),
        checkpoint_interval_ticks: 0,
        ..SimConfig::for_profile(SimProfile::Standard)
    };

    let queue = SyncQueue::new(sync.queue_capacity);
    let collector = Collector::default();
    let worker = spawn_worker(SyncClient::from_config(collector.clone(), &sync), queue.clone());

    let mut rule = CognitionRule::new(config).with_sync(SyncScheduler::with_queue(queue.clone(), &sync));
    rule.add_entity(WorldEntity::new(EntityId(500), EntityKind::Resource, Position::new(20.0, 20.0)));
    rule.spawn(AgentId(1), Position::new(18.0, 20.0));
    rule.spawn(AgentId(2), Position::new(22.0, 20.0));

    let mut queued = 0;
    for _ in 0..10 {
        queued += rule.tick().sync_batches;
    }
    assert_eq!(queued, 4);
    assert_eq!(rule.counters().snapshot().sync_batches, 4);

    worker.shutdown().await;

    let stats = queue.stats();
    assert_eq!(stats.total_sent, 4);
    let bodies = collector.bodies.lock();
    let agents: Vec<AgentId> = bodies
        .iter()
        .map(|b| SyncBatch::decode(b).expect("valid body").agent)
        .collect();
    assert!(agents.contains(&AgentId(1)));
    assert!(agents.contains(&AgentId(2)));
}
