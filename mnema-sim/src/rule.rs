//! Cognition Rule — drives every agent's mind once per host tick.
//!
//! Tick order:
//!
//! 1. Apply queued [`SimEvent`]s in arrival order.
//! 2. Snapshot what is visible (world entities and agent bodies).
//! 3. For each active agent, in `AgentId` order: sense, think, step.
//! 4. Queue sync batches and checkpoint snapshots when due.
//!
//! Agents see the world as it was at step 2, so the order in which agents
//! are processed never changes what any of them perceives.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, debug_span, info, info_span, warn};

use mnema_core::agent::{AgentMind, MindRegistry, TickReport};
use mnema_core::error::Result;
use mnema_core::metrics::{MnemaCounters, TickBudgetMonitor, spans};
use mnema_core::persistence::PersistenceEngine;
use mnema_core::rng::SeededRandom;
use mnema_core::types::{AgentId, EntityId, EnvironmentId, Position, Tick};

use crate::components::{AgentBody, WorldEntity, entity_of};
use crate::config::SimConfig;
use crate::events::SimEvent;
use crate::sync_bridge::SyncScheduler;
use crate::systems;

/// What one host tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Tick number.
    pub tick: Tick,
    /// Events applied.
    pub events: usize,
    /// Agents that thought this tick.
    pub agents: usize,
    /// Environment transitions.
    pub transitions: usize,
    /// Decisions driven by knowledge rather than fallback.
    pub knowledge_decisions: usize,
    /// Sync batches queued.
    pub sync_batches: usize,
    /// Snapshots written.
    pub checkpointed: usize,
}

/// Central state of the cognition layer inside a host.
pub struct CognitionRule {
    config: SimConfig,
    minds: MindRegistry,
    bodies: BTreeMap<AgentId, AgentBody>,
    world: BTreeMap<EntityId, WorldEntity>,
    events: VecDeque<SimEvent>,
    global_override: Option<EnvironmentId>,
    rng: SeededRandom,
    counters: Arc<MnemaCounters>,
    monitor: TickBudgetMonitor,
    sync: Option<SyncScheduler>,
    persistence: Option<PersistenceEngine>,
    current_tick: Tick,
}

impl CognitionRule {
    /// Create a rule with no agents.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        let rng = config.seed.map_or_else(SeededRandom::from_env_or_random, SeededRandom::new);
        info!(profile = ?config.profile, seed = rng.seed(), "Cognition rule created");
        Self {
            monitor: TickBudgetMonitor::new(config.tick_budget_ms),
            config,
            minds: MindRegistry::new(),
            bodies: BTreeMap::new(),
            world: BTreeMap::new(),
            events: VecDeque::new(),
            global_override: None,
            rng,
            counters: Arc::new(MnemaCounters::new()),
            sync: None,
            persistence: None,
            current_tick: 0,
        }
    }

    /// Attach a sync scheduler.
    #[must_use]
    pub fn with_sync(mut self, scheduler: SyncScheduler) -> Self {
        self.sync = Some(scheduler);
        self
    }

    /// Attach a snapshot store used for checkpoints and restores.
    #[must_use]
    pub fn with_persistence(mut self, engine: PersistenceEngine) -> Self {
        self.persistence = Some(engine);
        self
    }

    // -----------------------------------------------------------------------
    // Host-facing API
    // -----------------------------------------------------------------------

    /// Queue an event for the next tick.
    pub fn push_event(&mut self, event: SimEvent) {
        self.events.push_back(event);
    }

    /// Place a perceivable entity immediately.
    pub fn add_entity(&mut self, entity: WorldEntity) {
        self.world.insert(entity.id, entity);
    }

    /// Spawn an agent immediately. Replaces any existing body.
    pub fn spawn(&mut self, agent: AgentId, position: Position) {
        let position = systems::collide(position, self.config.world);
        self.bodies.insert(agent, AgentBody::new(position));
        self.minds.mind_mut(agent, &self.config.core);
        debug!(agent = %agent, x = position.x, y = position.y, "Agent spawned");
    }

    /// Remove an agent and its mind.
    pub fn despawn(&mut self, agent: AgentId) -> Option<AgentMind> {
        self.bodies.remove(&agent);
        if let Some(sync) = self.sync.as_mut() {
            sync.forget(agent);
        }
        self.minds.remove(agent)
    }

    /// Advance one tick.
    pub fn tick(&mut self) -> FrameReport {
        self.current_tick += 1;
        let now = self.current_tick;
        let started = Instant::now();
        let _span = info_span!(spans::TICK, tick = now).entered();

        let mut report = FrameReport {
            tick: now,
            ..FrameReport::default()
        };
        while let Some(event) = self.events.pop_front() {
            self.apply(event, now);
            report.events += 1;
        }

        let visible: Vec<WorldEntity> = self
            .world
            .values()
            .copied()
            .chain(self.bodies.iter().map(|(agent, body)| body.as_entity(*agent)))
            .collect();

        let limit = self.config.profile.max_active_agents();
        let core = &self.config.core;
        for (&agent, body) in self.bodies.iter_mut().filter(|(_, b)| b.active).take(limit) {
            let _agent_span = debug_span!(spans::AGENT, agent = %agent).entered();
            let percepts = systems::sense(
                entity_of(agent),
                body.state.position,
                &visible,
                self.config.perception_radius,
                core.environment.perception_capacity,
            );
            body.state.environment_override = self.global_override;

            let mind = self.minds.mind_mut(agent, core);
            let counters = Some(self.counters.as_ref());
            let outcome: TickReport = mind.tick(&mut body.state, &percepts, now, &mut self.rng, core, counters);
            systems::step(&mut body.state, self.config.movement_speed, self.config.world);

            report.agents += 1;
            report.transitions += usize::from(outcome.transition.is_some());
            report.knowledge_decisions += usize::from(outcome.decision.source.is_some());
            if let Some(sync) = self.sync.as_mut() {
                report.sync_batches += usize::from(sync.maybe_enqueue(mind, now, counters));
            }
        }

        let every = self.config.checkpoint_interval_ticks;
        if every > 0 && now % every == 0 {
            match self.checkpoint() {
                Ok(saved) => report.checkpointed = saved,
                Err(e) => warn!(error = %e, tick = now, "Checkpoint failed"),
            }
        }
        self.monitor.record(started.elapsed().as_secs_f64() * 1000.0);
        if self.monitor.is_over_budget() {
            debug!(
                tick = now,
                ms = self.monitor.last_tick_ms(),
                budget = self.monitor.budget_ms(),
                "Tick over budget"
            );
        }
        report
    }

    /// Save every mind to the attached store. Returns the number saved
    /// (0 without a store).
    ///
    /// # Errors
    /// Propagates persistence errors.
    pub fn checkpoint(&mut self) -> Result<usize> {
        let Some(engine) = self.persistence.as_mut() else {
            return Ok(0);
        };
        let _span = info_span!(spans::PERSIST_SAVE, tick = self.current_tick).entered();
        let snapshots: Vec<_> = self
            .minds
            .agents()
            .into_iter()
            .filter_map(|agent| self.minds.get(agent).map(|m| m.snapshot(self.current_tick)))
            .collect();
        let saved = engine.save_all(&snapshots)?;
        MnemaCounters::add(&self.counters.snapshots_saved, saved as u64);
        if self.config.core.persistence.backup_count > 0 {
            engine.create_rotating_backup()?;
        }
        Ok(saved)
    }

    /// Restore an agent's mind from the attached store and give it a body at
    /// `position`. Returns `false` if nothing was stored for it.
    ///
    /// # Errors
    /// Propagates persistence errors.
    pub fn restore(&mut self, agent: AgentId, position: Position) -> Result<bool> {
        let Some(engine) = self.persistence.as_ref() else {
            return Ok(false);
        };
        let _span = info_span!(spans::PERSIST_LOAD, agent = %agent).entered();
        let Some(snapshot) = engine.load(agent)? else {
            return Ok(false);
        };
        self.minds.insert(AgentMind::restore(snapshot, &self.config.core));
        self.bodies.insert(agent, AgentBody::new(systems::collide(position, self.config.world)));
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current tick.
    #[must_use]
    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// An agent's mind.
    #[must_use]
    pub fn mind(&self, agent: AgentId) -> Option<&AgentMind> {
        self.minds.get(agent)
    }

    /// An agent's body.
    #[must_use]
    pub fn body(&self, agent: AgentId) -> Option<&AgentBody> {
        self.bodies.get(&agent)
    }

    /// Mutable access to an agent's body.
    pub fn body_mut(&mut self, agent: AgentId) -> Option<&mut AgentBody> {
        self.bodies.get_mut(&agent)
    }

    /// Number of agents with a body.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.bodies.len()
    }

    /// Shared counters (for exporters).
    #[must_use]
    pub fn counters(&self) -> Arc<MnemaCounters> {
        Arc::clone(&self.counters)
    }

    /// Tick timing monitor.
    #[must_use]
    pub fn monitor(&self) -> &TickBudgetMonitor {
        &self.monitor
    }

    /// The attached sync scheduler.
    #[must_use]
    pub fn sync(&self) -> Option<&SyncScheduler> {
        self.sync.as_ref()
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    fn apply(&mut self, event: SimEvent, now: Tick) {
        debug!(event = event.name(), agent = ?event.agent(), tick = now, "Applying event");
        match event {
            SimEvent::Spawned { agent, position } => self.spawn(agent, position),
            SimEvent::Despawned { agent } => {
                self.despawn(agent);
            }
            SimEvent::Teleported { agent, position } => {
                let world = self.config.world;
                if let Some(body) = self.bodies.get_mut(&agent) {
                    body.state.position = systems::collide(position, world);
                }
            }
            SimEvent::FluxChanged { agent, effect } => {
                if let Some(body) = self.bodies.get_mut(&agent) {
                    body.state.flux_effect = effect;
                }
            }
            SimEvent::GlobalOverride { environment } => self.global_override = environment,
            SimEvent::EmotionChanged { agent, value } => {
                if let Some(body) = self.bodies.get_mut(&agent) {
                    body.state.emotional_state = value.clamp(0.0, 100.0);
                }
            }
            SimEvent::Synthetic {
                agent,
                source,
                position,
                importance,
            } => {
                let Some(emotional_state) = self.bodies.get(&agent).map(|b| b.state.emotional_state) else {
                    return;
                };
                if let Some(mind) = self.minds.get_mut(agent) {
                    mind.record_synthetic(source, position, importance, emotional_state, now, &self.config.core);
                }
            }
            SimEvent::Recalled { agent, record, changes } => {
                if let Some(mind) = self.minds.get_mut(agent) {
                    if mind.reconstruct(record, changes, now, &self.config.core).is_none() {
                        debug!(agent = %agent, record = %record, "Recalled record no longer exists");
                    }
                }
            }
            SimEvent::EntityAdded(entity) => self.add_entity(entity),
            SimEvent::EntityMoved { entity, position } => {
                if let Some(e) = self.world.get_mut(&entity) {
                    e.position = position;
                }
            }
            SimEvent::EntityRemoved(entity) => {
                self.world.remove(&entity);
            }
        }
    }
}
