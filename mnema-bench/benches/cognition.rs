//! MNEMA Benchmark Suite
//!
//! Targets for the default `Standard` profile:
//!   episodic_record_single ............ < 10μs
//!   distill_pass_500_records .......... < 500μs
//!   generalize_three_environments ..... < 200μs
//!   frame_50_agents ................... < 2ms

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use mnema_core::config::MnemaConfig;
use mnema_core::types::{AgentId, EntityId, EntityKind, EnvironmentId, Position};
use mnema_core::{EpisodicStore, KnowledgeHierarchy, Observation, SemanticDistiller};
use mnema_sim::{CognitionRule, SimConfig, SimProfile, WorldEntity};

const KINDS: [EntityKind; 4] = [EntityKind::Resource, EntityKind::Hazard, EntityKind::Obstacle, EntityKind::Agent];

fn observation(i: u32) -> Observation {
    let kind = KINDS[i as usize % KINDS.len()];
    let position = Position::new((i % 100) as f32, ((i * 7) % 100) as f32);
    Observation::new(EntityId(i % 40), kind, position, 0.4 + (i % 6) as f32 / 10.0)
}

fn populated_store(config: &MnemaConfig, n: u32) -> EpisodicStore {
    let mut store = EpisodicStore::new(&config.episodic);
    for i in 0..n {
        store.record(observation(i), 50.0, u64::from(i / 5), &config.episodic);
    }
    store
}

/// Benchmark: Single record into a warm store (target: < 10μs).
fn bench_record(c: &mut Criterion) {
    let config = MnemaConfig::default();
    let mut store = populated_store(&config, 500);
    let mut tick = 100;
    c.bench_function("episodic_record_single", |b| {
        b.iter(|| {
            tick += 1;
            let record = store.record(black_box(observation(42)), 50.0, tick, &config.episodic);
            black_box(record);
        });
    });
}

/// Benchmark: One distillation pass over a full log (target: < 500μs).
fn bench_distill(c: &mut Criterion) {
    let config = MnemaConfig::default();
    let store = populated_store(&config, 500);
    c.bench_function("distill_pass_500_records", |b| {
        b.iter_batched(
            SemanticDistiller::new,
            |mut distiller| {
                let produced = distiller.run(black_box(&store), 100, &config.distill);
                black_box(produced);
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark: Generalization over low-tier knowledge from three
/// environments (target: < 200μs).
fn bench_generalize(c: &mut Criterion) {
    let config = MnemaConfig::default();
    let mut hierarchy = KnowledgeHierarchy::new();
    for env in 1..=3 {
        let store = populated_store(&config, 60);
        let environment = EnvironmentId(env);
        hierarchy.register_environment(environment);
        hierarchy.ingest_experiences(&store, environment, 12, &config.knowledge);
    }
    c.bench_function("generalize_three_environments", |b| {
        b.iter_batched(
            || hierarchy.clone(),
            |mut h| black_box(h.generalize(50, &config.knowledge)),
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark: Full frame for 50 agents (target: < 2ms).
fn bench_frame(c: &mut Criterion) {
    let config = SimConfig {
        seed: Some(7),
        checkpoint_interval_ticks: 0,
        ..SimConfig::for_profile(SimProfile::Standard)
    };
    let mut rule = CognitionRule::new(config);
    for i in 0..40 {
        let kind = KINDS[i as usize % 3];
        let position = Position::new((i * 13 % 100) as f32, (i * 29 % 100) as f32);
        rule.add_entity(WorldEntity::new(EntityId(10_000 + i), kind, position));
    }
    for i in 0..50 {
        rule.spawn(AgentId(i), Position::new((i * 2) as f32, (i * 3 % 100) as f32));
    }
    // Warm up past the first consolidation and generalization passes.
    for _ in 0..120 {
        rule.tick();
    }
    c.bench_function("frame_50_agents", |b| {
        b.iter(|| black_box(rule.tick()));
    });
}

criterion_group!(benches, bench_record, bench_distill, bench_generalize, bench_frame);
criterion_main!(benches);
