//! Runtime metrics — counters, tick budget, span names.
//!
//! Counters are lock-free `AtomicU64`s bumped on the tick path and read on
//! export. The tick budget monitor keeps a ring of recent tick timings
//! behind a `parking_lot::Mutex`; reads are rare (dashboards, benches).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Atomic counters for cognition pipeline events.
#[derive(Debug)]
pub struct MnemaCounters {
    /// Episodic records created.
    pub records_created: AtomicU64,
    /// Episodic records pruned by decay.
    pub records_pruned: AtomicU64,
    /// Records moved to long-term storage.
    pub records_consolidated: AtomicU64,
    /// Distillation passes completed.
    pub distill_passes: AtomicU64,
    /// Low-tier knowledge entries ingested.
    pub knowledge_ingested: AtomicU64,
    /// Knowledge entries pruned by decay.
    pub knowledge_pruned: AtomicU64,
    /// Mid and high entries created or merged by generalization.
    pub promotions: AtomicU64,
    /// Environment transitions.
    pub environment_transitions: AtomicU64,
    /// Adaptation passes triggered by dissimilar transitions.
    pub adaptations: AtomicU64,
    /// Decisions driven by knowledge.
    pub knowledge_decisions: AtomicU64,
    /// Fallback decisions.
    pub fallback_decisions: AtomicU64,
    /// Snapshots saved.
    pub snapshots_saved: AtomicU64,
    /// Sync batches enqueued.
    pub sync_batches: AtomicU64,
}

impl MnemaCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records_created: AtomicU64::new(0),
            records_pruned: AtomicU64::new(0),
            records_consolidated: AtomicU64::new(0),
            distill_passes: AtomicU64::new(0),
            knowledge_ingested: AtomicU64::new(0),
            knowledge_pruned: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            environment_transitions: AtomicU64::new(0),
            adaptations: AtomicU64::new(0),
            knowledge_decisions: AtomicU64::new(0),
            fallback_decisions: AtomicU64::new(0),
            snapshots_saved: AtomicU64::new(0),
            sync_batches: AtomicU64::new(0),
        }
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            records_created: load(&self.records_created),
            records_pruned: load(&self.records_pruned),
            records_consolidated: load(&self.records_consolidated),
            distill_passes: load(&self.distill_passes),
            knowledge_ingested: load(&self.knowledge_ingested),
            knowledge_pruned: load(&self.knowledge_pruned),
            promotions: load(&self.promotions),
            environment_transitions: load(&self.environment_transitions),
            adaptations: load(&self.adaptations),
            decisions: [load(&self.knowledge_decisions), load(&self.fallback_decisions)],
            snapshots_saved: load(&self.snapshots_saved),
            sync_batches: load(&self.sync_batches),
        }
    }
}

impl Default for MnemaCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Episodic records created.
    pub records_created: u64,
    /// Episodic records pruned.
    pub records_pruned: u64,
    /// Records consolidated.
    pub records_consolidated: u64,
    /// Distillation passes.
    pub distill_passes: u64,
    /// Low-tier entries ingested.
    pub knowledge_ingested: u64,
    /// Knowledge entries pruned.
    pub knowledge_pruned: u64,
    /// Generalization promotions.
    pub promotions: u64,
    /// Environment transitions.
    pub environment_transitions: u64,
    /// Adaptation passes.
    pub adaptations: u64,
    /// Decisions by source [knowledge, fallback].
    pub decisions: [u64; 2],
    /// Snapshots saved.
    pub snapshots_saved: u64,
    /// Sync batches enqueued.
    pub sync_batches: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        let mut counter = |name: &str, help: &str, value: u64| {
            out.push_str(&format!(
                "# HELP mnema_{name}_total {help}\n# TYPE mnema_{name}_total counter\nmnema_{name}_total {value}\n"
            ));
        };
        counter("records_created", "Episodic records created", self.records_created);
        counter("records_pruned", "Episodic records pruned by decay", self.records_pruned);
        counter("records_consolidated", "Records moved to long-term storage", self.records_consolidated);
        counter("distill_passes", "Semantic distillation passes", self.distill_passes);
        counter("knowledge_ingested", "Low-tier knowledge entries ingested", self.knowledge_ingested);
        counter("knowledge_pruned", "Knowledge entries pruned by decay", self.knowledge_pruned);
        counter("promotions", "Knowledge promotions", self.promotions);
        counter("environment_transitions", "Environment transitions", self.environment_transitions);
        counter("adaptations", "Knowledge adaptation passes", self.adaptations);
        counter("snapshots_saved", "Snapshots saved", self.snapshots_saved);
        counter("sync_batches", "Sync batches enqueued", self.sync_batches);
        out.push_str(&format!(
            "# HELP mnema_decisions_total Decisions by source\n\
             # TYPE mnema_decisions_total counter\n\
             mnema_decisions_total{{source=\"knowledge\"}} {}\n\
             mnema_decisions_total{{source=\"fallback\"}} {}\n",
            self.decisions[0], self.decisions[1],
        ));
        out
    }
}

// ---------------------------------------------------------------------------
// Tick Budget Monitor
// ---------------------------------------------------------------------------

const HISTORY_LEN: usize = 256;

/// Tracks time spent per simulation tick in the cognition pipeline.
///
/// ```rust,no_run
/// # use mnema_core::metrics::TickBudgetMonitor;
/// let monitor = TickBudgetMonitor::new(2.0);
/// {
///     let _guard = monitor.begin_tick();
///     // ... run cognition for every agent ...
/// }
/// assert!(monitor.last_tick_ms() < 2.0);
/// ```
#[derive(Debug)]
pub struct TickBudgetMonitor {
    budget_ms: f64,
    history: Mutex<TickHistory>,
}

#[derive(Debug)]
struct TickHistory {
    timings: Vec<f64>,
    write_idx: usize,
    count: u64,
    last_over_budget: bool,
}

impl TickBudgetMonitor {
    /// Create a monitor with the given per-tick budget (milliseconds).
    #[must_use]
    pub fn new(budget_ms: f64) -> Self {
        Self {
            budget_ms,
            history: Mutex::new(TickHistory {
                timings: vec![0.0; HISTORY_LEN],
                write_idx: 0,
                count: 0,
                last_over_budget: false,
            }),
        }
    }

    /// Begin timing a tick. The guard records elapsed time on drop.
    pub fn begin_tick(&self) -> TickGuard<'_> {
        TickGuard {
            monitor: self,
            start: Instant::now(),
        }
    }

    /// Record a tick timing manually (milliseconds).
    pub fn record(&self, ms: f64) {
        let mut h = self.history.lock();
        let idx = h.write_idx;
        h.timings[idx] = ms;
        h.write_idx = (idx + 1) % HISTORY_LEN;
        h.count += 1;
        h.last_over_budget = ms > self.budget_ms;
    }

    /// Last tick's timing (milliseconds).
    #[must_use]
    pub fn last_tick_ms(&self) -> f64 {
        let h = self.history.lock();
        if h.count == 0 {
            return 0.0;
        }
        h.timings[(h.write_idx + HISTORY_LEN - 1) % HISTORY_LEN]
    }

    /// Whether the last tick exceeded the budget.
    #[must_use]
    pub fn is_over_budget(&self) -> bool {
        self.history.lock().last_over_budget
    }

    /// P50 / P95 / P99 / max over the history ring.
    #[must_use]
    pub fn percentiles(&self) -> TickPercentiles {
        let h = self.history.lock();
        let n = usize::try_from(h.count).unwrap_or(usize::MAX).min(HISTORY_LEN);
        if n == 0 {
            return TickPercentiles::default();
        }
        let mut sorted = h.timings[..n].to_vec();
        sorted.sort_by(f64::total_cmp);

        let at = |q: f64| sorted[((n as f64 * q) as usize).min(n - 1)];
        let over = sorted.iter().filter(|&&t| t > self.budget_ms).count();
        TickPercentiles {
            p50: sorted[n / 2],
            p95: at(0.95),
            p99: at(0.99),
            max: sorted[n - 1],
            over_budget_ratio: over as f64 / n as f64,
        }
    }

    /// Ticks recorded.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.history.lock().count
    }

    /// Configured budget in milliseconds.
    #[must_use]
    pub fn budget_ms(&self) -> f64 {
        self.budget_ms
    }
}

/// Records elapsed time into its monitor when dropped.
pub struct TickGuard<'a> {
    monitor: &'a TickBudgetMonitor,
    start: Instant,
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.monitor.record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

/// Percentile statistics for tick timings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickPercentiles {
    /// Median (ms).
    pub p50: f64,
    /// 95th percentile (ms).
    pub p95: f64,
    /// 99th percentile (ms).
    pub p99: f64,
    /// Maximum observed (ms).
    pub max: f64,
    /// Share of ticks over budget (0.0 to 1.0).
    pub over_budget_ratio: f64,
}

impl TickPercentiles {
    /// Human-readable one-line summary.
    #[must_use]
    pub fn summary(&self, budget_ms: f64) -> String {
        format!(
            "P50={:.2}ms  P95={:.2}ms  P99={:.2}ms  Max={:.2}ms  Budget={budget_ms:.1}ms  Over-budget={:.1}%",
            self.p50,
            self.p95,
            self.p99,
            self.max,
            self.over_budget_ratio * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Span Names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::span!`.
pub mod spans {
    /// One simulation tick across all agents.
    pub const TICK: &str = "mnema::tick";
    /// One agent's cognition step.
    pub const AGENT: &str = "mnema::agent";
    /// Environment update and adaptation.
    pub const ENVIRONMENT: &str = "mnema::environment";
    /// Episodic ingest.
    pub const EPISODIC: &str = "mnema::episodic";
    /// Semantic distillation.
    pub const DISTILL: &str = "mnema::distill";
    /// Knowledge ingest, decay and generalization.
    pub const KNOWLEDGE: &str = "mnema::knowledge";
    /// Decision and feedback.
    pub const DECISION: &str = "mnema::decision";
    /// Snapshot save.
    pub const PERSIST_SAVE: &str = "mnema::persist::save";
    /// Snapshot load.
    pub const PERSIST_LOAD: &str = "mnema::persist::load";
    /// Cloud sync delivery.
    pub const SYNC: &str = "mnema::sync";
}
