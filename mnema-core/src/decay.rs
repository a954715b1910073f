//! Decay models for episodic importance and knowledge confidence.
//!
//! Episodic importance follows an exponential curve over record age:
//!   I' = I × e^(-λ·age)
//!
//! Where:
//!   λ   = `episodic.decay_rate` (per tick)
//!   age = now − timestamp (ticks)
//!
//! The curve is applied to the *current* importance on every pass, so two
//! passes at the same `now` compound (I × e^(-2λ·age)). Callers that want a
//! single-application model must track the last decay tick themselves.
//!
//! Knowledge confidence decays linearly in elapsed time units:
//!   C' = C − rate × (elapsed / unit) × tier_multiplier

use crate::config::EpisodicConfig;
use crate::memory::episodic::EpisodicRecord;
use crate::memory::short_term::ShortTermSlot;
use crate::types::Tick;

/// Fraction of importance retained after `age_ticks` at decay constant `rate`.
///
/// Returns a value in (0.0, 1.0]; a non-positive rate retains everything.
#[must_use]
pub fn exponential_retention(rate: f32, age_ticks: Tick) -> f32 {
    if rate <= 0.0 {
        return 1.0;
    }
    (-rate * age_ticks as f32).exp()
}

/// Decay one record in place. Returns `true` while it stays above the floor.
pub fn decay_record(record: &mut EpisodicRecord, now: Tick, config: &EpisodicConfig) -> bool {
    record.importance *= exponential_retention(config.decay_rate, record.age(now));
    record.importance >= config.importance_floor
}

/// Decay one short-term slot in place. Slots are never removed by decay.
pub fn decay_slot(slot: &mut ShortTermSlot, now: Tick, config: &EpisodicConfig) {
    let age = now.saturating_sub(slot.timestamp);
    slot.importance *= exponential_retention(config.decay_rate, age);
}

/// Confidence lost by a knowledge entry over `elapsed_ticks`.
#[must_use]
pub fn knowledge_decay(rate: f32, elapsed_ticks: Tick, unit_ticks: Tick, multiplier: f32) -> f32 {
    let units = elapsed_ticks as f32 / unit_ticks.max(1) as f32;
    rate * units * multiplier
}
