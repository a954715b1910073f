//! Generalization — promoting knowledge up the hierarchy.
//!
//! Low → mid: per knowledge type, at least `abstraction_instance_threshold`
//! low entries of which `min_confident_instances` have confidence ≥
//! `abstraction_confidence_threshold`. The confident entries are folded into
//! one mid entry: conditions shared by all of them are generalized (numbers
//! become ranges, booleans take the majority, disagreeing text becomes `Any`)
//! and outcome fields are aggregated (mean, majority, mode).
//!
//! Mid → high: the confident mid entries of a type must span at least
//! `min_environments_for_universal` environments. No count threshold applies
//! here since the mid tier keeps one merged entry per type. Properties present in at
//! least `universal_property_ratio` of them become environment-agnostic
//! (`Any`) conditions of a universal high entry.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::KnowledgeConfig;
use crate::knowledge::condition::{Condition, ConditionValue, Operator};
use crate::knowledge::entry::{Instance, InstanceSource, KnowledgeEntry, KnowledgePattern};
use crate::knowledge::{KnowledgeLevel, KnowledgeType};
use crate::types::{EnvironmentId, Tick, Value};

/// A promotion candidate for one knowledge type.
#[derive(Debug, Clone)]
pub struct Promotion {
    /// Entry to emit, or to merge into an existing one of the same type.
    pub entry: KnowledgeEntry,
    /// How many confident source entries produced it.
    pub sources: usize,
}

fn group_by_kind(entries: &[KnowledgeEntry]) -> BTreeMap<KnowledgeType, Vec<&KnowledgeEntry>> {
    let mut groups: BTreeMap<KnowledgeType, Vec<&KnowledgeEntry>> = BTreeMap::new();
    for entry in entries {
        groups.entry(entry.pattern.kind).or_default().push(entry);
    }
    groups
}

fn mean_confidence(entries: &[&KnowledgeEntry]) -> f32 {
    entries.iter().map(|e| e.confidence).sum::<f32>() / entries.len().max(1) as f32
}

fn promoted_from(
    sources: &[&KnowledgeEntry],
    kind: KnowledgeType,
    level: KnowledgeLevel,
    conditions: Vec<Condition>,
    now: Tick,
) -> KnowledgeEntry {
    let origin = sources.first().map_or(EnvironmentId(0), |e| e.origin_environment);
    let pattern = KnowledgePattern {
        kind,
        conditions,
        outcome: aggregate_outcome(sources),
    };
    let mut entry = KnowledgeEntry::new(pattern, level, mean_confidence(sources), origin, now);
    for source in sources {
        entry.environment_ids.extend(source.environment_ids.iter().copied());
        entry.add_instance(Instance {
            source: InstanceSource::Entry(source.id),
            environment: source.origin_environment,
            observed_at: source.created,
        });
    }
    entry
}

/// Mid-tier candidates from the low tier, one per qualifying type.
#[must_use]
pub fn promote_low_to_mid(low: &[KnowledgeEntry], config: &KnowledgeConfig, now: Tick) -> Vec<Promotion> {
    group_by_kind(low)
        .into_iter()
        .filter(|(_, group)| group.len() >= config.abstraction_instance_threshold)
        .filter_map(|(kind, group)| {
            let confident: Vec<&KnowledgeEntry> = group
                .into_iter()
                .filter(|e| e.confidence >= config.abstraction_confidence_threshold)
                .collect();
            if confident.len() < config.min_confident_instances.max(1) {
                return None;
            }
            let conditions = common_conditions(&confident);
            Some(Promotion {
                entry: promoted_from(&confident, kind, KnowledgeLevel::Mid, conditions, now),
                sources: confident.len(),
            })
        })
        .collect()
}

/// High-tier candidates from the mid tier, one per qualifying type.
///
/// Unlike low → mid there is no instance-count threshold: the mid tier holds
/// at most one entry per type (promotions merge), so the gate is environment
/// breadth alone. The confident entries of a type must together span
/// `min_environments_for_universal` environments.
///
/// Every candidate is universal and associated with all `known_environments`.
#[must_use]
pub fn promote_mid_to_high(
    mid: &[KnowledgeEntry],
    known_environments: &BTreeSet<EnvironmentId>,
    config: &KnowledgeConfig,
    now: Tick,
) -> Vec<Promotion> {
    group_by_kind(mid)
        .into_iter()
        .filter_map(|(kind, group)| {
            let confident: Vec<&KnowledgeEntry> = group
                .into_iter()
                .filter(|e| e.confidence >= config.abstraction_confidence_threshold)
                .collect();
            if confident.is_empty() {
                return None;
            }
            let spanned: BTreeSet<EnvironmentId> = confident
                .iter()
                .flat_map(|e| e.environment_ids.iter().copied())
                .collect();
            if spanned.len() < config.min_environments_for_universal {
                return None;
            }
            let conditions = universal_conditions(&confident, config.universal_property_ratio);
            let mut entry = promoted_from(&confident, kind, KnowledgeLevel::High, conditions, now);
            entry.universal_principle = true;
            entry.environment_ids.extend(known_environments.iter().copied());
            Some(Promotion {
                entry,
                sources: confident.len(),
            })
        })
        .collect()
}

/// Conditions (same property and operator kind) present in every entry,
/// with their values generalized.
#[must_use]
pub fn common_conditions(entries: &[&KnowledgeEntry]) -> Vec<Condition> {
    let Some(first) = entries.first() else {
        return Vec::new();
    };
    first
        .pattern
        .conditions
        .iter()
        .filter_map(|template| {
            let matching: Vec<&Condition> = entries
                .iter()
                .filter_map(|e| {
                    e.pattern
                        .conditions
                        .iter()
                        .find(|c| c.property == template.property && c.operator.same_kind(&template.operator))
                })
                .collect();
            if matching.len() != entries.len() {
                return None;
            }
            Some(Condition::new(
                template.property.clone(),
                widest_operator(&matching),
                generalize_values(&matching),
            ))
        })
        .collect()
}

fn widest_operator(conditions: &[&Condition]) -> Operator {
    conditions
        .iter()
        .map(|c| c.operator)
        .reduce(|acc, op| match (acc, op) {
            (Operator::Near { threshold: a }, Operator::Near { threshold: b }) => {
                Operator::Near { threshold: a.max(b) }
            }
            (acc, _) => acc,
        })
        .unwrap_or(Operator::Equals)
}

fn generalize_values(conditions: &[&Condition]) -> ConditionValue {
    let values: Vec<&ConditionValue> = conditions.iter().map(|c| &c.value).collect();
    if values.iter().any(|v| matches!(v, ConditionValue::Any)) {
        return ConditionValue::Any;
    }

    let mut bounds: Option<(f32, f32)> = None;
    let mut all_numeric = true;
    for value in &values {
        let (lo, hi) = match value {
            ConditionValue::Range { min, max } => (*min, *max),
            ConditionValue::Exact(Value::Number(n)) => (*n, *n),
            _ => {
                all_numeric = false;
                break;
            }
        };
        bounds = Some(bounds.map_or((lo, hi), |(a, b)| (a.min(lo), b.max(hi))));
    }
    if all_numeric {
        if let Some((min, max)) = bounds {
            return ConditionValue::Range { min, max };
        }
    }

    let exact: Vec<&Value> = values
        .iter()
        .filter_map(|v| match v {
            ConditionValue::Exact(value) => Some(value),
            _ => None,
        })
        .collect();
    if exact.len() != values.len() {
        return ConditionValue::Any;
    }
    if exact.iter().all(|v| v.as_bool().is_some()) {
        let trues = exact.iter().filter(|v| v.as_bool() == Some(true)).count();
        return ConditionValue::Exact(Value::Bool(trues * 2 >= exact.len()));
    }
    match exact.first() {
        Some(first) if exact.iter().all(|v| v.loosely_equals(first)) => ConditionValue::Exact((*first).clone()),
        _ => ConditionValue::Any,
    }
}

/// Properties present in at least `ratio` of the entries, as `Any` conditions.
#[must_use]
pub fn universal_conditions(entries: &[&KnowledgeEntry], ratio: f32) -> Vec<Condition> {
    let mut seen: BTreeMap<&str, (usize, Operator)> = BTreeMap::new();
    for entry in entries {
        let properties: BTreeSet<&str> = entry.pattern.conditions.iter().map(|c| c.property.as_str()).collect();
        for property in properties {
            let operator = entry
                .pattern
                .conditions
                .iter()
                .find(|c| c.property == property)
                .map_or(Operator::Equals, |c| c.operator);
            seen.entry(property).or_insert((0, operator)).0 += 1;
        }
    }
    let needed = ratio * entries.len() as f32;
    seen.into_iter()
        .filter(|(_, (count, _))| *count as f32 >= needed)
        .map(|(property, (_, operator))| Condition::new(property, operator, ConditionValue::Any))
        .collect()
}

/// Aggregate outcome fields: numbers → mean, booleans → majority, text → mode.
#[must_use]
pub fn aggregate_outcome(entries: &[&KnowledgeEntry]) -> BTreeMap<String, Value> {
    let mut columns: BTreeMap<&str, Vec<&Value>> = BTreeMap::new();
    for entry in entries {
        for (key, value) in &entry.pattern.outcome {
            columns.entry(key.as_str()).or_default().push(value);
        }
    }

    columns
        .into_iter()
        .filter_map(|(key, values)| aggregate_column(&values).map(|v| (key.to_string(), v)))
        .collect()
}

fn aggregate_column(values: &[&Value]) -> Option<Value> {
    let numbers: Vec<f32> = values.iter().filter_map(|v| v.as_number()).collect();
    if !numbers.is_empty() && numbers.len() == values.len() {
        return Some(Value::Number(numbers.iter().sum::<f32>() / numbers.len() as f32));
    }
    let bools: Vec<bool> = values.iter().filter_map(|v| v.as_bool()).collect();
    if !bools.is_empty() && bools.len() == values.len() {
        let trues = bools.iter().filter(|b| **b).count();
        return Some(Value::Bool(trues * 2 >= bools.len()));
    }
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value.to_string()).or_default() += 1;
    }
    let mut best: Option<(String, usize)> = None;
    for (text, count) in counts {
        if best.as_ref().is_none_or(|(_, c)| count > *c) {
            best = Some((text, count));
        }
    }
    best.map(|(text, _)| Value::Text(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn low(x: f32, conf: f32, env: u32, approach: &str) -> KnowledgeEntry {
        let mut outcome = BTreeMap::new();
        outcome.insert("target_x".to_string(), Value::Number(x));
        outcome.insert("approach".to_string(), Value::from(approach));
        let pattern = KnowledgePattern {
            kind: KnowledgeType::ResourceLocation,
            conditions: vec![Condition::near("x", x, 15.0), Condition::near("y", 10.0, 15.0)],
            outcome,
        };
        KnowledgeEntry::new(pattern, KnowledgeLevel::Low, conf, EnvironmentId(env), 0)
    }

    #[test]
    fn low_to_mid_needs_five_entries_and_three_confident() {
        let config = KnowledgeConfig::default();
        let four: Vec<KnowledgeEntry> = (0..4).map(|i| low(i as f32, 0.9, 1, "approach")).collect();
        assert!(promote_low_to_mid(&four, &config, 50).is_empty());

        let mut five: Vec<KnowledgeEntry> = (0..2).map(|i| low(i as f32, 0.9, 1, "approach")).collect();
        five.extend((0..3).map(|i| low(i as f32, 0.3, 1, "approach")));
        assert!(promote_low_to_mid(&five, &config, 50).is_empty(), "only two confident");

        five[2].confidence = 0.6;
        let promoted = promote_low_to_mid(&five, &config, 50);
        assert_eq!(promoted.len(), 1);
        assert_eq!(promoted[0].sources, 3);
        assert_eq!(promoted[0].entry.level, KnowledgeLevel::Mid);
        assert_eq!(promoted[0].entry.instances.len(), 3);
    }

    #[test]
    fn common_conditions_become_ranges() {
        let entries = [low(10.0, 0.9, 1, "approach"), low(20.0, 0.9, 1, "approach"), low(14.0, 0.9, 1, "avoid")];
        let refs: Vec<&KnowledgeEntry> = entries.iter().collect();
        let conditions = common_conditions(&refs);
        let x = conditions.iter().find(|c| c.property == "x").expect("x condition");
        assert_eq!(x.value, ConditionValue::Range { min: 10.0, max: 20.0 });
        assert!(matches!(x.operator, Operator::Near { .. }));

        let outcome = aggregate_outcome(&refs);
        assert_eq!(outcome.get("target_x"), Some(&Value::Number(44.0 / 3.0)));
        assert_eq!(outcome.get("approach"), Some(&Value::from("approach")));
    }

    #[test]
    fn mixed_text_values_become_any_and_bools_take_majority() {
        let mut a = low(1.0, 0.9, 1, "x");
        let mut b = low(2.0, 0.9, 1, "x");
        let mut c = low(3.0, 0.9, 1, "x");
        a.pattern.conditions.push(Condition::equals("zone", "north"));
        b.pattern.conditions.push(Condition::equals("zone", "south"));
        c.pattern.conditions.push(Condition::equals("zone", "north"));
        a.pattern.conditions.push(Condition::equals("lit", true));
        b.pattern.conditions.push(Condition::equals("lit", true));
        c.pattern.conditions.push(Condition::equals("lit", false));
        let conditions = common_conditions(&[&a, &b, &c]);
        let zone = conditions.iter().find(|c| c.property == "zone").expect("zone");
        assert_eq!(zone.value, ConditionValue::Any);
        let lit = conditions.iter().find(|c| c.property == "lit").expect("lit");
        assert_eq!(lit.value, ConditionValue::Exact(Value::Bool(true)));
    }

    #[test]
    fn single_mid_entry_promotes_once_it_spans_two_environments() {
        let config = KnowledgeConfig::default();
        let known: BTreeSet<EnvironmentId> = [1, 2, 3].into_iter().map(EnvironmentId).collect();
        let mut mid = low(10.0, 0.8, 1, "approach");
        mid.level = KnowledgeLevel::Mid;
        assert!(promote_mid_to_high(std::slice::from_ref(&mid), &known, &config, 100).is_empty());

        mid.environment_ids.insert(EnvironmentId(2));
        let promoted = promote_mid_to_high(std::slice::from_ref(&mid), &known, &config, 100);
        assert_eq!(promoted.len(), 1);
        let high = &promoted[0].entry;
        assert!(high.universal_principle);
        assert_eq!(high.environment_ids, known);
        assert!(high.pattern.conditions.iter().all(|c| c.value == ConditionValue::Any));
    }

    #[test]
    fn universal_conditions_need_seventy_percent() {
        let mut entries: Vec<KnowledgeEntry> = (0..10).map(|i| low(i as f32, 0.9, 1, "a")).collect();
        for e in entries.iter_mut().take(7) {
            e.pattern.conditions.push(Condition::equals("flux_effect", 1.0));
        }
        let refs: Vec<&KnowledgeEntry> = entries.iter().collect();
        let props: Vec<String> = universal_conditions(&refs, 0.7).into_iter().map(|c| c.property).collect();
        assert!(props.contains(&"flux_effect".to_string()));

        entries[6].pattern.conditions.pop();
        let refs: Vec<&KnowledgeEntry> = entries.iter().collect();
        let props: Vec<String> = universal_conditions(&refs, 0.7).into_iter().map(|c| c.property).collect();
        assert!(!props.contains(&"flux_effect".to_string()));
    }
}
