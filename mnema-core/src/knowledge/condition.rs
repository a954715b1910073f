//! Knowledge conditions and context matching.
//!
//! A condition tests one context property with a closed set of operators. A
//! property missing from the context never matches; it is not an error.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Properties an agent exposes to knowledge matching (position, flux state...).
pub type Context = BTreeMap<String, Value>;

/// Comparison applied by a condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operator {
    /// Values are equal (numbers within `f32::EPSILON`; ranges contain the value).
    Equals,
    /// Negation of [`Operator::Equals`].
    NotEquals,
    /// Context number is above the condition value (or range minimum).
    GreaterThan,
    /// Context number is below the condition value (or range maximum).
    LessThan,
    /// Context text contains the condition text.
    Contains,
    /// Context number is within `threshold` of the value (or range).
    Near {
        /// Allowed distance.
        threshold: f32,
    },
}

impl Operator {
    /// Same operator kind, ignoring `Near` thresholds.
    #[must_use]
    pub fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Short name, e.g. `near`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Contains => "contains",
            Self::Near { .. } => "near",
        }
    }
}

/// What a condition compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionValue {
    /// A single value.
    Exact(Value),
    /// A numeric interval produced by generalization.
    Range {
        /// Inclusive lower bound.
        min: f32,
        /// Inclusive upper bound.
        max: f32,
    },
    /// Environment-agnostic: matches whenever the property is present.
    Any,
}

/// One test on a context property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Context key.
    pub property: String,
    /// Comparison.
    pub operator: Operator,
    /// Comparand.
    pub value: ConditionValue,
}

impl Condition {
    /// Create a condition.
    #[must_use]
    pub fn new(property: impl Into<String>, operator: Operator, value: ConditionValue) -> Self {
        Self {
            property: property.into(),
            operator,
            value,
        }
    }

    /// `property` within `threshold` of `value`.
    #[must_use]
    pub fn near(property: impl Into<String>, value: f32, threshold: f32) -> Self {
        Self::new(property, Operator::Near { threshold }, ConditionValue::Exact(Value::Number(value)))
    }

    /// `property` equals `value`.
    #[must_use]
    pub fn equals(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, Operator::Equals, ConditionValue::Exact(value.into()))
    }

    /// Whether `context` satisfies this condition.
    #[must_use]
    pub fn matches(&self, context: &Context) -> bool {
        let Some(actual) = context.get(&self.property) else {
            return false;
        };
        match &self.value {
            ConditionValue::Any => true,
            ConditionValue::Exact(expected) => match_exact(self.operator, actual, expected),
            ConditionValue::Range { min, max } => match_range(self.operator, actual, *min, *max),
        }
    }
}

fn match_exact(operator: Operator, actual: &Value, expected: &Value) -> bool {
    match operator {
        Operator::Equals => actual.loosely_equals(expected),
        Operator::NotEquals => !actual.loosely_equals(expected),
        Operator::GreaterThan => numbers(actual, expected).is_some_and(|(a, e)| a > e),
        Operator::LessThan => numbers(actual, expected).is_some_and(|(a, e)| a < e),
        Operator::Contains => match (actual, expected) {
            (Value::Text(a), Value::Text(e)) => a.contains(e.as_str()),
            _ => false,
        },
        Operator::Near { threshold } => {
            numbers(actual, expected).is_some_and(|(a, e)| (a - e).abs() <= threshold)
        }
    }
}

fn match_range(operator: Operator, actual: &Value, min: f32, max: f32) -> bool {
    let Some(a) = actual.as_number() else {
        return false;
    };
    match operator {
        Operator::Equals => (min..=max).contains(&a),
        Operator::NotEquals => !(min..=max).contains(&a),
        Operator::GreaterThan => a > min,
        Operator::LessThan => a < max,
        Operator::Contains => false,
        Operator::Near { threshold } => a >= min - threshold && a <= max + threshold,
    }
}

fn numbers(a: &Value, b: &Value) -> Option<(f32, f32)> {
    Some((a.as_number()?, b.as_number()?))
}

/// Fraction of `conditions` satisfied by `context`. No conditions → 1.0.
#[must_use]
pub fn satisfied_fraction(conditions: &[Condition], context: &Context) -> f32 {
    if conditions.is_empty() {
        return 1.0;
    }
    let satisfied = conditions.iter().filter(|c| c.matches(context)).count();
    satisfied as f32 / conditions.len() as f32
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            ConditionValue::Exact(v) => write!(f, "{} {} {v}", self.property, self.operator.as_str()),
            ConditionValue::Range { min, max } => {
                write!(f, "{} {} [{min:.1}, {max:.1}]", self.property, self.operator.as_str())
            }
            ConditionValue::Any => write!(f, "{} (any)", self.property),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, Value)]) -> Context {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn missing_property_is_a_non_match() {
        let c = Condition::equals("flux_effect", 1.0);
        assert!(!c.matches(&Context::new()));
        let any = Condition::new("flux_effect", Operator::Equals, ConditionValue::Any);
        assert!(!any.matches(&Context::new()));
    }

    #[test]
    fn near_uses_threshold() {
        let c = Condition::near("x", 10.0, 15.0);
        assert!(c.matches(&ctx(&[("x", Value::Number(24.0))])));
        assert!(!c.matches(&ctx(&[("x", Value::Number(26.0))])));
    }

    #[test]
    fn range_near_extends_bounds() {
        let c = Condition::new("x", Operator::Near { threshold: 5.0 }, ConditionValue::Range { min: 10.0, max: 20.0 });
        assert!(c.matches(&ctx(&[("x", Value::Number(6.0))])));
        assert!(c.matches(&ctx(&[("x", Value::Number(25.0))])));
        assert!(!c.matches(&ctx(&[("x", Value::Number(26.0))])));
    }

    #[test]
    fn every_operator_on_exact_values() {
        let c = ctx(&[("hp", Value::Number(5.0)), ("name", Value::from("teleport-zone"))]);
        assert!(Condition::new("hp", Operator::GreaterThan, ConditionValue::Exact(Value::Number(4.0))).matches(&c));
        assert!(Condition::new("hp", Operator::LessThan, ConditionValue::Exact(Value::Number(6.0))).matches(&c));
        assert!(Condition::new("hp", Operator::NotEquals, ConditionValue::Exact(Value::Number(6.0))).matches(&c));
        assert!(Condition::new("name", Operator::Contains, ConditionValue::Exact(Value::from("teleport"))).matches(&c));
        assert!(!Condition::new("name", Operator::GreaterThan, ConditionValue::Exact(Value::Number(1.0))).matches(&c));
    }

    #[test]
    fn fraction_counts_satisfied_conditions() {
        let conditions = vec![Condition::near("x", 0.0, 1.0), Condition::near("y", 0.0, 1.0)];
        let c = ctx(&[("x", Value::Number(0.5)), ("y", Value::Number(9.0))]);
        assert!((satisfied_fraction(&conditions, &c) - 0.5).abs() < f32::EPSILON);
        assert!((satisfied_fraction(&[], &c) - 1.0).abs() < f32::EPSILON);
    }
}
