//! Label requirement algebra.
//!
//! A [`Requirement`] constrains the values one node label may take. A
//! [`Requirements`] set is the conjunction of requirements on distinct keys.
//!
//! Every requirement is kept in a normalized form: a value set that is either
//! an allow-list or a deny-list, an optional exclusive integer range, and a
//! flag saying whether the label may be absent altogether. The six operators
//! map onto that form:
//!
//! ```text
//! Exists        deny {}        absent: no
//! DoesNotExist  allow {}       absent: yes
//! In v          allow v        absent: no
//! NotIn v       deny v         absent: yes
//! Gt n          deny {}, > n   absent: no
//! Lt n          deny {}, < n   absent: no
//! ```
//!
//! Intersection works component-wise, which keeps it commutative. A result
//! that admits no value (and does not admit absence) is never returned as a
//! set; it surfaces as [`RequirementError::Incompatible`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RequirementError;

/// Node-selector operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Exists,
    DoesNotExist,
    In,
    NotIn,
    Gt,
    Lt,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Exists => "Exists",
            Operator::DoesNotExist => "DoesNotExist",
            Operator::In => "In",
            Operator::NotIn => "NotIn",
            Operator::Gt => "Gt",
            Operator::Lt => "Lt",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = RequirementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Exists" => Ok(Operator::Exists),
            "DoesNotExist" => Ok(Operator::DoesNotExist),
            "In" => Ok(Operator::In),
            "NotIn" => Ok(Operator::NotIn),
            "Gt" => Ok(Operator::Gt),
            "Lt" => Ok(Operator::Lt),
            other => Err(RequirementError::UnknownOperator(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ValueSet {
    Allow(BTreeSet<String>),
    Deny(BTreeSet<String>),
}

/// The allowed values of a single label key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    values: ValueSet,
    absent_ok: bool,
    greater_than: Option<i64>,
    less_than: Option<i64>,
}

impl Requirement {
    /// Build a requirement from an operator and its raw values.
    pub fn new<I, S>(key: impl Into<String>, operator: Operator, values: I) -> Result<Self, RequirementError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();

        match operator {
            Operator::Exists | Operator::DoesNotExist if !values.is_empty() => {
                Err(RequirementError::UnexpectedValues { key, operator })
            }
            Operator::Exists => Ok(Self::exists(key)),
            Operator::DoesNotExist => Ok(Self::does_not_exist(key)),
            Operator::In => Self::in_values(key, values),
            Operator::NotIn => Ok(Self::not_in(key, values)),
            Operator::Gt | Operator::Lt => {
                if values.len() != 1 {
                    return Err(RequirementError::BoundArity {
                        key,
                        operator,
                        count: values.len(),
                    });
                }
                let raw = values.into_iter().next().unwrap_or_default();
                let bound: i64 = raw.trim().parse().map_err(|_| RequirementError::InvalidBound {
                    key: key.clone(),
                    value: raw.clone(),
                })?;
                Ok(if operator == Operator::Gt {
                    Self::gt(key, bound)
                } else {
                    Self::lt(key, bound)
                })
            }
        }
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: ValueSet::Deny(BTreeSet::new()),
            absent_ok: false,
            greater_than: None,
            less_than: None,
        }
    }

    pub fn does_not_exist(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: ValueSet::Allow(BTreeSet::new()),
            absent_ok: true,
            greater_than: None,
            less_than: None,
        }
    }

    /// `key In values`. An empty value list is rejected rather than silently
    /// meaning "matches nothing".
    pub fn in_values<I, S>(key: impl Into<String>, values: I) -> Result<Self, RequirementError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(RequirementError::EmptyValues { key });
        }
        Ok(Self {
            key,
            values: ValueSet::Allow(values),
            absent_ok: false,
            greater_than: None,
            less_than: None,
        })
    }

    /// `key In [value]`.
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: ValueSet::Allow(BTreeSet::from([value.into()])),
            absent_ok: false,
            greater_than: None,
            less_than: None,
        }
    }

    pub fn not_in<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            values: ValueSet::Deny(values.into_iter().map(Into::into).collect()),
            absent_ok: true,
            greater_than: None,
            less_than: None,
        }
    }

    pub fn gt(key: impl Into<String>, bound: i64) -> Self {
        Self {
            greater_than: Some(bound),
            ..Self::exists(key)
        }
    }

    pub fn lt(key: impl Into<String>, bound: i64) -> Self {
        Self {
            less_than: Some(bound),
            ..Self::exists(key)
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether a node carrying `key=value` satisfies this requirement.
    pub fn has(&self, value: &str) -> bool {
        let listed = match &self.values {
            ValueSet::Allow(allowed) => allowed.contains(value),
            ValueSet::Deny(denied) => !denied.contains(value),
        };
        listed && self.within_bounds(value)
    }

    /// Whether a node without this label satisfies this requirement.
    pub fn allows_absent(&self) -> bool {
        self.absent_ok
    }

    /// The explicitly allowed values, when the requirement is an allow-list.
    pub fn values(&self) -> Option<impl Iterator<Item = &str>> {
        match &self.values {
            ValueSet::Allow(allowed) => Some(allowed.iter().map(String::as_str)),
            ValueSet::Deny(_) => None,
        }
    }

    /// Any one allowed value, the smallest first.
    pub fn any(&self) -> Option<&str> {
        self.values()?.next()
    }

    fn has_bounds(&self) -> bool {
        self.greater_than.is_some() || self.less_than.is_some()
    }

    fn within_bounds(&self, value: &str) -> bool {
        if !self.has_bounds() {
            return true;
        }
        match value.parse::<i64>() {
            Ok(n) => self.greater_than.is_none_or(|gt| n > gt) && self.less_than.is_none_or(|lt| n < lt),
            Err(_) => false,
        }
    }

    /// True when some label value, or the absence of the label, satisfies
    /// this requirement.
    fn is_satisfiable(&self) -> bool {
        if self.absent_ok {
            return true;
        }
        match &self.values {
            ValueSet::Allow(allowed) => !allowed.is_empty(),
            ValueSet::Deny(denied) => match (self.greater_than, self.less_than) {
                (Some(gt), Some(lt)) => {
                    let width = i128::from(lt) - i128::from(gt) - 1;
                    if width <= 0 {
                        return false;
                    }
                    let excluded: BTreeSet<i64> = denied
                        .iter()
                        .filter_map(|v| v.parse::<i64>().ok())
                        .filter(|n| *n > gt && *n < lt)
                        .collect();
                    width > excluded.len() as i128
                }
                (Some(gt), None) => gt < i64::MAX,
                (None, Some(lt)) => lt > i64::MIN,
                (None, None) => true,
            },
        }
    }

    /// Conjunction of two requirements on the same key.
    pub fn intersect(&self, other: &Requirement) -> Result<Requirement, RequirementError> {
        debug_assert_eq!(self.key, other.key);

        let values = match (&self.values, &other.values) {
            (ValueSet::Allow(a), ValueSet::Allow(b)) => ValueSet::Allow(a.intersection(b).cloned().collect()),
            (ValueSet::Allow(a), ValueSet::Deny(d)) | (ValueSet::Deny(d), ValueSet::Allow(a)) => {
                ValueSet::Allow(a.difference(d).cloned().collect())
            }
            (ValueSet::Deny(a), ValueSet::Deny(b)) => ValueSet::Deny(a.union(b).cloned().collect()),
        };
        let greater_than = match (self.greater_than, other.greater_than) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let less_than = match (self.less_than, other.less_than) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let mut combined = Requirement {
            key: self.key.clone(),
            values,
            absent_ok: self.absent_ok && other.absent_ok,
            greater_than,
            less_than,
        };
        if combined.has_bounds() {
            if let ValueSet::Allow(allowed) = &combined.values {
                let kept = allowed.iter().filter(|v| combined.within_bounds(v)).cloned().collect();
                combined.values = ValueSet::Allow(kept);
            }
        }

        if combined.is_satisfiable() {
            Ok(combined)
        } else {
            Err(RequirementError::Incompatible {
                key: self.key.clone(),
                detail: format!("{self} and {other} have no value in common"),
            })
        }
    }
}

fn write_values(f: &mut fmt::Formatter<'_>, values: &BTreeSet<String>) -> fmt::Result {
    f.write_str("[")?;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        f.write_str(v)?;
    }
    f.write_str("]")
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        match (&self.values, self.absent_ok) {
            (ValueSet::Allow(v), true) if v.is_empty() => f.write_str(" DoesNotExist")?,
            (ValueSet::Allow(v), _) => {
                f.write_str(" In ")?;
                write_values(f, v)?;
            }
            (ValueSet::Deny(v), true) => {
                f.write_str(" NotIn ")?;
                write_values(f, v)?;
            }
            (ValueSet::Deny(v), false) => {
                if !self.has_bounds() {
                    f.write_str(" Exists")?;
                }
                if !v.is_empty() {
                    f.write_str(" NotIn ")?;
                    write_values(f, v)?;
                }
            }
        }
        if let Some(gt) = self.greater_than {
            write!(f, " Gt {gt}")?;
        }
        if let Some(lt) = self.less_than {
            write!(f, " Lt {lt}")?;
        }
        Ok(())
    }
}

/// A conjunction of requirements, one per key, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements(BTreeMap<String, Requirement>);

impl Requirements {
    /// Collect requirements into a set; repeated keys are intersected.
    pub fn new(requirements: impl IntoIterator<Item = Requirement>) -> Result<Self, RequirementError> {
        Requirements::default().add(requirements)
    }

    /// A tightened copy with `requirements` merged in.
    pub fn add(&self, requirements: impl IntoIterator<Item = Requirement>) -> Result<Self, RequirementError> {
        let mut out = self.clone();
        for requirement in requirements {
            let merged = match out.0.get(&requirement.key) {
                Some(existing) => existing.intersect(&requirement)?,
                None if !requirement.is_satisfiable() => {
                    return Err(RequirementError::Incompatible {
                        key: requirement.key.clone(),
                        detail: format!("{requirement} admits no value"),
                    });
                }
                None => requirement,
            };
            out.0.insert(merged.key.clone(), merged);
        }
        Ok(out)
    }

    /// A tightened copy: the per-key conjunction of `self` and `other`.
    pub fn tighten(&self, other: &Requirements) -> Result<Self, RequirementError> {
        self.add(other.0.values().cloned())
    }

    /// Succeeds when every key present on both sides still has an allowed
    /// value. Keys are checked in order, so the reported conflict is the
    /// lexicographically first one.
    pub fn compatible(&self, other: &Requirements) -> Result<(), RequirementError> {
        for (key, requirement) in &self.0 {
            if let Some(theirs) = other.0.get(key) {
                requirement.intersect(theirs)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Requirement> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Requirement> for Requirements {
    fn from(requirement: Requirement) -> Self {
        Requirements(BTreeMap::from([(requirement.key.clone(), requirement)]))
    }
}

impl fmt::Display for Requirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, requirement) in self.0.values().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{requirement}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONE: &str = "topology.kubernetes.io/zone";

    fn zone_in(values: &[&str]) -> Requirement {
        Requirement::in_values(ZONE, values.iter().copied()).unwrap()
    }

    fn set(reqs: Vec<Requirement>) -> Requirements {
        Requirements::new(reqs).unwrap()
    }

    #[test]
    fn in_intersects_values() {
        let merged = zone_in(&["a", "b"]).intersect(&zone_in(&["b", "c"])).unwrap();
        assert!(merged.has("b"));
        assert!(!merged.has("a"));
        assert!(!merged.has("c"));
        assert_eq!(merged.any(), Some("b"));
    }

    #[test]
    fn disjoint_in_is_incompatible() {
        let err = zone_in(&["a"]).intersect(&zone_in(&["b"])).unwrap_err();
        assert!(matches!(err, RequirementError::Incompatible { ref key, .. } if key == ZONE));
    }

    #[test]
    fn empty_in_is_rejected_at_construction() {
        let err = Requirement::new(ZONE, Operator::In, Vec::<String>::new()).unwrap_err();
        assert_eq!(err, RequirementError::EmptyValues { key: ZONE.to_string() });
    }

    #[test]
    fn not_in_removes_values() {
        let merged = zone_in(&["a", "b"]).intersect(&Requirement::not_in(ZONE, ["a"])).unwrap();
        assert!(merged.has("b"));
        assert!(!merged.has("a"));

        let err = zone_in(&["a"]).intersect(&Requirement::not_in(ZONE, ["a"]));
        assert!(err.is_err());
    }

    #[test]
    fn does_not_exist_semantics() {
        let absent = Requirement::does_not_exist("gpu");
        assert!(absent.intersect(&Requirement::does_not_exist("gpu")).is_ok());
        assert!(absent.intersect(&Requirement::not_in("gpu", ["a100"])).unwrap().allows_absent());
        assert!(absent.intersect(&Requirement::exists("gpu")).is_err());
        assert!(absent.intersect(&Requirement::in_values("gpu", ["a100"]).unwrap()).is_err());
        assert!(absent.intersect(&Requirement::gt("gpu", 0)).is_err());
    }

    #[test]
    fn exists_accepts_any_value_but_not_absence() {
        let exists = Requirement::exists("team");
        assert!(exists.has("anything"));
        assert!(!exists.allows_absent());
        assert!(exists.intersect(&Requirement::in_values("team", ["a"]).unwrap()).is_ok());
    }

    #[test]
    fn gt_lt_narrow_to_range() {
        let cpus = "node.kubernetes.io/cpu";
        let range = Requirement::gt(cpus, 2).intersect(&Requirement::lt(cpus, 8)).unwrap();
        assert!(range.has("4"));
        assert!(!range.has("2"));
        assert!(!range.has("8"));
        assert!(!range.has("many"));

        assert!(Requirement::gt(cpus, 4).intersect(&Requirement::lt(cpus, 5)).is_err());
        assert!(Requirement::gt(cpus, 4).intersect(&Requirement::lt(cpus, 6)).is_ok());
    }

    #[test]
    fn bounds_filter_in_values() {
        let cpus = "node.kubernetes.io/cpu";
        let sizes = Requirement::in_values(cpus, ["2", "4", "16", "huge"]).unwrap();
        let merged = sizes.intersect(&Requirement::gt(cpus, 3)).unwrap();
        assert!(merged.has("4"));
        assert!(merged.has("16"));
        assert!(!merged.has("2"));
        assert!(!merged.has("huge"));

        assert!(sizes.intersect(&Requirement::gt(cpus, 16)).is_err());
    }

    #[test]
    fn denied_values_can_exhaust_a_range() {
        let key = "rank";
        let range = Requirement::gt(key, 0).intersect(&Requirement::lt(key, 3)).unwrap();
        assert!(range.intersect(&Requirement::not_in(key, ["1"])).is_ok());
        let exhausted = range
            .intersect(&Requirement::not_in(key, ["1"]))
            .and_then(|r| r.intersect(&Requirement::not_in(key, ["2"])));
        assert!(exhausted.is_err());
    }

    #[test]
    fn operator_parsing_and_arity() {
        assert_eq!("NotIn".parse::<Operator>().unwrap(), Operator::NotIn);
        assert!("Near".parse::<Operator>().is_err());
        assert!(Requirement::new("k", Operator::Gt, ["1", "2"]).is_err());
        assert!(Requirement::new("k", Operator::Lt, ["x"]).is_err());
        assert!(Requirement::new("k", Operator::Exists, ["x"]).is_err());
        assert_eq!(Requirement::new("k", Operator::Gt, ["3"]).unwrap(), Requirement::gt("k", 3));
    }

    #[test]
    fn add_returns_tightened_copy() {
        let base = set(vec![zone_in(&["a", "b"])]);
        let tightened = base.add([zone_in(&["a"]), Requirement::exists("team")]).unwrap();

        assert!(base.get(ZONE).unwrap().has("b"));
        assert!(!tightened.get(ZONE).unwrap().has("b"));
        assert_eq!(tightened.keys().collect::<Vec<_>>(), vec!["team", ZONE]);
    }

    #[test]
    fn bounds_past_the_integer_range_are_unsatisfiable() {
        for requirement in [Requirement::gt("rank", i64::MAX), Requirement::lt("rank", i64::MIN)] {
            let result = Requirements::new([requirement]);
            assert!(matches!(result, Err(RequirementError::Incompatible { ref key, .. }) if key == "rank"));
        }
        assert!(Requirements::new([Requirement::gt("rank", i64::MAX - 1)]).is_ok());
        assert!(Requirements::new([Requirement::lt("rank", i64::MIN + 1)]).is_ok());

        let existing = set(vec![Requirement::exists("rank")]);
        assert!(existing.add([Requirement::gt("rank", i64::MAX)]).is_err());
    }

    #[test]
    fn keys_on_one_side_pass_through() {
        let a = set(vec![zone_in(&["a"])]);
        let b = set(vec![Requirement::in_values("arch", ["amd64"]).unwrap()]);
        let merged = a.tighten(&b).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(a.compatible(&b).is_ok());
    }

    #[test]
    fn compatibility_is_commutative() {
        let candidates = vec![
            set(vec![]),
            set(vec![zone_in(&["a"])]),
            set(vec![zone_in(&["b"]), Requirement::exists("team")]),
            set(vec![Requirement::does_not_exist("team")]),
            set(vec![Requirement::not_in(ZONE, ["a"]), Requirement::gt("rank", 5)]),
            set(vec![Requirement::lt("rank", 6)]),
            set(vec![Requirement::in_values("rank", ["5", "7"]).unwrap()]),
        ];
        for a in &candidates {
            for b in &candidates {
                assert_eq!(
                    a.compatible(b).is_ok(),
                    b.compatible(a).is_ok(),
                    "compatibility of {a} and {b} is not symmetric"
                );
            }
        }
    }

    #[test]
    fn compatible_reports_first_conflicting_key() {
        let a = set(vec![
            Requirement::in_values("b-key", ["x"]).unwrap(),
            Requirement::in_values("a-key", ["x"]).unwrap(),
        ]);
        let b = set(vec![
            Requirement::in_values("b-key", ["y"]).unwrap(),
            Requirement::in_values("a-key", ["y"]).unwrap(),
        ]);
        match a.compatible(&b).unwrap_err() {
            RequirementError::Incompatible { key, .. } => assert_eq!(key, "a-key"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn display_renders_operators() {
        assert_eq!(zone_in(&["b", "a"]).to_string(), format!("{ZONE} In [a, b]"));
        assert_eq!(Requirement::does_not_exist("gpu").to_string(), "gpu DoesNotExist");
        assert_eq!(Requirement::not_in("gpu", ["x"]).to_string(), "gpu NotIn [x]");
        assert_eq!(Requirement::exists("gpu").to_string(), "gpu Exists");
        assert_eq!(Requirement::gt("cpu", 2).to_string(), "cpu Gt 2");
    }
}
