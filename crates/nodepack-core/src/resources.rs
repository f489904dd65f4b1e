//! Resource quantities and resource lists.
//!
//! Quantities follow the Kubernetes notation (`500m`, `2`, `4Gi`, `1.5G`,
//! `1e3`) and
//! are stored as whole milli-units so that CPU fractions and byte counts share
//! one integer representation. A [`ResourceList`] maps resource names to
//! quantities and iterates in name order.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QuantityParseError;

/// CPU, in cores.
pub const CPU: &str = "cpu";
/// Memory, in bytes.
pub const MEMORY: &str = "memory";
/// Maximum number of pods a node can run.
pub const PODS: &str = "pods";

const MILLI: u128 = 1_000;

/// Binary suffixes used when rendering; smaller ones are left as plain numbers.
const RENDER_SUFFIXES: [(&str, u64); 5] = [
    ("Ei", 1 << 60),
    ("Pi", 1 << 50),
    ("Ti", 1 << 40),
    ("Gi", 1 << 30),
    ("Mi", 1 << 20),
];

/// A non-negative resource amount, stored in milli-units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "QuantityRepr", into = "String")]
pub struct Quantity(u64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    /// A quantity of whole units (cores, bytes, pods).
    pub const fn from_units(units: u64) -> Self {
        Quantity(units.saturating_mul(1_000))
    }

    pub const fn from_millis(millis: u64) -> Self {
        Quantity(millis)
    }

    pub const fn millis(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        *self = *self + rhs;
    }
}

/// Milli-units per unit of `suffix`. Besides the SI and binary suffixes this
/// accepts a decimal exponent (`e3`, `E-1`) down to milli precision.
fn suffix_multiplier(suffix: &str) -> Option<u128> {
    if let Some(exponent) = suffix
        .strip_prefix(['e', 'E'])
        .and_then(|rest| rest.parse::<i32>().ok())
    {
        let shift = u32::try_from(exponent + 3).ok()?;
        return (shift <= 21).then(|| 10u128.pow(shift));
    }

    let multiplier = match suffix {
        "m" => 1,
        "" => MILLI,
        "k" => MILLI * 1_000,
        "M" => MILLI * 1_000_000,
        "G" => MILLI * 1_000_000_000,
        "T" => MILLI * 1_000_000_000_000,
        "P" => MILLI * 1_000_000_000_000_000,
        "E" => MILLI * 1_000_000_000_000_000_000,
        "Ki" => MILLI << 10,
        "Mi" => MILLI << 20,
        "Gi" => MILLI << 30,
        "Ti" => MILLI << 40,
        "Pi" => MILLI << 50,
        "Ei" => MILLI << 60,
        _ => return None,
    };
    Some(multiplier)
}

impl FromStr for Quantity {
    type Err = QuantityParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(QuantityParseError::new(raw, "empty quantity"));
        }

        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(split);
        let multiplier = suffix_multiplier(suffix)
            .ok_or_else(|| QuantityParseError::new(raw, "unknown suffix"))?;

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(QuantityParseError::new(raw, "missing numeric value"));
        }
        if fraction.contains('.') {
            return Err(QuantityParseError::new(raw, "more than one decimal point"));
        }
        if fraction.len() > 18 {
            return Err(QuantityParseError::new(raw, "too many fractional digits"));
        }

        let overflow = || QuantityParseError::new(raw, "value out of range");
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| QuantityParseError::new(raw, "invalid number"))?
        };
        let mut millis = whole.checked_mul(multiplier).ok_or_else(overflow)?;

        if !fraction.is_empty() {
            let digits: u128 = fraction
                .parse()
                .map_err(|_| QuantityParseError::new(raw, "invalid fraction"))?;
            let scale = 10u128.pow(fraction.len() as u32);
            // Sub-milli remainders round up, as the API server does.
            let scaled = digits.checked_mul(multiplier).ok_or_else(overflow)?;
            millis = millis
                .checked_add(scaled.div_ceil(scale))
                .ok_or_else(overflow)?;
        }

        u64::try_from(millis).map(Quantity).map_err(|_| overflow())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 1_000 != 0 {
            return write!(f, "{}m", self.0);
        }
        let units = self.0 / 1_000;
        for (suffix, factor) in RENDER_SUFFIXES {
            if units >= factor && units % factor == 0 {
                return write!(f, "{}{suffix}", units / factor);
            }
        }
        write!(f, "{units}")
    }
}

impl From<Quantity> for String {
    fn from(q: Quantity) -> String {
        q.to_string()
    }
}

/// Accepted serialized forms: `"500m"`, `2`, `0.5`.
#[derive(Deserialize)]
#[serde(untagged)]
enum QuantityRepr {
    Text(String),
    Integer(u64),
    Float(f64),
}

impl TryFrom<QuantityRepr> for Quantity {
    type Error = QuantityParseError;

    fn try_from(repr: QuantityRepr) -> Result<Self, Self::Error> {
        match repr {
            QuantityRepr::Text(s) => s.parse(),
            QuantityRepr::Integer(n) => Ok(Quantity::from_units(n)),
            QuantityRepr::Float(x) => x.to_string().parse(),
        }
    }
}

/// Resource name → quantity, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceList(BTreeMap<String, Quantity>);

impl ResourceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `(name, quantity)` pairs.
    pub fn parse<I, K, V>(pairs: I) -> Result<Self, QuantityParseError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        pairs
            .into_iter()
            .map(|(name, raw)| Ok((name.into(), raw.as_ref().parse()?)))
            .collect()
    }

    /// Quantity for `name`; missing entries read as zero.
    pub fn get(&self, name: &str) -> Quantity {
        self.0.get(name).copied().unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, quantity: Quantity) -> Option<Quantity> {
        self.0.insert(name.into(), quantity)
    }

    pub fn cpu(&self) -> Quantity {
        self.get(CPU)
    }

    pub fn memory(&self) -> Quantity {
        self.get(MEMORY)
    }

    pub fn pods(&self) -> Quantity {
        self.get(PODS)
    }

    /// Per-name sum of `self` and `other`.
    pub fn merge(&self, other: &ResourceList) -> ResourceList {
        let mut merged = self.clone();
        for (name, quantity) in other.iter() {
            *merged.0.entry(name.to_string()).or_default() += quantity;
        }
        merged
    }

    /// Per-name sum of every list.
    pub fn sum<'a>(lists: impl IntoIterator<Item = &'a ResourceList>) -> ResourceList {
        lists
            .into_iter()
            .fold(ResourceList::new(), |acc, list| acc.merge(list))
    }

    /// True when every entry is zero (or the list is empty).
    pub fn is_zero(&self) -> bool {
        self.0.values().all(|q| q.is_zero())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Quantity)> + '_ {
        self.0.iter().map(|(name, q)| (name.as_str(), *q))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Quantity)> for ResourceList {
    fn from_iter<T: IntoIterator<Item = (String, Quantity)>>(iter: T) -> Self {
        ResourceList(iter.into_iter().collect())
    }
}

impl fmt::Display for ResourceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, quantity)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {quantity}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    #[test]
    fn parses_cpu_forms() {
        assert_eq!(q("2").millis(), 2_000);
        assert_eq!(q("500m").millis(), 500);
        assert_eq!(q("0.5").millis(), 500);
        assert_eq!(q(".25").millis(), 250);
    }

    #[test]
    fn parses_memory_suffixes() {
        assert_eq!(q("4Gi"), Quantity::from_units(4 << 30));
        assert_eq!(q("128Mi"), Quantity::from_units(128 << 20));
        assert_eq!(q("1k"), Quantity::from_units(1_000));
        assert_eq!(q("1.5Gi"), Quantity::from_units(3 << 29));
        assert_eq!(q("2G"), Quantity::from_units(2_000_000_000));
    }

    #[test]
    fn parses_exponent_form() {
        assert_eq!(q("1e3"), Quantity::from_units(1_000));
        assert_eq!(q("1.5E3"), Quantity::from_units(1_500));
        assert_eq!(q("5e-1").millis(), 500);
        assert_eq!(q("2e-3").millis(), 2);
        assert_eq!(q("1e+2"), Quantity::from_units(100));
        assert!("1e-4".parse::<Quantity>().is_err());
        assert!("1e30".parse::<Quantity>().is_err());
    }

    #[test]
    fn fractional_millis_round_up() {
        assert_eq!(q("0.0001").millis(), 1);
    }

    #[test]
    fn rejects_malformed() {
        for raw in ["", "abc", "1.2.3", "5Q", "Gi", "-1", "1e", "e3"] {
            assert!(raw.parse::<Quantity>().is_err(), "{raw:?} should not parse");
        }
    }

    #[test]
    fn rejects_overflow() {
        assert!("100Ei".parse::<Quantity>().is_err());
    }

    #[test]
    fn renders_canonically() {
        assert_eq!(q("500m").to_string(), "500m");
        assert_eq!(q("2").to_string(), "2");
        assert_eq!(q("4096Mi").to_string(), "4Gi");
        assert_eq!(q("1536Mi").to_string(), "1536Mi");
        assert_eq!(q("1024").to_string(), "1024");
    }

    #[test]
    fn deserializes_strings_and_numbers() {
        let list: ResourceList =
            serde_json::from_str(r#"{"cpu": 2, "memory": "4Gi", "nvidia.com/gpu": "1", "x": 0.5}"#)
                .unwrap();
        assert_eq!(list.cpu(), Quantity::from_units(2));
        assert_eq!(list.memory(), q("4Gi"));
        assert_eq!(list.get("nvidia.com/gpu"), Quantity::from_units(1));
        assert_eq!(list.get("x"), Quantity::from_millis(500));
    }

    #[test]
    fn merge_adds_per_name() {
        let a = ResourceList::parse([("cpu", "1"), ("memory", "1Gi")]).unwrap();
        let b = ResourceList::parse([("cpu", "500m"), ("pods", "1")]).unwrap();
        let merged = a.merge(&b);

        assert_eq!(merged.cpu(), q("1500m"));
        assert_eq!(merged.memory(), q("1Gi"));
        assert_eq!(merged.pods(), Quantity::from_units(1));
        assert_eq!(ResourceList::sum([&a, &b, &a]).cpu(), q("2500m"));
    }

    #[test]
    fn missing_names_read_as_zero() {
        let list = ResourceList::new();
        assert!(list.get("cpu").is_zero());
        assert!(list.is_zero());
    }

    #[test]
    fn display_is_ordered() {
        let list = ResourceList::parse([("memory", "2Gi"), ("cpu", "250m")]).unwrap();
        assert_eq!(list.to_string(), "{cpu: 250m, memory: 2Gi}");
    }
}
