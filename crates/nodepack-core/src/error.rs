//! Error types for nodepack core types.

use thiserror::Error;

use crate::requirements::Operator;

/// Errors produced while building or combining requirements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementError {
    /// Two requirement sets leave no allowed value for a shared key.
    #[error("incompatible requirements for key {key}, {detail}")]
    Incompatible { key: String, detail: String },

    #[error("requirement on {key} uses operator In with no values")]
    EmptyValues { key: String },

    #[error("requirement on {key} uses operator {operator} which takes no values")]
    UnexpectedValues { key: String, operator: Operator },

    #[error("requirement on {key} uses operator {operator} which takes exactly one value, got {count}")]
    BoundArity {
        key: String,
        operator: Operator,
        count: usize,
    },

    #[error("requirement on {key} has non-integer bound {value:?}")]
    InvalidBound { key: String, value: String },

    #[error("unknown requirement operator {0:?}")]
    UnknownOperator(String),
}

/// A resource quantity string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse quantity {raw:?}: {reason}")]
pub struct QuantityParseError {
    pub raw: String,
    pub reason: &'static str,
}

impl QuantityParseError {
    pub(crate) fn new(raw: &str, reason: &'static str) -> Self {
        Self {
            raw: raw.to_string(),
            reason,
        }
    }
}

/// Errors raised while loading a scenario file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render scenario: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("{context}: {source}")]
    Requirement {
        context: String,
        source: RequirementError,
    },

    #[error("duplicate {kind} name: {name}")]
    Duplicate { kind: &'static str, name: String },

    #[error("instance type {name} has invalid price {price}")]
    InvalidPrice { name: String, price: f64 },
}
