//! Scheduling error types.

use thiserror::Error;

use nodepack_core::RequirementError;

/// Why a pod could not join a bin.
///
/// Every variant is a soft, per-pod result: the bin stays usable and the
/// pod may still fit elsewhere or in a later round.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinError {
    #[error(transparent)]
    Incompatible(#[from] RequirementError),

    /// No remaining candidate can host the pod's requests under the
    /// tightened requirements.
    #[error("no matching instance type found for resources {resources} and requirements [{requirements}]")]
    NoMatchingInstanceType {
        resources: String,
        requirements: String,
    },

    #[error("solve cancelled before the pod was attempted")]
    Cancelled,
}

pub type BinResult<T> = Result<T, BinError>;
