//! nodepack-scheduling: packs pending pods onto prospective nodes.
//!
//! - **`bin`**: one prospective node and its shrinking candidate list
//! - **`bin_set`**: first-fit placement over the bins of one solve
//! - **`solver`**: sorting, convergence rounds, cancellation
//! - **`metrics`**: solve counters and duration histogram (Prometheus text)
//! - **`report`**: text and JSON summaries of an outcome

pub mod bin;
pub mod bin_set;
pub mod error;
pub mod metrics;
pub mod report;
pub mod solver;

pub use bin::Bin;
pub use bin_set::BinSet;
pub use error::{BinError, BinResult};
pub use metrics::{SolveMetrics, SolveObservation};
pub use report::{SolveReport, format_catalog, format_report};
pub use solver::{FinalizedBin, SolveOutcome, Solver, Unschedulable};
