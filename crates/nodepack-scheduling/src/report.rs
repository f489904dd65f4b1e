//! Human and JSON summaries of a solve.

use std::fmt::Write;

use serde::Serialize;

use nodepack_core::{ResourceList, SharedShape};

use crate::solver::{FinalizedBin, SolveOutcome};

/// How many candidate names a text node line shows.
const LISTED_CANDIDATES: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct SolveReport {
    pub nodes: Vec<NodeReport>,
    pub unschedulable: Vec<UnschedulableReport>,
    pub rounds: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    /// The cheapest candidate, if any remain.
    pub instance_type: Option<String>,
    pub price: Option<f64>,
    pub candidates: Vec<String>,
    pub pods: Vec<String>,
    /// Daemon reservation plus pod requests.
    pub requests: ResourceList,
    pub requirements: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnschedulableReport {
    pub pod: String,
    pub reason: String,
}

impl From<&FinalizedBin> for NodeReport {
    fn from(bin: &FinalizedBin) -> Self {
        let cheapest = bin.cheapest();
        Self {
            instance_type: cheapest.map(|shape| shape.name().to_string()),
            price: cheapest.map(|shape| shape.price()),
            candidates: bin.instance_shapes.iter().map(|shape| shape.name().to_string()).collect(),
            pods: bin.pods.iter().map(|pod| pod.id().to_string()).collect(),
            requests: bin.daemon_resources.merge(&bin.pod_resources),
            requirements: bin.requirements.to_string(),
        }
    }
}

impl From<&SolveOutcome> for SolveReport {
    fn from(outcome: &SolveOutcome) -> Self {
        Self {
            nodes: outcome.bins.iter().map(NodeReport::from).collect(),
            unschedulable: outcome
                .unschedulable
                .iter()
                .map(|entry| UnschedulableReport {
                    pod: entry.pod.id().to_string(),
                    reason: entry.reason.to_string(),
                })
                .collect(),
            rounds: outcome.rounds,
            cancelled: outcome.cancelled,
        }
    }
}

impl SolveReport {
    /// Hourly price of launching the cheapest candidate of every node.
    pub fn total_price(&self) -> f64 {
        self.nodes.iter().filter_map(|node| node.price).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Render a solve as plain text, one block per node.
pub fn format_report(report: &SolveReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} node(s), {} unschedulable pod(s), {} round(s)",
        report.nodes.len(),
        report.unschedulable.len(),
        report.rounds
    );
    if report.cancelled {
        out.push_str("solve was cancelled before completion\n");
    }

    for (i, node) in report.nodes.iter().enumerate() {
        let launch = node.instance_type.as_deref().unwrap_or("<none>");
        let _ = write!(out, "\nnode {i}: {launch}");
        if let Some(price) = node.price {
            let _ = write!(out, " (${price:.4}/h)");
        }
        out.push('\n');

        let listed: Vec<&str> = node.candidates.iter().take(LISTED_CANDIDATES).map(String::as_str).collect();
        let _ = write!(out, "  candidates: {}", listed.join(", "));
        if node.candidates.len() > LISTED_CANDIDATES {
            let _ = write!(out, " and {} others", node.candidates.len() - LISTED_CANDIDATES);
        }
        out.push('\n');
        let _ = writeln!(out, "  requests: {}", node.requests);
        if !node.requirements.is_empty() {
            let _ = writeln!(out, "  requirements: {}", node.requirements);
        }
        let _ = writeln!(out, "  pods: {}", node.pods.join(", "));
    }

    if !report.unschedulable.is_empty() {
        out.push_str("\nunschedulable:\n");
        for entry in &report.unschedulable {
            let _ = writeln!(out, "  {}: {}", entry.pod, entry.reason);
        }
    }

    if !report.nodes.is_empty() {
        let _ = writeln!(out, "\nestimated cost: ${:.4}/h", report.total_price());
    }
    out
}

/// Cheapest first, one `name price resources` line per shape.
pub fn format_catalog(shapes: &[SharedShape]) -> String {
    let mut sorted: Vec<&SharedShape> = shapes.iter().collect();
    sorted.sort_by(|a, b| a.price().total_cmp(&b.price()).then_with(|| a.name().cmp(b.name())));

    let width = sorted.iter().map(|shape| shape.name().len()).max().unwrap_or(0);
    let mut out = String::new();
    for shape in sorted {
        let _ = writeln!(
            out,
            "{:<width$}  ${:.4}/h  {}",
            shape.name(),
            shape.price(),
            shape.resources()
        );
    }
    out
}
