//! Bin-packing solver.
//!
//! Pods are sorted largest first, shapes cheapest first. Every round offers
//! each still-pending pod to the bin set; rounds repeat while they make
//! progress, so a pod rejected early gets another try once later pods have
//! shaped the bins.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use nodepack_core::{Catalog, ConfigError, PodRequest, ProvisionerConfig, Requirements, ResourceList, SharedShape};

use crate::bin::Bin;
use crate::bin_set::BinSet;
use crate::error::BinError;
use crate::metrics::{SolveMetrics, SolveObservation};

/// A bin after the solve: the node to launch and what runs on it.
#[derive(Debug, Clone)]
pub struct FinalizedBin {
    pub requirements: Requirements,
    /// Surviving candidates, cheapest first.
    pub instance_shapes: Vec<SharedShape>,
    pub pods: Vec<PodRequest>,
    pub pod_resources: ResourceList,
    pub daemon_resources: ResourceList,
}

impl FinalizedBin {
    /// The shape a provisioner would launch for this bin.
    pub fn cheapest(&self) -> Option<&SharedShape> {
        self.instance_shapes.first()
    }
}

impl From<Bin> for FinalizedBin {
    fn from(bin: Bin) -> Self {
        Self {
            requirements: bin.requirements().clone(),
            instance_shapes: bin.instance_shapes().to_vec(),
            pods: bin.pods().to_vec(),
            pod_resources: bin.pod_resources().clone(),
            daemon_resources: bin.daemon_resources().clone(),
        }
    }
}

/// A pod no bin could take, with the last reason it was turned away.
#[derive(Debug, Clone)]
pub struct Unschedulable {
    pub pod: PodRequest,
    pub reason: BinError,
}

#[derive(Debug, Clone, Default)]
pub struct SolveOutcome {
    pub bins: Vec<FinalizedBin>,
    pub unschedulable: Vec<Unschedulable>,
    /// Rounds started before the loop stopped.
    pub rounds: usize,
    /// True when the shutdown signal stopped the solve early.
    pub cancelled: bool,
}

impl SolveOutcome {
    pub fn scheduled_pods(&self) -> usize {
        self.bins.iter().map(|bin| bin.pods.len()).sum()
    }
}

/// Stateless between calls; clone freely and share across threads.
#[derive(Debug, Clone, Default)]
pub struct Solver {
    shutdown: Option<watch::Receiver<bool>>,
    metrics: Option<Arc<SolveMetrics>>,
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop between rounds once `shutdown` reads `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SolveMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Pack `pods` into as few prospective nodes as the greedy order allows.
    ///
    /// Pods that cannot be placed are returned in
    /// [`SolveOutcome::unschedulable`]; this never fails as a whole.
    pub fn solve(
        &self,
        constraints: &Requirements,
        daemon_resources: &ResourceList,
        shapes: Vec<SharedShape>,
        pods: Vec<PodRequest>,
    ) -> SolveOutcome {
        self.solve_labeled("", constraints, daemon_resources, shapes, pods)
    }

    /// `provisioner` only labels logs and metrics.
    fn solve_labeled(
        &self,
        provisioner: &str,
        constraints: &Requirements,
        daemon_resources: &ResourceList,
        mut shapes: Vec<SharedShape>,
        mut pods: Vec<PodRequest>,
    ) -> SolveOutcome {
        let started = Instant::now();

        // Stable: equal pods keep their input order.
        pods.sort_by(|a, b| b.cpu().cmp(&a.cpu()).then_with(|| b.memory().cmp(&a.memory())));
        shapes.sort_by(|a, b| a.price().total_cmp(&b.price()).then_with(|| a.name().cmp(b.name())));

        debug!(
            provisioner,
            pods = pods.len(),
            shapes = shapes.len(),
            constraints = %constraints,
            "starting solve"
        );

        let mut bins = BinSet::new(constraints.clone(), daemon_resources.clone(), shapes);
        let mut pending: Vec<(PodRequest, Option<BinError>)> = pods.into_iter().map(|pod| (pod, None)).collect();
        let mut rounds = 0;
        let mut cancelled = false;

        while !pending.is_empty() {
            if self.shutdown_requested() {
                warn!(pending = pending.len(), rounds, "solve cancelled");
                cancelled = true;
                break;
            }
            rounds += 1;

            let before = pending.len();
            let mut failed = Vec::with_capacity(before);
            for (pod, _) in pending {
                if let Err(reason) = bins.schedule(&pod) {
                    failed.push((pod, Some(reason)));
                }
            }
            pending = failed;

            if pending.len() == before {
                debug!(rounds, pending = pending.len(), "no progress, stopping");
                break;
            }
        }

        let unschedulable: Vec<Unschedulable> = pending
            .into_iter()
            .map(|(pod, reason)| Unschedulable {
                pod,
                reason: reason.unwrap_or(BinError::Cancelled),
            })
            .collect();
        for entry in &unschedulable {
            error!(pod = %entry.pod.id(), reason = %entry.reason, "could not schedule pod");
        }

        let outcome = SolveOutcome {
            bins: bins.into_bins().into_iter().map(FinalizedBin::from).collect(),
            unschedulable,
            rounds,
            cancelled,
        };

        let elapsed = started.elapsed();
        info!(
            provisioner,
            bins = outcome.bins.len(),
            scheduled = outcome.scheduled_pods(),
            unschedulable = outcome.unschedulable.len(),
            rounds,
            elapsed_ms = elapsed.as_millis() as u64,
            "solve finished"
        );
        if let Some(metrics) = &self.metrics {
            metrics.observe_solve(SolveObservation {
                provisioner,
                scheduled: outcome.scheduled_pods(),
                unschedulable: outcome.unschedulable.len(),
                bins: outcome.bins.len(),
                cancelled,
                elapsed,
            });
        }
        outcome
    }

    /// Solve for one provisioner: its constraints and daemon overhead, and
    /// the catalog's current shapes.
    pub fn solve_provisioner(
        &self,
        provisioner: &ProvisionerConfig,
        catalog: &dyn Catalog,
        pods: Vec<PodRequest>,
    ) -> Result<SolveOutcome, ConfigError> {
        let constraints = provisioner.constraints()?;
        Ok(self.solve_labeled(
            &provisioner.name,
            &constraints,
            &provisioner.daemon_overhead,
            catalog.snapshot(),
            pods,
        ))
    }
}
