//! Solver metrics and Prometheus text exposition.
//!
//! Counters are plain atomics so one [`SolveMetrics`] can be shared by
//! concurrent solves behind an `Arc`. Solve durations are kept per
//! provisioner, as `nodepack_scheduling_duration_seconds{provisioner=...}`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Upper bounds (seconds) of the solve duration histogram buckets.
pub const DURATION_BUCKETS: [f64; 12] = [0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 10.0, 60.0];

#[derive(Debug, Default)]
struct DurationHistogram {
    buckets: [AtomicU64; DURATION_BUCKETS.len()],
    count: AtomicU64,
    /// Sum of observed durations, in microseconds.
    sum_micros: AtomicU64,
}

impl DurationHistogram {
    fn observe(&self, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        for (bound, bucket) in DURATION_BUCKETS.iter().zip(&self.buckets) {
            if seconds <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            buckets: self.buckets.iter().map(|bucket| bucket.load(Ordering::Relaxed)).collect(),
            count: self.count.load(Ordering::Relaxed),
            sum_seconds: self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct SolveMetrics {
    solves: AtomicU64,
    cancelled: AtomicU64,
    pods_scheduled: AtomicU64,
    pods_unschedulable: AtomicU64,
    bins_created: AtomicU64,
    durations: RwLock<BTreeMap<String, Arc<DurationHistogram>>>,
}

/// One solve's counts, as handed to [`SolveMetrics::observe_solve`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SolveObservation<'a> {
    /// Empty for solves not tied to a provisioner.
    pub provisioner: &'a str,
    pub scheduled: usize,
    pub unschedulable: usize,
    pub bins: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// Cumulative counts, one per entry of [`DURATION_BUCKETS`].
    pub buckets: Vec<u64>,
    pub count: u64,
    pub sum_seconds: f64,
}

/// Point-in-time copy of [`SolveMetrics`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub solves: u64,
    pub cancelled: u64,
    pub pods_scheduled: u64,
    pub pods_unschedulable: u64,
    pub bins_created: u64,
    /// Duration histograms keyed by provisioner name.
    pub durations: BTreeMap<String, HistogramSnapshot>,
}

impl SolveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of one finished solve.
    pub fn observe_solve(&self, observation: SolveObservation<'_>) {
        self.solves.fetch_add(1, Ordering::Relaxed);
        if observation.cancelled {
            self.cancelled.fetch_add(1, Ordering::Relaxed);
        }
        self.pods_scheduled.fetch_add(observation.scheduled as u64, Ordering::Relaxed);
        self.pods_unschedulable.fetch_add(observation.unschedulable as u64, Ordering::Relaxed);
        self.bins_created.fetch_add(observation.bins as u64, Ordering::Relaxed);
        self.histogram(observation.provisioner).observe(observation.elapsed);
    }

    fn histogram(&self, provisioner: &str) -> Arc<DurationHistogram> {
        let existing = self
            .durations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provisioner)
            .cloned();
        match existing {
            Some(histogram) => histogram,
            None => Arc::clone(
                self.durations
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(provisioner.to_string())
                    .or_default(),
            ),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let durations = self
            .durations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(provisioner, histogram)| (provisioner.clone(), histogram.snapshot()))
            .collect();
        MetricsSnapshot {
            solves: self.solves.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            pods_scheduled: self.pods_scheduled.load(Ordering::Relaxed),
            pods_unschedulable: self.pods_unschedulable.load(Ordering::Relaxed),
            bins_created: self.bins_created.load(Ordering::Relaxed),
            durations,
        }
    }

    pub fn render_prometheus(&self) -> String {
        render_prometheus(&self.snapshot())
    }
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} counter\n"));
    out.push_str(&format!("{name} {value}\n"));
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Render a snapshot in the Prometheus text exposition format.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    counter(&mut out, "nodepack_solves_total", "Solves run.", snapshot.solves);
    counter(
        &mut out,
        "nodepack_solves_cancelled_total",
        "Solves stopped by the shutdown signal.",
        snapshot.cancelled,
    );
    counter(
        &mut out,
        "nodepack_pods_scheduled_total",
        "Pods assigned to a bin.",
        snapshot.pods_scheduled,
    );
    counter(
        &mut out,
        "nodepack_pods_unschedulable_total",
        "Pods left without a bin.",
        snapshot.pods_unschedulable,
    );
    counter(
        &mut out,
        "nodepack_bins_created_total",
        "Prospective nodes produced.",
        snapshot.bins_created,
    );

    out.push_str("# HELP nodepack_scheduling_duration_seconds Time spent in one solve.\n");
    out.push_str("# TYPE nodepack_scheduling_duration_seconds histogram\n");
    for (provisioner, histogram) in &snapshot.durations {
        let label = escape_label(provisioner);
        for (bound, count) in DURATION_BUCKETS.iter().zip(&histogram.buckets) {
            out.push_str(&format!(
                "nodepack_scheduling_duration_seconds_bucket{{provisioner=\"{label}\",le=\"{bound}\"}} {count}\n"
            ));
        }
        out.push_str(&format!(
            "nodepack_scheduling_duration_seconds_bucket{{provisioner=\"{label}\",le=\"+Inf\"}} {}\n",
            histogram.count
        ));
        out.push_str(&format!(
            "nodepack_scheduling_duration_seconds_sum{{provisioner=\"{label}\"}} {:.6}\n",
            histogram.sum_seconds
        ));
        out.push_str(&format!(
            "nodepack_scheduling_duration_seconds_count{{provisioner=\"{label}\"}} {}\n",
            histogram.count
        ));
    }

    out
}
