//! End-to-end solves over scenario files and hand-built catalogs.
//!
//! Scenario fixtures live in `tests/fixtures/` at the workspace root.

use std::path::{Path, PathBuf};

use nodepack_core::instance::LABEL_ZONE;
use nodepack_core::resources::PODS;
use nodepack_core::{
    InstanceType, Operator, PodId, PodRequest, Quantity, Requirement, Requirements, ResourceList, ScenarioConfig,
    SharedShape,
};
use nodepack_scheduling::{BinError, FinalizedBin, SolveOutcome, SolveReport, Solver};

// ── Helpers ───────────────────────────────────────────────────────

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf()
}

fn load(name: &str) -> ScenarioConfig {
    let path = workspace_root().join("tests/fixtures").join(name);
    ScenarioConfig::from_file(&path).unwrap()
}

fn solve_scenario(scenario: &ScenarioConfig) -> SolveOutcome {
    scenario.validate().unwrap();
    let catalog = scenario.catalog().unwrap();
    Solver::new()
        .solve_provisioner(&scenario.provisioner, &catalog, scenario.pod_requests().unwrap())
        .unwrap()
}

fn resources(pairs: &[(&str, &str)]) -> ResourceList {
    ResourceList::parse(pairs.iter().copied()).unwrap()
}

fn pod(name: &str, pairs: &[(&str, &str)]) -> PodRequest {
    PodRequest::new(PodId::new("default", name), resources(pairs), Requirements::default())
}

fn shape(name: &str, pairs: &[(&str, &str)], price: f64) -> SharedShape {
    InstanceType::new(name, resources(pairs), price).into_shared()
}

fn shape_names(bin: &FinalizedBin) -> Vec<&str> {
    bin.instance_shapes.iter().map(|shape| shape.name()).collect()
}

fn pod_names(bin: &FinalizedBin) -> Vec<&str> {
    bin.pods.iter().map(|pod| pod.id().name.as_str()).collect()
}

/// Every surviving candidate can host its bin's committed resources.
fn assert_capacity_safe(outcome: &SolveOutcome) {
    for bin in &outcome.bins {
        for shape in &bin.instance_shapes {
            let committed = ResourceList::sum([shape.overhead(), &bin.daemon_resources, &bin.pod_resources]);
            for (name, total) in shape.resources().iter() {
                assert!(
                    committed.get(name) <= total,
                    "{} overcommitted on {name}: {} > {total}",
                    shape.name(),
                    committed.get(name)
                );
            }
            let max_pods = shape.resources().get(PODS);
            assert!(max_pods.is_zero() || Quantity::from_units(bin.pods.len() as u64) <= max_pods);
        }
    }
}

// ── Scenario files ────────────────────────────────────────────────

#[test]
fn mixed_workload_fixture() {
    let outcome = solve_scenario(&load("mixed-workload.toml"));

    assert_eq!(outcome.bins.len(), 2);
    assert_eq!(shape_names(&outcome.bins[0]), ["p3.2xlarge"]);
    assert_eq!(pod_names(&outcome.bins[0]), ["train-0", "web-0", "web-1", "web-2"]);
    assert_eq!(shape_names(&outcome.bins[1]), ["m5.large", "m5.xlarge", "m5.2xlarge"]);
    assert_eq!(pod_names(&outcome.bins[1]), ["api-0"]);

    assert_eq!(outcome.unschedulable.len(), 1);
    assert_eq!(outcome.unschedulable[0].pod.id().to_string(), "batch/crunch-0");
    assert!(matches!(
        outcome.unschedulable[0].reason,
        BinError::NoMatchingInstanceType { .. }
    ));
    assert!(!outcome.cancelled);
    assert_eq!(outcome.rounds, 2);
    assert_capacity_safe(&outcome);
}

#[test]
fn arm_shapes_are_excluded_by_provisioner() {
    let outcome = solve_scenario(&load("mixed-workload.toml"));
    assert!(
        outcome
            .bins
            .iter()
            .flat_map(|bin| bin.instance_shapes.iter())
            .all(|shape| shape.name() != "m6g.large")
    );
}

#[test]
fn scaffold_solves_cleanly() {
    let outcome = solve_scenario(&ScenarioConfig::scaffold("default"));
    assert_eq!(outcome.bins.len(), 1);
    assert_eq!(shape_names(&outcome.bins[0]), ["standard-2", "standard-4"]);
    assert!(outcome.unschedulable.is_empty());
}

#[test]
fn report_over_fixture() {
    let outcome = solve_scenario(&load("mixed-workload.toml"));
    let report = SolveReport::from(&outcome);
    assert_eq!(report.nodes[0].instance_type.as_deref(), Some("p3.2xlarge"));
    assert_eq!(report.nodes[1].instance_type.as_deref(), Some("m5.large"));
    assert!((report.total_price() - (3.06 + 0.096)).abs() < 1e-9);
}

// ── Properties ────────────────────────────────────────────────────

#[test]
fn bins_never_overcommit() {
    let shapes = vec![
        shape("a", &[("cpu", "2"), ("memory", "4Gi"), ("pods", "3")], 0.1),
        shape("b", &[("cpu", "4"), ("memory", "8Gi"), ("pods", "5")], 0.2),
        shape("c", &[("cpu", "16"), ("memory", "64Gi"), ("pods", "10")], 0.8),
    ];
    let pods: Vec<PodRequest> = (0..40)
        .map(|i| {
            let cpu = format!("{}m", 250 + (i % 7) * 300);
            let memory = format!("{}Mi", 256 + (i % 5) * 700);
            pod(&format!("p{i}"), &[("cpu", cpu.as_str()), ("memory", memory.as_str())])
        })
        .collect();

    let outcome = Solver::new().solve(
        &Requirements::default(),
        &resources(&[("cpu", "100m"), ("memory", "100Mi")]),
        shapes,
        pods,
    );
    assert!(outcome.unschedulable.is_empty());
    assert_eq!(outcome.scheduled_pods(), 40);
    assert_capacity_safe(&outcome);
}

#[test]
fn zero_request_pod_is_schedulable() {
    let outcome = Solver::new().solve(
        &Requirements::default(),
        &ResourceList::new(),
        vec![shape("a", &[("cpu", "1")], 0.1)],
        vec![pod("idle", &[])],
    );
    assert_eq!(outcome.bins.len(), 1);
    assert!(outcome.unschedulable.is_empty());
}

#[test]
fn solves_are_deterministic() {
    let run = || {
        let shapes = vec![
            shape("y", &[("cpu", "4"), ("memory", "8Gi")], 0.2),
            shape("x", &[("cpu", "4"), ("memory", "8Gi")], 0.2),
            shape("w", &[("cpu", "2"), ("memory", "4Gi")], 0.1),
        ];
        let pods = (0..12)
            .map(|i| pod(&format!("p{i}"), &[("cpu", if i % 3 == 0 { "1500m" } else { "500m" })]))
            .collect();
        let outcome = Solver::new().solve(&Requirements::default(), &ResourceList::new(), shapes, pods);
        outcome
            .bins
            .iter()
            .map(|bin| (shape_names(bin).join(","), pod_names(bin).join(",")))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn provisioner_constraints_reach_every_bin() {
    let zonal = |name: &str, zones: &[&str]| {
        InstanceType::new(name, resources(&[("cpu", "4")]), 0.1)
            .with_requirements([Requirement::in_values(LABEL_ZONE, zones.iter().copied()).unwrap()])
            .unwrap()
            .into_shared()
    };
    let constraints = Requirements::new([Requirement::new(LABEL_ZONE, Operator::In, ["b"]).unwrap()]).unwrap();

    let outcome = Solver::new().solve(
        &constraints,
        &ResourceList::new(),
        vec![zonal("only-a", &["a"]), zonal("a-or-b", &["a", "b"])],
        vec![pod("p", &[("cpu", "1")])],
    );
    assert_eq!(shape_names(&outcome.bins[0]), ["a-or-b"]);
    assert!(outcome.bins[0].requirements.get(LABEL_ZONE).unwrap().has("b"));
}
