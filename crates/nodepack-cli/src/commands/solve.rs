//! `nodepack solve`: pack a scenario's pods and print the plan.

use std::sync::Arc;

use anyhow::bail;
use nodepack_scheduling::{SolveMetrics, SolveReport, Solver, format_report};

use super::load_scenario;

pub fn solve(path: &str, format: &str, metrics: bool) -> anyhow::Result<()> {
    print!("{}", render(path, format, metrics)?);
    Ok(())
}

/// Solve `path` and render the outcome as `format` (text or json).
pub fn render(path: &str, format: &str, metrics: bool) -> anyhow::Result<String> {
    if !matches!(format, "text" | "json") {
        bail!("unsupported format {format:?}, expected text or json");
    }

    let scenario = load_scenario(path)?;
    let catalog = scenario.catalog()?;
    let pods = scenario.pod_requests()?;

    let solve_metrics = Arc::new(SolveMetrics::new());
    let outcome = Solver::new()
        .with_metrics(Arc::clone(&solve_metrics))
        .solve_provisioner(&scenario.provisioner, &catalog, pods)?;
    let report = SolveReport::from(&outcome);

    let mut out = match format {
        "json" => {
            let mut json = report.to_json()?;
            json.push('\n');
            json
        }
        _ => format_report(&report),
    };
    if metrics {
        out.push('\n');
        out.push_str(&solve_metrics.render_prometheus());
    }
    Ok(out)
}
