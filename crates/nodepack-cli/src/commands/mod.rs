pub mod catalog;
pub mod check;
pub mod init;
pub mod solve;

use std::path::Path;

use anyhow::Context;
use nodepack_core::ScenarioConfig;

/// Read and validate a scenario file.
pub fn load_scenario(path: &str) -> anyhow::Result<ScenarioConfig> {
    let scenario = ScenarioConfig::from_file(Path::new(path))?;
    scenario
        .validate()
        .with_context(|| format!("invalid scenario {path}"))?;
    Ok(scenario)
}

#[cfg(test)]
pub(crate) fn fixture(name: &str) -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../tests/fixtures")
        .join(name)
        .display()
        .to_string()
}
