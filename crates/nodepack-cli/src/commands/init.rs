use std::path::Path;

use anyhow::bail;
use nodepack_core::ScenarioConfig;
use tracing::info;

pub fn init(path: &str, provisioner: &str, force: bool) -> anyhow::Result<()> {
    let output = Path::new(path);
    if output.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", output.display());
    }

    let scenario = ScenarioConfig::scaffold(provisioner);
    std::fs::write(output, scenario.to_toml_string()?)?;
    info!(path = %output.display(), provisioner, "wrote scenario scaffold");
    println!("✓ Generated {}", output.display());
    Ok(())
}
