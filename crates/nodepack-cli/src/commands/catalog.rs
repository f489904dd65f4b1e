use nodepack_scheduling::format_catalog;

use super::load_scenario;

pub fn catalog(path: &str) -> anyhow::Result<()> {
    let scenario = load_scenario(path)?;
    print!("{}", format_catalog(&scenario.instance_types()?));
    Ok(())
}
