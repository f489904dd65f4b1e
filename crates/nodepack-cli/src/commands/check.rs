use nodepack_core::ScenarioConfig;

use super::load_scenario;

pub fn check(path: &str) -> anyhow::Result<()> {
    match load_scenario(path) {
        Ok(scenario) => {
            println!("✓ {path} is valid");
            println!("{}", summary(&scenario));
            Ok(())
        }
        Err(e) => {
            eprintln!("Check failed: {e:#}");
            Err(e)
        }
    }
}

fn summary(scenario: &ScenarioConfig) -> String {
    format!(
        "  provisioner: {} ({} requirement(s))\n  instance types: {}\n  pods: {}",
        scenario.provisioner.name,
        scenario.provisioner.requirements.len(),
        scenario.instance_types.len(),
        scenario.pods.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixture;

    #[test]
    fn summary_counts_entries() {
        let scenario = load_scenario(&fixture("mixed-workload.toml")).unwrap();
        let text = summary(&scenario);
        assert!(text.contains("provisioner: default (1 requirement(s))"));
        assert!(text.contains("instance types: 5"));
        assert!(text.contains("pods: 6"));
    }

    #[test]
    fn duplicate_pods_fail_the_check() {
        assert!(check(&fixture("duplicate-pod.toml")).is_err());
    }

    #[test]
    fn missing_file_fails_the_check() {
        assert!(check("/nonexistent/nodepack.toml").is_err());
    }
}
