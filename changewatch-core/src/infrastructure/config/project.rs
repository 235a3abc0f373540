// changewatch-core/src/infrastructure/config/project.rs

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::domain::project::configuration::ProjectConfig;
use crate::domain::variable::Variable;
use crate::infrastructure::error::InfrastructureError;

pub const ENV_DATABASE_PATH: &str = "CHANGEWATCH_DATABASE_PATH";
pub const ENV_WORKERS: &str = "CHANGEWATCH_WORKERS";

#[instrument(skip(project_dir))]
pub fn load_project_config(project_dir: &Path) -> Result<ProjectConfig, InfrastructureError> {
    let config_path = find_main_config(project_dir)?;
    info!(path = ?config_path, "Loading project configuration");

    let content = fs::read_to_string(&config_path)?;
    let mut config: ProjectConfig = serde_yaml::from_str(&content)?;

    // CHANGEWATCH_DATABASE_PATH=/tmp/cw.duckdb changewatch recalculate ...
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    if config.recalculation.workers == 0 {
        return Err(InfrastructureError::ConfigError(
            "recalculation.workers must be at least 1".into(),
        ));
    }
    Ok(config)
}

fn find_main_config(root: &Path) -> Result<PathBuf, InfrastructureError> {
    let candidates = ["changewatch.yaml", "changewatch_project.yaml"];
    for filename in candidates {
        let p = root.join(filename);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(InfrastructureError::ConfigNotFound(format!(
        "No configuration file found in {:?}. Checked: {:?}",
        root, candidates
    )))
}

fn apply_env_overrides(config: &mut ProjectConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup(ENV_DATABASE_PATH) {
        info!(old = ?config.database_path, new = ?val, "Overriding database path via ENV");
        config.database_path = val;
    }
    if let Some(val) = lookup(ENV_WORKERS) {
        match val.parse::<usize>() {
            Ok(workers) => {
                info!(old = config.recalculation.workers, new = workers, "Overriding workers via ENV");
                config.recalculation.workers = workers;
            }
            Err(_) => warn!(value = ?val, "Ignoring non-numeric {}", ENV_WORKERS),
        }
    }
}

/// Dataset directory, relative paths being taken from the project root.
pub fn datasets_dir(config: &ProjectConfig, project_dir: &Path) -> PathBuf {
    project_dir.join(&config.datasets_path)
}

/// Database location; `:memory:` is passed through.
pub fn database_location(config: &ProjectConfig, project_dir: &Path) -> String {
    if config.database_path == ":memory:" {
        return config.database_path.clone();
    }
    project_dir
        .join(&config.database_path)
        .to_string_lossy()
        .into_owned()
}

/// Reads a variable set (YAML list) for import.
pub fn load_variables(path: &Path) -> Result<Vec<Variable>, InfrastructureError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_load_and_resolve_paths() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("changewatch.yaml"),
            "name: demo\ndatabase-path: db/cw.duckdb\n",
        )?;
        let config = load_project_config(dir.path())?;
        assert_eq!(config.name, "demo");
        assert_eq!(datasets_dir(&config, dir.path()), dir.path().join("datasets"));
        assert!(database_location(&config, dir.path()).ends_with("cw.duckdb"));
        Ok(())
    }

    #[test]
    fn test_missing_config() -> Result<()> {
        let dir = tempdir()?;
        let res = load_project_config(dir.path());
        assert!(matches!(res, Err(InfrastructureError::ConfigNotFound(_))));
        Ok(())
    }

    #[test]
    fn test_env_overrides() {
        let mut config: ProjectConfig = serde_yaml::from_str("name: demo").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DATABASE_PATH, ":memory:"),
            (ENV_WORKERS, "2"),
        ]);
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.database_path, ":memory:");
        assert_eq!(config.recalculation.workers, 2);

        let bad: HashMap<&str, &str> = HashMap::from([(ENV_WORKERS, "many")]);
        apply_env_overrides(&mut config, |k| bad.get(k).map(|v| v.to_string()));
        assert_eq!(config.recalculation.workers, 2);
    }

    #[test]
    fn test_load_variables_yaml() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("variables.yaml");
        fs::write(
            &path,
            "- name: p99\n  labels:\n    - { name: p99, schema: 'urn:latency:1', jsonpath: '$.p99' }\n",
        )?;
        let vars = load_variables(&path)?;
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].labels[0].accessor.jsonpath, "$.p99");
        Ok(())
    }
}
