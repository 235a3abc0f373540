use anyhow::{Context, Result};
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// A private copy of the demo project, so every test gets its own database.
struct DemoProject {
    _tmp: TempDir,
    root: PathBuf,
}

impl DemoProject {
    fn new() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let project_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .context("Workspace root not found")?
            .join("demos/latency");

        let dest = tmp.path().join("latency");
        Self::copy_dir(&project_root, &dest)?;

        Ok(Self {
            _tmp: tmp,
            root: dest,
        })
    }

    fn copy_dir(src: &PathBuf, dst: &PathBuf) -> std::io::Result<()> {
        let mut options = fs_extra::dir::CopyOptions::new();
        options.skip_exist = true;
        options.content_only = true;

        std::fs::create_dir_all(dst)?;
        fs_extra::dir::copy(src, dst, &options)
            .map(|_| ())
            .map_err(|e| std::io::Error::other(e.to_string()))
    }

    fn changewatch(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("changewatch"));
        cmd.current_dir(&self.root);
        cmd.env_remove("CHANGEWATCH_DATABASE_PATH");
        cmd.env_remove("CHANGEWATCH_WORKERS");
        cmd
    }

    fn import(&self) {
        self.changewatch()
            .args(["variables", "--test", "1", "--import", "variables.yaml"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Imported 3 variables"));
    }
}

#[test]
fn test_models_lists_registry() -> Result<()> {
    let env = DemoProject::new()?;
    env.changewatch()
        .arg("models")
        .assert()
        .success()
        .stdout(predicate::str::contains("relativeDifference"))
        .stdout(predicate::str::contains("fixedThreshold"))
        .stdout(predicate::str::contains("zScore"));
    Ok(())
}

#[test]
fn test_recalculate_detects_latency_and_cpu_changes() -> Result<()> {
    let env = DemoProject::new()?;
    env.import();

    env.changewatch()
        .args(["recalculate", "--test", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Datasets: 6"))
        .stdout(predicate::str::contains("1 without accessor: {6}"))
        .stdout(predicate::str::contains("SUCCESS"));

    assert!(env.root.join("target/changewatch.duckdb").exists());

    // p99 is variable 1: the jump to 50 on dataset 4
    env.changewatch()
        .args(["changes", "--variable", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("relativeDifference"))
        .stdout(predicate::str::contains("2026-03-04"));

    // cpu is variable 3: 95% is above the bound
    env.changewatch()
        .args(["changes", "--variable", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fixedThreshold"));

    // The miss is in the calculation log
    env.changewatch()
        .args(["log", "--test", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("warning"))
        .stdout(predicate::str::contains("urn:latency:1"));
    Ok(())
}

#[test]
fn test_deleted_change_is_not_recreated() -> Result<()> {
    let env = DemoProject::new()?;
    env.import();
    env.changewatch()
        .args(["recalculate", "--test", "1"])
        .assert()
        .success();

    env.changewatch()
        .args(["delete-change", "--id", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Change 1 deleted"));

    env.changewatch()
        .args(["recalculate", "--test", "1"])
        .assert()
        .success();

    env.changewatch()
        .args(["delete-change", "--id", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    Ok(())
}

#[test]
fn test_confirm_change_and_dashboard() -> Result<()> {
    let env = DemoProject::new()?;
    env.import();
    env.changewatch()
        .args(["recalculate", "--test", "1"])
        .assert()
        .success();

    env.changewatch()
        .args(["confirm-change", "--id", "1", "--description", "known regression"])
        .assert()
        .success()
        .stdout(predicate::str::contains("confirmed"));

    env.changewatch()
        .args(["dashboard", "--test", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("host"))
        .stdout(predicate::str::contains("io"))
        .stdout(predicate::str::contains("p99"));

    env.changewatch()
        .args(["last-datapoints", "--variable", "1", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2026-03-05"))
        .stdout(predicate::str::contains("2026-03-06"));
    Ok(())
}

#[test]
fn test_import_rejects_unknown_model() -> Result<()> {
    let env = DemoProject::new()?;
    std::fs::write(
        env.root.join("broken.yaml"),
        "- name: p99\n  labels:\n    - { name: p99, schema: 'urn:latency:1', jsonpath: '$.p99' }\n  changeDetection:\n    - model: crystalBall\n",
    )?;
    env.changewatch()
        .args(["variables", "--test", "1", "--import", "broken.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("crystalBall"));
    Ok(())
}

#[test]
fn test_database_path_env_override() -> Result<()> {
    let env = DemoProject::new()?;
    env.changewatch()
        .env("CHANGEWATCH_DATABASE_PATH", ":memory:")
        .args(["variables", "--test", "1", "--import", "variables.yaml"])
        .assert()
        .success();
    assert!(!env.root.join("target/changewatch.duckdb").exists());
    Ok(())
}

#[test]
fn test_missing_project_config() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    Command::new(assert_cmd::cargo::cargo_bin!("changewatch"))
        .current_dir(tmp.path())
        .arg("models")
        .assert()
        .success();

    Command::new(assert_cmd::cargo::cargo_bin!("changewatch"))
        .current_dir(tmp.path())
        .args(["variables", "--test", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load project configuration"));
    Ok(())
}
