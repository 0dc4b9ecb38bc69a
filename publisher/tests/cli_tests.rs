// publisher/tests/cli_tests.rs

use anyhow::Result;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// A server root with one project ("home") serving the local "faa" package.
struct PublisherTestEnv {
    _tmp: TempDir,
    root: PathBuf,
    scratch: PathBuf,
}

impl PublisherTestEnv {
    fn new() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("server");
        let faa = root.join("faa");
        std::fs::create_dir_all(&faa)?;
        std::fs::write(
            faa.join("publisher.json"),
            r#"{"name": "faa", "description": "Flight data"}"#,
        )?;
        std::fs::write(
            faa.join("flights.malloy"),
            "source: flights is duckdb.table('flights.parquet')\nquery: by_origin is flights -> { group_by: origin }\n",
        )?;
        std::fs::write(
            root.join("publisher.config.json"),
            r#"{"projects": [{"name": "home", "packages": [{"name": "faa", "location": "./faa"}]}]}"#,
        )?;

        Ok(Self {
            scratch: tmp.path().join("scratch"),
            root,
            _tmp: tmp,
        })
    }

    fn publisher(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("publisher"));
        cmd.env_remove("PUBLISHER_SERVER_ROOT")
            .env_remove("PUBLISHER_SCRATCH_DIR")
            .arg("--server-root")
            .arg(&self.root)
            .arg("--scratch-dir")
            .arg(&self.scratch);
        cmd
    }
}

#[test]
fn test_projects_table() -> Result<()> {
    let env = PublisherTestEnv::new()?;
    env.publisher()
        .arg("projects")
        .assert()
        .success()
        .stdout(predicate::str::contains("home").and(predicate::str::contains("ready")));
    Ok(())
}

#[test]
fn test_projects_json() -> Result<()> {
    let env = PublisherTestEnv::new()?;
    let output = env.publisher().args(["projects", "--json"]).output()?;
    assert!(output.status.success());

    let summaries: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(summaries[0]["name"], "home");
    assert_eq!(summaries[0]["status"], "ready");
    assert!(summaries[0]["loadedAt"].is_string());
    Ok(())
}

#[test]
fn test_packages_and_models() -> Result<()> {
    let env = PublisherTestEnv::new()?;
    env.publisher()
        .args(["packages", "home"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Flight data"));

    env.publisher()
        .args(["models", "home", "faa"])
        .assert()
        .success()
        .stdout(predicate::str::contains("flights.malloy").and(predicate::str::contains("unloaded")));
    Ok(())
}

#[test]
fn test_compile_prints_outline() -> Result<()> {
    let env = PublisherTestEnv::new()?;
    env.publisher()
        .args(["compile", "home", "faa", "flights.malloy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("by_origin").and(predicate::str::contains("\"duckdb\"")));
    Ok(())
}

#[test]
fn test_unknown_project_fails() -> Result<()> {
    let env = PublisherTestEnv::new()?;
    env.publisher()
        .args(["packages", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    Ok(())
}

#[test]
fn test_connection_without_name_reports_failure() -> Result<()> {
    let env = PublisherTestEnv::new()?;
    let file = env.root.join("conn.json");
    std::fs::write(&file, r#"{"type": "duckdb"}"#)?;

    env.publisher()
        .arg("test-connection")
        .arg(&file)
        .assert()
        .failure()
        .stdout(predicate::str::contains("connection name is required"));
    Ok(())
}

#[test]
fn test_embedded_connection_passes() -> Result<()> {
    let env = PublisherTestEnv::new()?;
    let file = env.root.join("conn.json");
    std::fs::write(&file, r#"{"name": "local", "type": "duckdb"}"#)?;

    env.publisher()
        .arg("test-connection")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ok\""));
    Ok(())
}
