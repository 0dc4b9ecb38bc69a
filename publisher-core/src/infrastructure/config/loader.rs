// publisher-core/src/infrastructure/config/loader.rs

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::domain::config::{PackageDecl, ProjectDecl, PublisherConfig};
use crate::domain::location::Location;
use crate::error::PublisherError;
use crate::infrastructure::config::env::substitute_env_vars;
use crate::infrastructure::error::InfrastructureError;

pub const MANIFEST_FILE: &str = "publisher.config.json";

/// Loads the manifest using the process environment for substitution.
/// A missing manifest is an empty configuration, not an error.
pub fn load_config(root: &Path) -> Result<PublisherConfig, PublisherError> {
    load_config_with(root, &|name: &str| std::env::var(name).ok())
}

#[instrument(skip(root, lookup), fields(root = %root.display()))]
pub fn load_config_with<F>(root: &Path, lookup: &F) -> Result<PublisherConfig, PublisherError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = root.join(MANIFEST_FILE);
    if !path.exists() {
        info!("No {} found, starting with an empty configuration", MANIFEST_FILE);
        return Ok(PublisherConfig::default());
    }

    info!(path = %path.display(), "Loading publisher manifest");
    let content = fs::read_to_string(&path)?;
    let mut value: Value = serde_json::from_str(&content)?;

    reject_deprecated_shape(&value)?;
    substitute_env_vars(&mut value, lookup)?;

    let config: PublisherConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}

/// Manifest if present, otherwise every subdirectory of `root` becomes a
/// project holding one package of the same name.
pub fn load_or_scan(root: &Path) -> Result<PublisherConfig, PublisherError> {
    if root.join(MANIFEST_FILE).exists() {
        load_config(root)
    } else {
        scan_directory(root)
    }
}

#[instrument(skip(root), fields(root = %root.display()))]
pub fn scan_directory(root: &Path) -> Result<PublisherConfig, PublisherError> {
    let mut names: Vec<String> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();

    info!(count = names.len(), "Directory-scan mode: projects discovered");

    let projects = names
        .into_iter()
        .map(|name| ProjectDecl {
            packages: vec![PackageDecl {
                name: name.clone(),
                location: Location::Local(PathBuf::from(format!("./{}", name))),
            }],
            name,
            connections: Vec::new(),
        })
        .collect();

    Ok(PublisherConfig {
        frozen: false,
        projects,
    })
}

fn reject_deprecated_shape(value: &Value) -> Result<(), InfrastructureError> {
    let Some(root) = value.as_object() else {
        return Err(InfrastructureError::ConfigError(format!(
            "{} must contain a JSON object",
            MANIFEST_FILE
        )));
    };
    if let Some(Value::Object(_)) = root.get("projects") {
        return Err(InfrastructureError::ConfigFormat(format!(
            "'projects' in {} is a map of name to path; this form is deprecated. \
             Rewrite it as an array: \"projects\": [{{\"name\": \"<project>\", \
             \"packages\": [{{\"name\": \"<package>\", \"location\": \"./<path>\"}}]}}]",
            MANIFEST_FILE
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::domain::connection::ConnectionConfig;
    use anyhow::Result;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn no_env() -> impl Fn(&str) -> Option<String> {
        |_: &str| None
    }

    #[test]
    fn test_missing_manifest_is_empty_config() -> Result<()> {
        let dir = tempdir()?;
        let config = load_config_with(dir.path(), &no_env())?;
        assert_eq!(config, PublisherConfig::default());
        Ok(())
    }

    #[test]
    fn test_deprecated_map_form_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"projects": {"home": "./home"}}"#,
        )?;
        let err = load_config_with(dir.path(), &no_env()).unwrap_err();
        assert!(matches!(
            err,
            PublisherError::Infrastructure(InfrastructureError::ConfigFormat(_))
        ));
        assert!(err.to_string().contains("array"));
        Ok(())
    }

    #[test]
    fn test_load_is_idempotent_and_substitutes() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{
                "frozenConfig": true,
                "projects": [{
                    "name": "home",
                    "packages": [{"name": "faa", "location": "./faa"}],
                    "connections": [{
                        "name": "pg",
                        "type": "postgres",
                        "postgresConnection": {"host": "${PG_HOST:-localhost}", "password": "${PG_PASSWORD}"}
                    }]
                }]
            }"#,
        )?;
        let vars: HashMap<&str, &str> = HashMap::from([("PG_PASSWORD", "s3cret")]);
        let lookup = |name: &str| vars.get(name).map(|v| v.to_string());

        let first = load_config_with(dir.path(), &lookup)?;
        let second = load_config_with(dir.path(), &lookup)?;
        assert_eq!(first, second);
        assert!(first.frozen);

        let ConnectionConfig::Postgres { config } = &first.projects[0].connections[0].config else {
            panic!("expected postgres");
        };
        assert_eq!(config.host.as_deref(), Some("localhost"));
        assert_eq!(config.password.as_ref().map(|p| p.expose()), Some("s3cret"));
        Ok(())
    }

    #[test]
    fn test_unset_variable_fails_load() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"projects": [{"name": "${PROJECT_NAME}"}]}"#,
        )?;
        let err = load_config_with(dir.path(), &no_env()).unwrap_err();
        assert!(err.to_string().contains("PROJECT_NAME"));
        Ok(())
    }

    #[test]
    fn test_directory_scan_fallback() -> Result<()> {
        let dir = tempdir()?;
        fs::create_dir(dir.path().join("faa"))?;
        fs::create_dir(dir.path().join("ecommerce"))?;
        fs::create_dir(dir.path().join(".git"))?;
        fs::write(dir.path().join("README.md"), "x")?;

        let config = load_or_scan(dir.path())?;
        let names: Vec<_> = config.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["ecommerce", "faa"]);
        assert_eq!(
            config.projects[1].packages[0].location,
            Location::Local(PathBuf::from("./faa"))
        );
        Ok(())
    }
}
