// publisher-core/src/domain/config.rs

use serde::{Deserialize, Serialize};

use crate::domain::connection::ConnectionDecl;
use crate::domain::error::DomainError;
use crate::domain::location::Location;
use crate::error::PublisherError;

/// Parsed `publisher.config.json`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherConfig {
    #[serde(rename = "frozenConfig", default)]
    pub frozen: bool,

    #[serde(default)]
    pub projects: Vec<ProjectDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDecl {
    pub name: String,

    #[serde(default)]
    pub packages: Vec<PackageDecl>,

    #[serde(default)]
    pub connections: Vec<ConnectionDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDecl {
    pub name: String,
    pub location: Location,
}

impl PublisherConfig {
    pub fn project(&self, name: &str) -> Option<&ProjectDecl> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn validate(&self) -> Result<(), PublisherError> {
        let mut seen = std::collections::HashSet::new();
        for project in &self.projects {
            if !seen.insert(project.name.as_str()) {
                return Err(DomainError::DuplicateProject(project.name.clone()).into());
            }
            project.validate()?;
        }
        Ok(())
    }
}

impl ProjectDecl {
    /// Names must be unique and usable as a single directory component.
    pub fn validate(&self) -> Result<(), PublisherError> {
        ensure_path_component(&self.name)?;
        let mut seen = std::collections::HashSet::new();
        for package in &self.packages {
            ensure_path_component(&package.name)?;
            if !seen.insert(package.name.as_str()) {
                return Err(DomainError::DuplicatePackage {
                    project: self.name.clone(),
                    package: package.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn package(&self, name: &str) -> Option<&PackageDecl> {
        self.packages.iter().find(|p| p.name == name)
    }
}

/// Zero-Trust guard: project and package names become directory names.
pub fn ensure_path_component(name: &str) -> Result<(), PublisherError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.starts_with('.');
    if bad {
        return Err(PublisherError::UnsafePath(name.to_string()));
    }
    Ok(())
}
