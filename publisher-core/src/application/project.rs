// publisher-core/src/application/project.rs

use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::{info, instrument};

use crate::application::package::{Package, PackageInfo};
use crate::domain::config::{PackageDecl, ProjectDecl};
use crate::domain::connection::{ApiConnection, ConnectionDecl};
use crate::domain::error::DomainError;
use crate::error::PublisherError;
use crate::infrastructure::acquisition::PackageAcquirer;
use crate::infrastructure::connection::{ProjectConnections, create_project_connections};
use crate::ports::compiler::ModelCompiler;
use crate::ports::connection::ConnectionMap;

const PACKAGE_LOAD_CONCURRENCY: usize = 8;

/// Shared collaborators and directory layout for every project of a store.
#[derive(Clone)]
pub struct ProjectContext {
    pub acquirer: Arc<PackageAcquirer>,
    pub compiler: Arc<dyn ModelCompiler>,
    /// Packages land in `<packages_root>/<project>/<package>`.
    pub packages_root: PathBuf,
    /// Key files land in `<credentials_root>/<project>[/<package>]`.
    pub credentials_root: PathBuf,
    /// Set once by the store's first `initialize`.
    pub frozen: Arc<OnceLock<bool>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub name: String,
    pub packages: Vec<PackageInfo>,
    pub connections: Vec<ApiConnection>,
}

#[derive(Clone)]
struct ProjectState {
    decl: ProjectDecl,
    connections: ProjectConnections,
    packages: BTreeMap<String, Arc<Package>>,
}

pub struct Project {
    name: String,
    root: PathBuf,
    credentials_dir: PathBuf,
    context: ProjectContext,
    /// Serializes updates; readers never wait on it.
    writer: tokio::sync::Mutex<()>,
    state: RwLock<ProjectState>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("root", &self.root)
            .finish()
    }
}

impl Project {
    /// Builds connections, materializes every package, then loads them.
    #[instrument(skip(decl, context), fields(project = %decl.name))]
    pub async fn create(
        decl: ProjectDecl,
        context: ProjectContext,
    ) -> Result<Arc<Project>, PublisherError> {
        decl.validate()?;
        let root = context.packages_root.join(&decl.name);
        let credentials_dir = context.credentials_root.join(&decl.name);

        let connections =
            create_project_connections(&decl.connections, &root, &credentials_dir).await?;
        context.acquirer.materialize(&decl.packages, &root).await?;

        let project = Project {
            name: decl.name.clone(),
            root,
            credentials_dir,
            context,
            writer: tokio::sync::Mutex::new(()),
            state: RwLock::new(ProjectState {
                decl: decl.clone(),
                connections: ProjectConnections::default(),
                packages: BTreeMap::new(),
            }),
        };

        let packages = project.load_packages(&decl.packages, &connections).await?;
        info!(packages = packages.len(), "Project ready");
        project.replace_state(ProjectState {
            decl,
            connections,
            packages,
        });
        Ok(Arc::new(project))
    }

    async fn load_packages(
        &self,
        decls: &[PackageDecl],
        connections: &ProjectConnections,
    ) -> Result<BTreeMap<String, Arc<Package>>, PublisherError> {
        let loads: Vec<_> = decls
            .iter()
            .map(|decl| {
                let credentials_dir = self.credentials_dir.join(&decl.name);
                async move {
                    Package::load(
                        &decl.name,
                        self.root.join(&decl.name),
                        &connections.connections,
                        &connections.api_connections,
                        self.context.compiler.clone(),
                        &credentials_dir,
                    )
                    .await
                }
            })
            .collect();
        let loaded: Vec<Arc<Package>> = futures::stream::iter(loads)
            .buffer_unordered(PACKAGE_LOAD_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(loaded
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect())
    }

    fn snapshot(&self) -> ProjectState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_state(&self, state: ProjectState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    // --- READS ---

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the materialized packages.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn decl(&self) -> ProjectDecl {
        self.snapshot().decl
    }

    pub fn list_packages(&self) -> Vec<Arc<Package>> {
        self.snapshot().packages.into_values().collect()
    }

    pub fn get_package(&self, name: &str) -> Result<Arc<Package>, PublisherError> {
        self.snapshot().packages.remove(name).ok_or_else(|| {
            DomainError::PackageNotFound(format!(
                "package '{}' not found in project '{}'",
                name, self.name
            ))
            .into()
        })
    }

    pub fn connections(&self) -> ConnectionMap {
        self.snapshot().connections.connections
    }

    pub fn list_api_connections(&self) -> Vec<ApiConnection> {
        self.snapshot().connections.api_connections
    }

    pub fn get_api_connection(&self, name: &str) -> Result<ApiConnection, PublisherError> {
        self.list_api_connections()
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| self.connection_not_found(name))
    }

    pub fn to_api(&self) -> ProjectInfo {
        let state = self.snapshot();
        ProjectInfo {
            name: self.name.clone(),
            packages: state.packages.values().map(|p| p.info()).collect(),
            connections: state.connections.api_connections,
        }
    }

    fn connection_not_found(&self, name: &str) -> PublisherError {
        DomainError::ConnectionNotFound {
            project: self.name.clone(),
            connection: name.to_string(),
        }
        .into()
    }

    // --- UPDATES ---

    /// Applies a new declaration. Only new or changed packages are fetched
    /// again; the others keep their state and pick up new connections.
    #[instrument(skip(self, decl), fields(project = %self.name))]
    pub async fn update(&self, decl: ProjectDecl) -> Result<(), PublisherError> {
        self.ensure_mutable()?;
        self.apply_declaration(decl).await
    }

    /// `update` without the frozen check, for loads the store itself starts.
    pub(crate) async fn apply_declaration(&self, decl: ProjectDecl) -> Result<(), PublisherError> {
        decl.validate()?;
        if decl.name != self.name {
            return Err(PublisherError::InternalError(format!(
                "cannot apply declaration of '{}' to project '{}'",
                decl.name, self.name
            )));
        }

        let _writer = self.writer.lock().await;
        let current = self.snapshot();

        let connections_changed = current.decl.connections != decl.connections;
        let connections = if connections_changed {
            create_project_connections(&decl.connections, &self.root, &self.credentials_dir).await?
        } else {
            current.connections.clone()
        };

        let changed: Vec<PackageDecl> = decl
            .packages
            .iter()
            .filter(|p| current.decl.package(&p.name) != Some(*p))
            .cloned()
            .collect();

        self.context.acquirer.materialize(&changed, &self.root).await?;
        let mut fresh = self.load_packages(&changed, &connections).await?;

        let mut packages = BTreeMap::new();
        for package in &decl.packages {
            if let Some(loaded) = fresh.remove(&package.name) {
                packages.insert(package.name.clone(), loaded);
            } else if let Some(existing) = current.packages.get(&package.name) {
                if connections_changed {
                    existing.rebind_connections(&connections.connections, &connections.api_connections);
                }
                packages.insert(package.name.clone(), existing.clone());
            }
        }

        info!(
            reloaded = changed.len(),
            kept = packages.len() - changed.len(),
            connections_changed,
            "Project updated"
        );
        self.replace_state(ProjectState {
            decl,
            connections,
            packages,
        });
        Ok(())
    }

    /// Replaces the project-level connections and rebinds every package.
    pub async fn update_connections(&self, decls: Vec<ConnectionDecl>) -> Result<(), PublisherError> {
        self.ensure_mutable()?;
        let _writer = self.writer.lock().await;
        self.apply_connections(decls).await
    }

    pub async fn add_connection(&self, decl: ConnectionDecl) -> Result<(), PublisherError> {
        self.ensure_mutable()?;
        let _writer = self.writer.lock().await;
        let name = decl.name.clone().ok_or_else(|| DomainError::RequiredField {
            connection: decl.display_name().to_string(),
            field: "name".to_string(),
        })?;

        let mut decls = self.snapshot().decl.connections;
        if decls.iter().any(|d| d.name.as_deref() == Some(name.as_str())) {
            return Err(DomainError::ConnectionNameConflict(name).into());
        }
        decls.push(decl);
        self.apply_connections(decls).await
    }

    /// Replaces the connection called `name`. The declaration keeps that name.
    pub async fn update_connection(
        &self,
        name: &str,
        mut decl: ConnectionDecl,
    ) -> Result<(), PublisherError> {
        self.ensure_mutable()?;
        let _writer = self.writer.lock().await;
        let mut decls = self.snapshot().decl.connections;
        let index = decls
            .iter()
            .position(|d| d.name.as_deref() == Some(name))
            .ok_or_else(|| self.connection_not_found(name))?;
        decl.name = Some(name.to_string());
        decls[index] = decl;
        self.apply_connections(decls).await
    }

    pub async fn delete_connection(&self, name: &str) -> Result<(), PublisherError> {
        self.ensure_mutable()?;
        let _writer = self.writer.lock().await;
        let mut decls = self.snapshot().decl.connections;
        let index = decls
            .iter()
            .position(|d| d.name.as_deref() == Some(name))
            .ok_or_else(|| self.connection_not_found(name))?;
        decls.remove(index);
        self.apply_connections(decls).await
    }

    fn ensure_mutable(&self) -> Result<(), PublisherError> {
        if self.context.frozen.get().copied().unwrap_or(false) {
            return Err(DomainError::FrozenConfig.into());
        }
        Ok(())
    }

    async fn apply_connections(&self, decls: Vec<ConnectionDecl>) -> Result<(), PublisherError> {
        let connections =
            create_project_connections(&decls, &self.root, &self.credentials_dir).await?;

        let mut state = self.snapshot();
        for package in state.packages.values() {
            package.rebind_connections(&connections.connections, &connections.api_connections);
        }
        state.decl.connections = decls;
        state.connections = connections;
        info!(project = %self.name, connections = state.connections.connections.len(), "Connections updated");
        self.replace_state(state);
        Ok(())
    }
}
