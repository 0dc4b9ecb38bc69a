// publisher-core/src/application/store.rs

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use serde::Serialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{info, instrument, warn};

use crate::application::project::{Project, ProjectContext};
use crate::domain::config::ProjectDecl;
use crate::domain::connection::ConnectionDecl;
use crate::domain::error::DomainError;
use crate::error::PublisherError;
use crate::infrastructure::acquisition::{PackageAcquirer, SubpathPolicy};
use crate::infrastructure::adapters::{CloudStoreResolver, GitCli};
use crate::infrastructure::compiler::OutlineCompiler;
use crate::infrastructure::config::load_or_scan;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs;
use crate::ports::compiler::ModelCompiler;
use crate::ports::source::{GitClient, ObjectStoreResolver};

const SCRATCH_DIR_NAME: &str = "publisher";

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Directory holding `publisher.config.json` (or the project
    /// directories in scan mode). Relative package locations resolve here.
    pub server_root: PathBuf,
    /// Process-local working directory, cleared on `initialize`.
    pub scratch_dir: PathBuf,
    pub subpath_policy: SubpathPolicy,
}

impl StoreOptions {
    pub fn new(server_root: impl Into<PathBuf>) -> Self {
        Self {
            server_root: server_root.into(),
            scratch_dir: std::env::temp_dir().join(SCRATCH_DIR_NAME),
            subpath_policy: SubpathPolicy::default(),
        }
    }

    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    pub fn with_subpath_policy(mut self, policy: SubpathPolicy) -> Self {
        self.subpath_policy = policy;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub name: String,
    pub status: ProjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
}

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<Project>, PublisherError>>>;

enum ProjectSlot {
    Ready {
        project: Arc<Project>,
        loaded_at: DateTime<Utc>,
    },
    /// Failure recorded during `initialize`, re-surfaced on access.
    Failed(PublisherError),
}

#[derive(Default)]
struct StoreState {
    projects: HashMap<String, ProjectSlot>,
    /// At most one load per project name.
    inflight: HashMap<String, SharedLoad>,
}

enum LoadJob {
    Create(ProjectDecl),
    Update(Arc<Project>, ProjectDecl),
    /// Re-read the manifest and rebuild the named project from it.
    FromManifest,
}

pub struct ProjectStore {
    options: StoreOptions,
    context: ProjectContext,
    state: Arc<Mutex<StoreState>>,
}

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProjectStore {
    /// A store using the system `git`, cloud object stores configured from
    /// the environment, and the outline compiler.
    pub fn new(options: StoreOptions) -> Self {
        Self::with_components(
            options,
            Arc::new(GitCli),
            Arc::new(CloudStoreResolver),
            Arc::new(OutlineCompiler),
        )
    }

    pub fn with_components(
        options: StoreOptions,
        git: Arc<dyn GitClient>,
        stores: Arc<dyn ObjectStoreResolver>,
        compiler: Arc<dyn ModelCompiler>,
    ) -> Self {
        let acquirer = PackageAcquirer::new(
            git,
            stores,
            options.server_root.clone(),
            options.subpath_policy,
        );
        let context = ProjectContext {
            acquirer: Arc::new(acquirer),
            compiler,
            packages_root: options.scratch_dir.join("projects"),
            credentials_root: options.scratch_dir.join("credentials"),
            frozen: Arc::new(OnceLock::new()),
        };
        Self {
            options,
            context,
            state: Arc::new(Mutex::new(StoreState::default())),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Fixed by the first `initialize`; later manifest changes do not affect it.
    pub fn is_frozen(&self) -> bool {
        self.context.frozen.get().copied().unwrap_or(false)
    }

    fn ensure_mutable(&self) -> Result<(), PublisherError> {
        if self.is_frozen() {
            return Err(DomainError::FrozenConfig.into());
        }
        Ok(())
    }

    // --- LIFECYCLE ---

    /// Reads the manifest, resets the scratch directory and loads every
    /// project concurrently. A failing project is recorded, not fatal.
    #[instrument(skip(self), fields(root = %self.options.server_root.display()))]
    pub async fn initialize(&self) -> Result<(), PublisherError> {
        let config = load_or_scan(&self.options.server_root)?;
        let frozen = *self.context.frozen.get_or_init(|| config.frozen);

        let scratch = self.options.scratch_dir.clone();
        match fs::blocking(move || fs::reset_dir(&scratch).map_err(Into::into)).await {
            Ok(()) => {}
            Err(PublisherError::Infrastructure(InfrastructureError::Io(e)))
                if e.kind() == ErrorKind::PermissionDenied =>
            {
                warn!(path = %self.options.scratch_dir.display(), error = %e, "Could not reset scratch directory");
            }
            Err(e) => return Err(e),
        }

        let loads: Vec<SharedLoad> = {
            let mut state = lock(&self.state);
            config
                .projects
                .into_iter()
                .map(|decl| {
                    let name = decl.name.clone();
                    self.start_load(&mut state, name, LoadJob::Create(decl), true)
                })
                .collect()
        };

        let results = join_all(loads).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            ready = results.len() - failed,
            failed,
            frozen,
            "Store initialized"
        );
        Ok(())
    }

    /// Registers `job` as the in-flight load for `name`, or joins the one
    /// already running. Must be called with the state lock held.
    fn start_load(
        &self,
        state: &mut StoreState,
        name: String,
        job: LoadJob,
        record_failure: bool,
    ) -> SharedLoad {
        if let Some(existing) = state.inflight.get(&name) {
            return existing.clone();
        }

        let registry = self.state.clone();
        let context = self.context.clone();
        let server_root = self.options.server_root.clone();
        let key = name.clone();

        let load = async move {
            let result = match job {
                LoadJob::Create(decl) => Project::create(decl, context).await,
                LoadJob::Update(project, decl) => project.apply_declaration(decl).await.map(|()| project),
                LoadJob::FromManifest => match load_or_scan(&server_root) {
                    Ok(config) => match config.project(&key) {
                        Some(decl) => Project::create(decl.clone(), context).await,
                        None => Err(DomainError::ProjectNotFound(key.clone()).into()),
                    },
                    Err(e) => Err(e),
                },
            };

            // Publish before leaving the in-flight table so no reader sees neither.
            let mut state = lock(&registry);
            match &result {
                Ok(project) => {
                    state.projects.insert(
                        key.clone(),
                        ProjectSlot::Ready {
                            project: project.clone(),
                            loaded_at: Utc::now(),
                        },
                    );
                }
                Err(e) if record_failure => {
                    warn!(project = %key, error = %e, "Project failed to load");
                    state.projects.insert(key.clone(), ProjectSlot::Failed(e.clone()));
                }
                Err(_) => {}
            }
            state.inflight.remove(&key);
            result
        }
        .boxed()
        .shared();

        state.inflight.insert(name, load.clone());
        load
    }

    // --- READS ---

    pub fn list_projects(&self) -> Vec<ProjectSummary> {
        let state = lock(&self.state);
        let mut summaries: Vec<ProjectSummary> = state
            .projects
            .iter()
            .filter(|(name, _)| !state.inflight.contains_key(*name))
            .map(|(name, slot)| match slot {
                ProjectSlot::Ready { loaded_at, .. } => ProjectSummary {
                    name: name.clone(),
                    status: ProjectStatus::Ready,
                    error: None,
                    loaded_at: Some(*loaded_at),
                },
                ProjectSlot::Failed(e) => ProjectSummary {
                    name: name.clone(),
                    status: ProjectStatus::Failed,
                    error: Some(e.to_string()),
                    loaded_at: None,
                },
            })
            .collect();
        summaries.extend(state.inflight.keys().map(|name| ProjectSummary {
            name: name.clone(),
            status: ProjectStatus::Loading,
            error: None,
            loaded_at: None,
        }));
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Cached project unless `reload`; otherwise (or when absent) rebuilt from
    /// the manifest. Concurrent callers share one load.
    pub async fn get_project(
        &self,
        name: &str,
        reload: bool,
    ) -> Result<Arc<Project>, PublisherError> {
        let load = {
            let mut state = lock(&self.state);
            if !reload {
                match state.projects.get(name) {
                    Some(ProjectSlot::Ready { project, .. }) => return Ok(project.clone()),
                    Some(ProjectSlot::Failed(e)) => return Err(e.clone()),
                    None => {}
                }
            }
            self.start_load(&mut state, name.to_string(), LoadJob::FromManifest, false)
        };
        load.await
    }

    // --- MUTATIONS ---

    /// Adds a project, or updates it in place if one of that name exists.
    pub async fn add_project(
        &self,
        decl: ProjectDecl,
        skip_frozen_check: bool,
    ) -> Result<Arc<Project>, PublisherError> {
        if !skip_frozen_check {
            self.ensure_mutable()?;
        }
        decl.validate()?;

        loop {
            let load = {
                let mut state = lock(&self.state);
                if let Some(running) = state.inflight.get(&decl.name) {
                    Err(running.clone())
                } else {
                    let job = match state.projects.get(&decl.name) {
                        Some(ProjectSlot::Ready { project, .. }) => {
                            LoadJob::Update(project.clone(), decl.clone())
                        }
                        _ => LoadJob::Create(decl.clone()),
                    };
                    Ok(self.start_load(&mut state, decl.name.clone(), job, false))
                }
            };

            match load {
                Ok(load) => return load.await,
                // Let the running load settle, then apply ours on top.
                Err(running) => {
                    let _ = running.await;
                }
            }
        }
    }

    pub async fn update_project(&self, decl: ProjectDecl) -> Result<Arc<Project>, PublisherError> {
        self.ensure_mutable()?;
        let known = {
            let state = lock(&self.state);
            state.inflight.contains_key(&decl.name)
                || matches!(state.projects.get(&decl.name), Some(ProjectSlot::Ready { .. }))
        };
        if !known {
            return Err(DomainError::ProjectNotFound(decl.name.clone()).into());
        }
        self.add_project(decl, false).await
    }

    /// Forgets the project. Materialized files stay on disk. Refused while a
    /// load is in flight, since its completion would register the project again.
    pub fn delete_project(&self, name: &str) -> Result<(), PublisherError> {
        self.ensure_mutable()?;
        let mut state = lock(&self.state);
        if state.inflight.contains_key(name) {
            return Err(DomainError::ProjectLoading(name.to_string()).into());
        }
        match state.projects.remove(name) {
            Some(_) => {
                info!(project = %name, "Project removed from registry");
                Ok(())
            }
            None => Err(DomainError::ProjectNotFound(name.to_string()).into()),
        }
    }

    pub async fn add_connection(
        &self,
        project: &str,
        decl: ConnectionDecl,
    ) -> Result<(), PublisherError> {
        self.ensure_mutable()?;
        self.get_project(project, false).await?.add_connection(decl).await
    }

    pub async fn update_connection(
        &self,
        project: &str,
        name: &str,
        decl: ConnectionDecl,
    ) -> Result<(), PublisherError> {
        self.ensure_mutable()?;
        self.get_project(project, false)
            .await?
            .update_connection(name, decl)
            .await
    }

    pub async fn delete_connection(&self, project: &str, name: &str) -> Result<(), PublisherError> {
        self.ensure_mutable()?;
        self.get_project(project, false)
            .await?
            .delete_connection(name)
            .await
    }

    pub async fn update_connections(
        &self,
        project: &str,
        decls: Vec<ConnectionDecl>,
    ) -> Result<(), PublisherError> {
        self.ensure_mutable()?;
        self.get_project(project, false)
            .await?
            .update_connections(decls)
            .await
    }
}
