// publisher-core/src/application/package.rs

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::domain::connection::{ApiConnection, ConnectionDecl};
use crate::domain::error::DomainError;
use crate::domain::model::{CompiledModel, Database, ModelStatus, ModelSummary, ModelType};
use crate::error::PublisherError;
use crate::infrastructure::adapters::DuckDbConnection;
use crate::infrastructure::connection::{create_project_connections, default_package_connection};
use crate::infrastructure::fs;
use crate::ports::compiler::{CompileRequest, ModelCompiler};
use crate::ports::connection::{ConnectionMap, LiveConnection};

/// Marks a directory as a package.
pub const PACKAGE_MANIFEST: &str = "publisher.json";

const DATABASE_EXTENSIONS: [&str; 2] = ["parquet", "csv"];

/// `publisher.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub connections: Vec<ConnectionDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub models: usize,
    pub databases: usize,
}

// --- MODEL CACHE ---

type SharedCompile = Shared<BoxFuture<'static, Result<Arc<CompiledModel>, PublisherError>>>;

enum ModelState {
    Unloaded,
    Compiling(SharedCompile),
    Ready(Arc<CompiledModel>),
    Failed(PublisherError),
}

struct ModelEntry {
    model_type: ModelType,
    state: ModelState,
}

/// Entries are reset whenever the connection map changes; `epoch` keeps a
/// compile started before the reset from landing after it.
struct ModelCache {
    epoch: u64,
    entries: BTreeMap<String, ModelEntry>,
}

/// Connections as seen from inside a package.
struct Bindings {
    merged: ConnectionMap,
    project_api: Vec<ApiConnection>,
}

pub struct Package {
    name: String,
    root: PathBuf,
    manifest: PackageManifest,
    compiler: Arc<dyn ModelCompiler>,
    default_connection: Arc<dyn LiveConnection>,
    own_connections: ConnectionMap,
    own_api: Vec<ApiConnection>,
    bindings: RwLock<Bindings>,
    models: Mutex<ModelCache>,
    databases: Vec<Database>,
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("root", &self.root)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Package {
    /// Loads a materialized package directory. A missing `publisher.json` is a
    /// terminal `PackageNotFound`.
    #[instrument(skip(root, project_connections, project_api, compiler, credentials_dir), fields(root = %root.display()))]
    pub async fn load(
        name: &str,
        root: PathBuf,
        project_connections: &ConnectionMap,
        project_api: &[ApiConnection],
        compiler: Arc<dyn ModelCompiler>,
        credentials_dir: &Path,
    ) -> Result<Arc<Package>, PublisherError> {
        let manifest = read_manifest(name, &root).await?;

        let own = create_project_connections(&manifest.connections, &root, credentials_dir).await?;
        let default_connection = default_package_connection(&root).await?;

        let scan_root = root.clone();
        let (models, databases) = fs::blocking(move || {
            let models = scan_models(&scan_root);
            let databases = scan_databases(&scan_root);
            Ok((models, databases))
        })
        .await?;

        info!(models = models.len(), databases = databases.len(), "Package loaded");

        let package = Package {
            name: name.to_string(),
            root,
            manifest,
            compiler,
            default_connection,
            own_connections: own.connections,
            own_api: own.api_connections,
            bindings: RwLock::new(Bindings {
                merged: ConnectionMap::new(),
                project_api: Vec::new(),
            }),
            models: Mutex::new(ModelCache {
                epoch: 0,
                entries: models
                    .into_iter()
                    .map(|(path, model_type)| {
                        (
                            path,
                            ModelEntry {
                                model_type,
                                state: ModelState::Unloaded,
                            },
                        )
                    })
                    .collect(),
            }),
            databases,
        };
        package.rebind_connections(project_connections, project_api);
        Ok(Arc::new(package))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    /// Package connections over project connections, plus the default
    /// `duckdb` engine.
    pub fn connections(&self) -> ConnectionMap {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .merged
            .clone()
    }

    /// Project connections not shadowed by the package, then the package's own.
    pub fn list_api_connections(&self) -> Vec<ApiConnection> {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        bindings
            .project_api
            .iter()
            .filter(|c| !self.own_connections.contains_key(&c.name))
            .chain(self.own_api.iter())
            .cloned()
            .collect()
    }

    /// Swaps in a new project connection map and drops every cached model.
    pub fn rebind_connections(&self, project_connections: &ConnectionMap, project_api: &[ApiConnection]) {
        let mut merged = project_connections.clone();
        merged.insert(
            self.default_connection.name().to_string(),
            self.default_connection.clone(),
        );
        for (name, conn) in &self.own_connections {
            if merged.insert(name.clone(), conn.clone()).is_some() {
                info!(package = %self.name, connection = %name, "Package connection overrides project connection");
            }
        }

        {
            let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);
            bindings.merged = merged;
            bindings.project_api = project_api.to_vec();
        }

        let mut cache = lock(&self.models);
        cache.epoch += 1;
        for entry in cache.entries.values_mut() {
            entry.state = ModelState::Unloaded;
        }
    }

    pub fn list_models(&self) -> Vec<ModelSummary> {
        let cache = lock(&self.models);
        cache
            .entries
            .iter()
            .map(|(path, entry)| {
                let (status, error) = match &entry.state {
                    ModelState::Unloaded => (ModelStatus::Unloaded, None),
                    ModelState::Compiling(_) => (ModelStatus::Compiling, None),
                    ModelState::Ready(_) => (ModelStatus::Ready, None),
                    ModelState::Failed(e) => (ModelStatus::Failed, Some(e.to_string())),
                };
                ModelSummary {
                    package_name: self.name.clone(),
                    path: path.clone(),
                    model_type: entry.model_type,
                    status,
                    error,
                }
            })
            .collect()
    }

    /// Compiles on first access. Concurrent callers share one compilation;
    /// failures are cached until the connections change.
    pub async fn get_model(&self, path: &str) -> Result<Arc<CompiledModel>, PublisherError> {
        let (compile, epoch) = {
            let mut cache = lock(&self.models);
            let epoch = cache.epoch;
            let entry = cache
                .entries
                .get_mut(path)
                .ok_or_else(|| DomainError::ModelNotFound {
                    package: self.name.clone(),
                    path: path.to_string(),
                })?;

            if let ModelState::Unloaded = entry.state {
                entry.state = ModelState::Compiling(self.start_compile(path, entry.model_type));
            }
            match &entry.state {
                ModelState::Ready(model) => return Ok(model.clone()),
                ModelState::Failed(e) => return Err(e.clone()),
                ModelState::Compiling(compile) => (compile.clone(), epoch),
                ModelState::Unloaded => {
                    return Err(PublisherError::InternalError(format!(
                        "model '{}' was not scheduled for compilation",
                        path
                    )));
                }
            }
        };

        let result = compile.await;

        let mut cache = lock(&self.models);
        if cache.epoch == epoch {
            if let Some(entry) = cache.entries.get_mut(path) {
                if matches!(entry.state, ModelState::Compiling(_)) {
                    entry.state = match &result {
                        Ok(model) => ModelState::Ready(model.clone()),
                        Err(e) => {
                            warn!(package = %self.name, model = %path, error = %e, "Model failed to compile");
                            ModelState::Failed(e.clone())
                        }
                    };
                }
            }
        }
        result
    }

    fn start_compile(&self, path: &str, model_type: ModelType) -> SharedCompile {
        let request = CompileRequest {
            package_name: self.name.clone(),
            package_root: self.root.clone(),
            model_path: path.to_string(),
            model_type,
            connections: self.connections(),
        };
        let compiler = self.compiler.clone();
        debug!(package = %self.name, model = %path, "Compiling model");
        async move { compiler.compile(request).await.map(Arc::new) }
            .boxed()
            .shared()
    }

    pub fn list_databases(&self) -> Vec<Database> {
        self.databases.clone()
    }

    pub fn info(&self) -> PackageInfo {
        PackageInfo {
            name: self.name.clone(),
            description: self.manifest.description.clone(),
            models: lock(&self.models).entries.len(),
            databases: self.databases.len(),
        }
    }
}

async fn read_manifest(name: &str, root: &Path) -> Result<PackageManifest, PublisherError> {
    let path = root.join(PACKAGE_MANIFEST);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(DomainError::PackageNotFound(format!(
            "package '{}' has no {} at {}",
            name,
            PACKAGE_MANIFEST,
            root.display()
        ))
        .into()),
        Err(e) => Err(e.into()),
    }
}

// --- DIRECTORY SCANS ---

fn visible_files(root: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
}

/// Relative path with '/' separators.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn scan_models(root: &Path) -> Vec<(String, ModelType)> {
    visible_files(root)
        .filter_map(|entry| {
            let model_type = ModelType::from_path(entry.path())?;
            Some((relative_path(root, entry.path())?, model_type))
        })
        .collect()
}

/// Embedded data files. Row counts and schemas are best effort.
fn scan_databases(root: &Path) -> Vec<Database> {
    let probe = match DuckDbConnection::in_memory("probe") {
        Ok(probe) => Some(probe),
        Err(e) => {
            warn!(error = %e, "Could not open probe engine, database details skipped");
            None
        }
    };

    visible_files(root)
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| DATABASE_EXTENSIONS.contains(&ext))
        })
        .filter_map(|entry| {
            let path = relative_path(root, entry.path())?;
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or_default();
            let info = probe.as_ref().and_then(|probe| match probe.describe_file(entry.path()) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!(database = %path, error = %e, "Could not describe database file");
                    None
                }
            });
            Some(Database {
                path,
                size_bytes,
                info,
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::infrastructure::compiler::OutlineCompiler;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Counts compilations; fails any model whose path contains "broken".
    #[derive(Default)]
    struct CountingCompiler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelCompiler for CountingCompiler {
        async fn compile(&self, request: CompileRequest) -> Result<CompiledModel, PublisherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if request.model_path.contains("broken") {
                return Err(DomainError::ModelCompilation {
                    path: request.model_path,
                    message: "syntax error".into(),
                }
                .into());
            }
            Ok(CompiledModel {
                path: request.model_path,
                model_type: request.model_type,
                sources: vec![],
                queries: vec![],
                imports: vec![],
                connections: request.connections.keys().cloned().collect(),
            })
        }
    }

    fn write_package(root: &Path) -> Result<()> {
        std::fs::create_dir_all(root.join("models"))?;
        std::fs::create_dir_all(root.join(".hidden"))?;
        std::fs::create_dir_all(root.join("data"))?;
        std::fs::write(root.join(PACKAGE_MANIFEST), r#"{"name": "faa", "description": "Flights"}"#)?;
        std::fs::write(root.join("models/flights.malloy"), "source: flights is duckdb.table('data/flights.csv')")?;
        std::fs::write(root.join("models/broken.malloy"), "source: ???")?;
        std::fs::write(root.join("intro.malloynb"), ">>>malloy\nsource: x is duckdb.sql('select 1')")?;
        std::fs::write(root.join(".hidden/skip.malloy"), "")?;
        std::fs::write(root.join("data/flights.csv"), "carrier,distance\nAA,100\nUA,250\n")?;
        Ok(())
    }

    async fn load(root: &Path, compiler: Arc<dyn ModelCompiler>) -> Result<Arc<Package>> {
        Ok(Package::load("faa", root.to_path_buf(), &ConnectionMap::new(), &[], compiler, root).await?)
    }

    #[tokio::test]
    async fn test_missing_manifest_is_package_not_found() -> Result<()> {
        let dir = tempdir()?;
        let err = Package::load(
            "faa",
            dir.path().to_path_buf(),
            &ConnectionMap::new(),
            &[],
            Arc::new(OutlineCompiler),
            dir.path(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::PackageNotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_scans_models_and_databases() -> Result<()> {
        let dir = tempdir()?;
        write_package(dir.path())?;
        let package = load(dir.path(), Arc::new(OutlineCompiler)).await?;

        let paths: Vec<String> = package.list_models().into_iter().map(|m| m.path).collect();
        assert_eq!(paths, ["intro.malloynb", "models/broken.malloy", "models/flights.malloy"]);

        let databases = package.list_databases();
        assert_eq!(databases.len(), 1);
        assert_eq!(databases[0].path, "data/flights.csv");
        assert_eq!(databases[0].info.as_ref().map(|i| i.row_count), Some(2));

        assert_eq!(package.connections().keys().collect::<Vec<_>>(), ["duckdb"]);
        assert_eq!(package.info().description.as_deref(), Some("Flights"));
        Ok(())
    }

    #[tokio::test]
    async fn test_model_cache_states() -> Result<()> {
        let dir = tempdir()?;
        write_package(dir.path())?;
        let compiler = Arc::new(CountingCompiler::default());
        let package = load(dir.path(), compiler.clone()).await?;

        let (a, b) = tokio::join!(
            package.get_model("models/flights.malloy"),
            package.get_model("models/flights.malloy")
        );
        assert!(Arc::ptr_eq(&a?, &b?));
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);

        assert!(package.get_model("models/broken.malloy").await.is_err());
        assert!(package.get_model("models/broken.malloy").await.is_err());
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 2);

        let statuses: BTreeMap<String, ModelStatus> = package
            .list_models()
            .into_iter()
            .map(|m| (m.path, m.status))
            .collect();
        assert_eq!(statuses["models/flights.malloy"], ModelStatus::Ready);
        assert_eq!(statuses["models/broken.malloy"], ModelStatus::Failed);
        assert_eq!(statuses["intro.malloynb"], ModelStatus::Unloaded);

        // New connections invalidate the cache, failures included.
        package.rebind_connections(&ConnectionMap::new(), &[]);
        assert!(package.list_models().iter().all(|m| m.status == ModelStatus::Unloaded));
        assert!(package.get_model("models/broken.malloy").await.is_err());
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_model_path() -> Result<()> {
        let dir = tempdir()?;
        write_package(dir.path())?;
        let package = load(dir.path(), Arc::new(OutlineCompiler)).await?;
        let err = package.get_model("nope.malloy").await.unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }
}
