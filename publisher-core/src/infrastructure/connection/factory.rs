// publisher-core/src/infrastructure/connection/factory.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::connection::{ApiConnection, ConnectionConfig, ConnectionDecl, EMBEDDED_ENGINE_NAME};
use crate::error::PublisherError;
use crate::infrastructure::adapters::{DuckDbConnection, RemoteConnection};
use crate::infrastructure::connection::attach::plan_attachment;
use crate::infrastructure::connection::validate::{ValidatedConnection, validate_connections};
use crate::infrastructure::fs;
use crate::ports::connection::{ConnectionMap, LiveConnection};

/// Live connections of one scope (project or package) plus their public shape.
#[derive(Debug, Default, Clone)]
pub struct ProjectConnections {
    pub connections: ConnectionMap,
    pub api_connections: Vec<ApiConnection>,
}

/// Validates every declaration, then builds embedded engines first and remote
/// connections after. Embedded engines resolve relative paths against
/// `root_dir`; key files land under `scratch_dir`, one directory per connection.
#[instrument(skip(decls), fields(count = decls.len()))]
pub async fn create_project_connections(
    decls: &[ConnectionDecl],
    root_dir: &Path,
    scratch_dir: &Path,
) -> Result<ProjectConnections, PublisherError> {
    let validated = validate_connections(decls)?;

    let api_connections = validated
        .iter()
        .map(|c| ApiConnection::from_decl(&c.name, &c.config))
        .collect();

    let (embedded, remote): (Vec<_>, Vec<_>) = validated
        .into_iter()
        .partition(|c| matches!(c.config, ConnectionConfig::Duckdb { .. }));

    let mut connections = ConnectionMap::new();
    for conn in embedded {
        let engine = build_embedded(conn, root_dir, scratch_dir).await?;
        connections.insert(engine.name().to_string(), Arc::new(engine));
    }
    for conn in remote {
        let remote = RemoteConnection::from_config(&conn.name, &conn.config)?;
        connections.insert(conn.name, Arc::new(remote));
    }

    info!(connections = connections.len(), "Built connections");
    Ok(ProjectConnections {
        connections,
        api_connections,
    })
}

async fn build_embedded(
    conn: ValidatedConnection,
    root_dir: &Path,
    scratch_dir: &Path,
) -> Result<DuckDbConnection, PublisherError> {
    let credentials_dir = connection_credentials_dir(scratch_dir, &conn.name);
    let steps = conn
        .attachments()
        .iter()
        .map(|attachment| plan_attachment(attachment, &credentials_dir))
        .collect::<Result<Vec<_>, _>>()?;

    let root: PathBuf = root_dir.to_path_buf();
    fs::blocking(move || {
        let mut engine = DuckDbConnection::rooted_at(&conn.name, &root)?;
        for step in &steps {
            engine.attach(step)?;
        }
        Ok(engine)
    })
    .await
}

/// Attachment names are only unique within one connection, so each embedded
/// connection keeps its key files in its own directory.
fn connection_credentials_dir(scratch_dir: &Path, connection: &str) -> PathBuf {
    scratch_dir.join("credentials").join(connection)
}

/// The `duckdb` connection every package receives, rooted at the package.
pub async fn default_package_connection(
    package_root: &Path,
) -> Result<Arc<dyn LiveConnection>, PublisherError> {
    let root = package_root.to_path_buf();
    let engine =
        fs::blocking(move || DuckDbConnection::rooted_at(EMBEDDED_ENGINE_NAME, &root)).await?;
    Ok(Arc::new(engine))
}
