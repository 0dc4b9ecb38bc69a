// publisher-core/src/infrastructure/adapters/duckdb.rs

use async_trait::async_trait;
use duckdb::{Config, Connection};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::domain::connection::ConnectionKind;
use crate::domain::model::{ColumnInfo, TableInfo};
use crate::error::PublisherError;
use crate::infrastructure::connection::attach::AttachStep;
use crate::infrastructure::connection::sql::quote_literal;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::atomic_write;
use crate::ports::connection::LiveConnection;

/// In-process DuckDB engine. One per embedded connection; attachments are
/// registered on the same handle.
pub struct DuckDbConnection {
    name: String,
    conn: Arc<Mutex<Connection>>,
    attached: Vec<String>,
}

impl DuckDbConnection {
    pub fn in_memory(name: &str) -> Result<Self, InfrastructureError> {
        let conn = Connection::open_in_memory_with_flags(Config::default())?;
        Ok(Self {
            name: name.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            attached: Vec::new(),
        })
    }

    /// An engine whose relative file paths resolve against `root`.
    pub fn rooted_at(name: &str, root: &Path) -> Result<Self, InfrastructureError> {
        let engine = Self::in_memory(name)?;
        let root = root.to_string_lossy();
        engine.execute_batch(&format!("SET file_search_path = {}", quote_literal(&root)?))?;
        Ok(engine)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, InfrastructureError> {
        self.conn
            .lock()
            .map_err(|_| InfrastructureError::from(std::io::Error::other("DuckDB Mutex Poisoned")))
    }

    pub fn execute_batch(&self, sql: &str) -> Result<(), InfrastructureError> {
        let conn = self.lock()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn query_scalar(&self, sql: &str) -> Result<i64, InfrastructureError> {
        let conn = self.lock()?;
        let value: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(value)
    }

    /// Registers one attachment: writes its key file (if any), loads the
    /// extension and runs the planned statements.
    pub fn attach(&mut self, step: &AttachStep) -> Result<(), InfrastructureError> {
        if let Some(file) = &step.credential_file {
            if let Some(parent) = file.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            atomic_write(&file.path, file.contents.expose())?;
        }

        {
            let conn = self.lock()?;
            conn.execute_batch(step.extension.install_sql())
                .map_err(|e| attach_error(&step.name, &e))?;
            for statement in step.statements() {
                conn.execute_batch(statement)
                    .map_err(|e| attach_error(&step.name, &e))?;
            }
        }

        debug!(connection = %self.name, attachment = %step.name, extension = step.extension.name(), "Attached database");
        self.attached.push(step.name.clone());
        Ok(())
    }

    /// Row count and column schema of a parquet or CSV file.
    pub fn describe_file(&self, path: &Path) -> Result<TableInfo, InfrastructureError> {
        let reader = match path.extension().and_then(|e| e.to_str()) {
            Some("parquet") => "read_parquet",
            Some("csv") => "read_csv_auto",
            _ => {
                return Err(InfrastructureError::ConfigError(format!(
                    "unsupported database file: {}",
                    path.display()
                )));
            }
        };
        let source = format!("{}({})", reader, quote_literal(&path.to_string_lossy())?);

        let conn = self.lock()?;
        let row_count: i64 =
            conn.query_row(&format!("SELECT count(*) FROM {}", source), [], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!("DESCRIBE SELECT * FROM {}", source))?;
        let rows = stmt.query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get("column_name")?,
                data_type: row.get("column_type")?,
            })
        })?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(row?);
        }

        Ok(TableInfo {
            row_count: u64::try_from(row_count).unwrap_or_default(),
            columns,
        })
    }
}

// Engine errors can quote the failing statement on later lines; keep the
// first line only so secret bodies never reach the caller.
fn attach_error(attachment: &str, err: &duckdb::Error) -> InfrastructureError {
    let message = err.to_string();
    let first_line = message.lines().next().unwrap_or_default();
    InfrastructureError::Connection(format!(
        "failed to attach '{}': {}",
        attachment, first_line
    ))
}

impl fmt::Debug for DuckDbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuckDbConnection")
            .field("name", &self.name)
            .field("attached", &self.attached)
            .finish()
    }
}

#[async_trait]
impl LiveConnection for DuckDbConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Duckdb
    }

    async fn test(&self) -> Result<(), PublisherError> {
        let value = self.query_scalar("SELECT 1")?;
        if value != 1 {
            return Err(PublisherError::InternalError(format!(
                "DuckDB returned {} for SELECT 1",
                value
            )));
        }
        Ok(())
    }

    fn attached_databases(&self) -> Vec<String> {
        self.attached.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_duckdb_round_trip() -> Result<()> {
        let engine = DuckDbConnection::in_memory("duckdb")?;
        engine.test().await?;
        assert_eq!(engine.kind(), ConnectionKind::Duckdb);
        assert!(engine.attached_databases().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_rooted_engine_reads_relative_files() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("flights.csv"), "carrier,distance\nAA,100\nUA,250\n")?;

        let engine = DuckDbConnection::rooted_at("duckdb", dir.path())?;
        let count = engine.query_scalar("SELECT count(*) FROM 'flights.csv'")?;
        assert_eq!(count, 2);
        Ok(())
    }

    #[test]
    fn test_describe_csv() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("carriers.csv");
        std::fs::write(&path, "code,name\nAA,American\nUA,United\nDL,Delta\n")?;

        let engine = DuckDbConnection::in_memory("probe")?;
        let info = engine.describe_file(&path)?;
        assert_eq!(info.row_count, 3);
        let names: Vec<&str> = info.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["code", "name"]);
        assert_eq!(info.columns[0].data_type, "VARCHAR");
        Ok(())
    }

    #[test]
    fn test_invalid_sql_is_database_error() -> Result<()> {
        let engine = DuckDbConnection::in_memory("duckdb")?;
        let err = engine.execute_batch("SELECT * FROM non_existent_table").unwrap_err();
        assert!(matches!(err, InfrastructureError::Database(_)));
        Ok(())
    }
}
