// publisher-core/src/infrastructure/error.rs

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum DatabaseError {
    #[error("DuckDB Engine Error: {0}")]
    #[diagnostic(
        code(publisher::infra::database::duckdb),
        help("An error occurred inside the embedded SQL engine.")
    )]
    DuckDB(Arc<duckdb::Error>),
}

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum InfrastructureError {
    // --- DATABASE ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DatabaseError),

    /// Live connection failure. Displays the driver message untouched.
    #[error("{0}")]
    #[diagnostic(code(publisher::infra::connection))]
    Connection(String),

    // --- FILESYSTEM ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(publisher::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(Arc<std::io::Error>),

    // --- CONFIG / JSON ---
    #[error("JSON Parsing Error: {0}")]
    #[diagnostic(code(publisher::infra::json))]
    Json(Arc<serde_json::Error>),

    #[error("Configuration Error: {0}")]
    #[diagnostic(code(publisher::infra::config))]
    ConfigError(String),

    #[error("Unsupported configuration format: {0}")]
    #[diagnostic(
        code(publisher::infra::config_format),
        help("Migrate 'projects' to an array: [{{\"name\": ..., \"packages\": [...]}}].")
    )]
    ConfigFormat(String),

    #[error("Environment variable '{0}' is not set and no default was provided")]
    #[diagnostic(
        code(publisher::infra::env_var),
        help("Export the variable or use the ${{NAME:-default}} form.")
    )]
    MissingEnvVar(String),

    // --- REMOTE SOURCES ---
    #[error("Git Error: {0}")]
    #[diagnostic(code(publisher::infra::git))]
    Git(String),

    #[error("Object Store Error: {0}")]
    #[diagnostic(code(publisher::infra::object_store))]
    ObjectStore(Arc<object_store::Error>),

    #[error("Archive Error: {0}")]
    #[diagnostic(code(publisher::infra::archive))]
    Archive(String),
}

impl From<duckdb::Error> for InfrastructureError {
    fn from(err: duckdb::Error) -> Self {
        InfrastructureError::Database(DatabaseError::DuckDB(Arc::new(err)))
    }
}

impl From<std::io::Error> for InfrastructureError {
    fn from(err: std::io::Error) -> Self {
        InfrastructureError::Io(Arc::new(err))
    }
}
