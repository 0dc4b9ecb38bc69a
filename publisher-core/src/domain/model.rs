// publisher-core/src/domain/model.rs

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MODEL_EXTENSION: &str = "malloy";
pub const NOTEBOOK_EXTENSION: &str = "malloynb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Model,
    Notebook,
}

impl ModelType {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(MODEL_EXTENSION) => Some(ModelType::Model),
            Some(NOTEBOOK_EXTENSION) => Some(ModelType::Notebook),
            _ => None,
        }
    }
}

/// Output of the semantic compiler for one model file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledModel {
    pub path: String,
    pub model_type: ModelType,
    pub sources: Vec<String>,
    pub queries: Vec<String>,
    pub imports: Vec<String>,
    pub connections: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Unloaded,
    Compiling,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub package_name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    pub status: ModelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- Embedded databases ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub path: String,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<TableInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub row_count: u64,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}
