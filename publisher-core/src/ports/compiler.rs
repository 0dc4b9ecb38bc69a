// publisher-core/src/ports/compiler.rs

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::model::{CompiledModel, ModelType};
use crate::error::PublisherError;
use crate::ports::connection::ConnectionMap;

pub struct CompileRequest {
    pub package_name: String,
    pub package_root: PathBuf,
    /// Path relative to the package root, using '/' separators.
    pub model_path: String,
    pub model_type: ModelType,
    pub connections: ConnectionMap,
}

/// The semantic-model compiler. Opaque to the store: source text plus a
/// connection map in, compiled model out.
#[async_trait]
pub trait ModelCompiler: Send + Sync {
    async fn compile(&self, request: CompileRequest) -> Result<CompiledModel, PublisherError>;
}
