// publisher-core/src/infrastructure/compiler/outline.rs

// Structural pass over Malloy sources: what a model defines, what it imports
// and which connections it reaches. Enough for the store to list, cache and
// reject broken models; the query engine does the real compilation.

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::OnceLock;

use crate::domain::error::DomainError;
use crate::domain::model::{CompiledModel, ModelType};
use crate::error::PublisherError;
use crate::ports::compiler::{CompileRequest, ModelCompiler};

const MALLOY_CELL: &str = ">>>malloy";
const CELL_MARKER: &str = ">>>";

fn hardcoded(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| Regex::new("$^").unwrap_or_else(|_| unreachable!()))
}

fn re_source() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| hardcoded(r"\bsource\s*:\s*([A-Za-z_][A-Za-z0-9_]*)\s+is\b"))
}

fn re_query() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| hardcoded(r"\bquery\s*:\s*([A-Za-z_][A-Za-z0-9_]*)\s+is\b"))
}

fn re_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        hardcoded(r#"(?m)^\s*import\s+(?:\{[^}]*\}\s+from\s+)?["']([^"']+)["']"#)
    })
}

fn re_connection() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| hardcoded(r"\b([A-Za-z_][A-Za-z0-9_]*)\.(?:table|sql)\s*\("))
}

#[derive(Debug, Default, Clone)]
pub struct OutlineCompiler;

impl OutlineCompiler {
    /// Malloy text of a model, or of the malloy cells of a notebook.
    fn malloy_text(source: &str, model_type: ModelType) -> String {
        let text = match model_type {
            ModelType::Model => source.to_string(),
            ModelType::Notebook => {
                let mut cells = Vec::new();
                let mut in_malloy = false;
                for line in source.lines() {
                    let trimmed = line.trim_start();
                    if trimmed.starts_with(CELL_MARKER) {
                        in_malloy = trimmed.starts_with(MALLOY_CELL);
                        continue;
                    }
                    if in_malloy {
                        cells.push(line);
                    }
                }
                cells.join("\n")
            }
        };

        // Whole-line comments only; `//` also appears inside URLs.
        text.lines()
            .filter(|line| {
                let trimmed = line.trim_start();
                !(trimmed.starts_with("--") || trimmed.starts_with("//"))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn captures(re: &Regex, text: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        re.captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }
}

fn compilation_error(path: &str, message: String) -> PublisherError {
    DomainError::ModelCompilation {
        path: path.to_string(),
        message,
    }
    .into()
}

/// An import must resolve to a file inside the package.
fn import_exists(package_root: &Path, model_path: &str, import: &str) -> bool {
    let model_dir = Path::new(model_path).parent().unwrap_or_else(|| Path::new(""));
    let candidate = package_root.join(model_dir).join(import);
    match (candidate.canonicalize(), package_root.canonicalize()) {
        (Ok(file), Ok(root)) => file.starts_with(root) && file.is_file(),
        _ => false,
    }
}

#[async_trait]
impl ModelCompiler for OutlineCompiler {
    async fn compile(&self, request: CompileRequest) -> Result<CompiledModel, PublisherError> {
        let file = request.package_root.join(&request.model_path);
        let source = match tokio::fs::read_to_string(&file).await {
            Ok(source) => source,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DomainError::ModelNotFound {
                    package: request.package_name.clone(),
                    path: request.model_path.clone(),
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        let text = Self::malloy_text(&source, request.model_type);

        let imports = Self::captures(re_import(), &text);
        if let Some(missing) = imports
            .iter()
            .find(|import| !import_exists(&request.package_root, &request.model_path, import))
        {
            return Err(compilation_error(
                &request.model_path,
                format!("import '{}' not found", missing),
            ));
        }

        let connections = Self::captures(re_connection(), &text);
        if let Some(unknown) = connections
            .iter()
            .find(|name| !request.connections.contains_key(name.as_str()))
        {
            return Err(compilation_error(
                &request.model_path,
                format!("connection '{}' is not defined", unknown),
            ));
        }

        Ok(CompiledModel {
            path: request.model_path,
            model_type: request.model_type,
            sources: Self::captures(re_source(), &text),
            queries: Self::captures(re_query(), &text),
            imports,
            connections,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::DuckDbConnection;
    use crate::ports::connection::ConnectionMap;
    use anyhow::Result;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn request(root: &Path, path: &str, model_type: ModelType) -> Result<CompileRequest> {
        let mut connections = ConnectionMap::new();
        connections.insert(
            "duckdb".to_string(),
            Arc::new(DuckDbConnection::in_memory("duckdb")?),
        );
        Ok(CompileRequest {
            package_name: "faa".to_string(),
            package_root: PathBuf::from(root),
            model_path: path.to_string(),
            model_type,
            connections,
        })
    }

    #[tokio::test]
    async fn test_model_outline() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("carriers.malloy"), "source: carriers is duckdb.table('carriers.csv')")?;
        std::fs::write(
            dir.path().join("flights.malloy"),
            r#"import "carriers.malloy"
-- source: commented is duckdb.table('x')
source: flights is duckdb.table('s3://bucket/flights.parquet') extend {
  join_one: carriers with carrier
}
query: by_carrier is flights -> { group_by: carrier }
"#,
        )?;

        let model = OutlineCompiler
            .compile(request(dir.path(), "flights.malloy", ModelType::Model)?)
            .await?;
        assert_eq!(model.sources, ["flights"]);
        assert_eq!(model.queries, ["by_carrier"]);
        assert_eq!(model.imports, ["carriers.malloy"]);
        assert_eq!(model.connections, ["duckdb"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_notebook_reads_malloy_cells_only() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            dir.path().join("intro.malloynb"),
            ">>>markdown\n# source: fake is nothing\n>>>malloy\nsource: real is duckdb.sql(\"select 1\")\n",
        )?;
        let model = OutlineCompiler
            .compile(request(dir.path(), "intro.malloynb", ModelType::Notebook)?)
            .await?;
        assert_eq!(model.sources, ["real"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_connection_and_missing_import() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("a.malloy"), "source: a is warehouse.table('t')")?;
        std::fs::write(dir.path().join("b.malloy"), "import \"../outside.malloy\"")?;

        let err = OutlineCompiler
            .compile(request(dir.path(), "a.malloy", ModelType::Model)?)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'warehouse'"));

        let err = OutlineCompiler
            .compile(request(dir.path(), "b.malloy", ModelType::Model)?)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::ModelCompilation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_is_model_not_found() -> Result<()> {
        let dir = tempdir()?;
        let err = OutlineCompiler
            .compile(request(dir.path(), "nope.malloy", ModelType::Model)?)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }
}
