// publisher/src/commands/connections.rs
//
// USE CASE: Inspect project connections and probe a declaration before saving it.

use anyhow::Context;
use std::path::Path;

use publisher_core::domain::connection::{ConnectionDecl, ConnectionTestOutcome};
use publisher_core::test_connection_config;

use crate::cli::StoreArgs;
use crate::commands::{open_project, table};

pub async fn list(args: &StoreArgs, project: &str) -> anyhow::Result<()> {
    let project = open_project(args, project).await?;

    let mut out = table(vec!["Connection", "Type", "Dialect"]);
    for connection in project.list_api_connections() {
        out.add_row(vec![
            connection.name,
            connection.config.kind().to_string(),
            connection.attributes.dialect_name,
        ]);
    }
    println!("{out}");
    Ok(())
}

pub async fn test(file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let decl: ConnectionDecl = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a valid connection object", file.display()))?;

    let status = test_connection_config(&decl).await;
    println!("{}", serde_json::to_string_pretty(&status)?);

    match status.status {
        ConnectionTestOutcome::Ok => Ok(()),
        ConnectionTestOutcome::Failed => anyhow::bail!(
            "Connection '{}' failed",
            decl.display_name()
        ),
    }
}
