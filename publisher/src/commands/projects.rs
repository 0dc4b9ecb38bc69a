// publisher/src/commands/projects.rs
//
// USE CASE: Load every configured project and report what loaded.

use publisher_core::application::ProjectStatus;

use crate::cli::StoreArgs;
use crate::commands::{open_store, table};

pub async fn execute(args: &StoreArgs, json: bool) -> anyhow::Result<()> {
    let store = open_store(args).await?;
    let summaries = store.list_projects();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    let mut out = table(vec!["Project", "Status", "Loaded", "Error"]);
    for summary in &summaries {
        let status = match summary.status {
            ProjectStatus::Ready => "✅ ready",
            ProjectStatus::Loading => "⏳ loading",
            ProjectStatus::Failed => "❌ failed",
        };
        out.add_row(vec![
            summary.name.clone(),
            status.to_string(),
            summary
                .loaded_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            summary.error.clone().unwrap_or_default(),
        ]);
    }
    println!("{out}");

    if store.is_frozen() {
        println!("🔒 Configuration is frozen");
    }

    let failed = summaries
        .iter()
        .filter(|s| s.status == ProjectStatus::Failed)
        .count();
    if failed > 0 {
        anyhow::bail!("{} project(s) failed to load", failed);
    }
    Ok(())
}
