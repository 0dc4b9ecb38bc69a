// publisher/src/commands/packages.rs

use crate::cli::StoreArgs;
use crate::commands::{open_project, table};

pub async fn execute(args: &StoreArgs, project: &str) -> anyhow::Result<()> {
    let project = open_project(args, project).await?;

    let mut out = table(vec!["Package", "Description", "Models", "Databases"]);
    for package in project.list_packages() {
        let info = package.info();
        out.add_row(vec![
            info.name,
            info.description.unwrap_or_default(),
            info.models.to_string(),
            info.databases.to_string(),
        ]);
    }
    println!("📦 Project '{}'", project.name());
    println!("{out}");
    Ok(())
}
