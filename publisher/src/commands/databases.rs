// publisher/src/commands/databases.rs

use crate::cli::StoreArgs;
use crate::commands::{open_package, table};

pub async fn execute(args: &StoreArgs, project: &str, package: &str) -> anyhow::Result<()> {
    let package = open_package(args, project, package).await?;

    let mut out = table(vec!["File", "Bytes", "Rows", "Columns"]);
    for db in package.list_databases() {
        let (rows, columns) = match &db.info {
            Some(info) => (
                info.row_count.to_string(),
                info.columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.data_type))
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            None => ("?".to_string(), String::new()),
        };
        out.add_row(vec![db.path, db.size_bytes.to_string(), rows, columns]);
    }
    println!("{out}");
    Ok(())
}
