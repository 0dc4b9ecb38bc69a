// publisher/src/commands/models.rs
//
// USE CASE: List and compile the models of one package.

use crate::cli::StoreArgs;
use crate::commands::{open_package, table};

pub async fn list(args: &StoreArgs, project: &str, package: &str) -> anyhow::Result<()> {
    let package = open_package(args, project, package).await?;

    let mut out = table(vec!["Model", "Type", "Status"]);
    for model in package.list_models() {
        out.add_row(vec![
            model.path,
            format!("{:?}", model.model_type).to_lowercase(),
            format!("{:?}", model.status).to_lowercase(),
        ]);
    }
    println!("{out}");
    Ok(())
}

pub async fn compile(
    args: &StoreArgs,
    project: &str,
    package: &str,
    model: &str,
) -> anyhow::Result<()> {
    let package = open_package(args, project, package).await?;
    let compiled = package.get_model(model).await?;
    println!("{}", serde_json::to_string_pretty(compiled.as_ref())?);
    Ok(())
}
