// publisher/src/commands/mod.rs

pub mod connections;
pub mod databases;
pub mod models;
pub mod packages;
pub mod projects;

use anyhow::Context;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use std::sync::Arc;
use tracing::info;

use publisher_core::{Package, Project, ProjectStore, StoreOptions, SubpathPolicy};

use crate::cli::StoreArgs;

/// Builds the store from the global flags and runs its startup load.
pub async fn open_store(args: &StoreArgs) -> anyhow::Result<ProjectStore> {
    let mut options = StoreOptions::new(&args.server_root);
    if let Some(scratch) = &args.scratch_dir {
        options = options.with_scratch_dir(scratch);
    }
    if args.strict_subpaths {
        options = options.with_subpath_policy(SubpathPolicy::Strict);
    }

    info!(root = %args.server_root.display(), "Opening project store");
    let store = ProjectStore::new(options);
    store.initialize().await.with_context(|| {
        format!(
            "Failed to initialize publisher from {}",
            args.server_root.display()
        )
    })?;
    Ok(store)
}

pub async fn open_project(args: &StoreArgs, project: &str) -> anyhow::Result<Arc<Project>> {
    let store = open_store(args).await?;
    Ok(store.get_project(project, false).await?)
}

pub async fn open_package(
    args: &StoreArgs,
    project: &str,
    package: &str,
) -> anyhow::Result<Arc<Package>> {
    Ok(open_project(args, project).await?.get_package(package)?)
}

pub fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}
