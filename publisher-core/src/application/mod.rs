// publisher-core/src/application/mod.rs

pub mod package;
pub mod project;
pub mod store;

pub use package::{Package, PackageInfo, PackageManifest};
pub use project::{Project, ProjectInfo};
pub use store::{ProjectStatus, ProjectStore, ProjectSummary, StoreOptions};
