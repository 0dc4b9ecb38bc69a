// publisher-core/src/lib.rs

#![allow(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

// 1. Ports: contracts for live connections, model compilation and package sources.
pub mod ports;

// 2. Domain: manifest types, locations, connection declarations. No I/O.
pub mod domain;

// 3. Infrastructure: manifest loading, DuckDB, remote engines, git, object storage.
pub mod infrastructure;

// 4. Application: Package, Project and the ProjectStore registry.
pub mod application;

pub mod error;

// --- RE-EXPORTS (FACADE) ---
pub use application::{Package, Project, ProjectStore, ProjectSummary, StoreOptions};
pub use infrastructure::acquisition::SubpathPolicy;
pub use infrastructure::connection::test_connection_config;
pub use error::PublisherError;
