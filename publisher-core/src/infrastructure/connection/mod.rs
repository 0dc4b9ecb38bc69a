// publisher-core/src/infrastructure/connection/mod.rs

pub mod attach;
pub mod credentials;
pub mod factory;
pub mod sql;
pub mod tester;
pub mod validate;

pub use factory::{ProjectConnections, create_project_connections, default_package_connection};
pub use tester::test_connection_config;
pub use validate::{ValidatedConnection, validate_connections};
