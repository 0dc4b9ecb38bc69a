// publisher-core/src/infrastructure/adapters/mod.rs

pub mod duckdb;
pub mod git;
pub mod object_store;
pub mod remote;

pub use self::duckdb::DuckDbConnection;
pub use self::git::GitCli;
pub use self::object_store::CloudStoreResolver;
pub use self::remote::RemoteConnection;
