// publisher-core/src/ports/mod.rs

pub mod compiler;
pub mod connection;
pub mod source;

pub use compiler::{CompileRequest, ModelCompiler};
pub use connection::{ConnectionMap, LiveConnection};
pub use source::{GitClient, ObjectStoreResolver};
