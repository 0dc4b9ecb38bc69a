pub mod config;
pub mod connection;
pub mod error;
pub mod location;
pub mod model;

pub use config::{PackageDecl, ProjectDecl, PublisherConfig};
pub use connection::{
    ApiConnection, AttachedDatabase, AttachmentSource, ConnectionConfig, ConnectionDecl,
    ConnectionKind, ConnectionStatus, ConnectionTestOutcome, EMBEDDED_ENGINE_NAME, Secret,
};
pub use error::DomainError;
pub use location::{GitRemote, Location, ObjectStoreUri, StoreScheme};
pub use model::{CompiledModel, Database, ModelStatus, ModelSummary, ModelType};
