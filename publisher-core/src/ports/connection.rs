// publisher-core/src/ports/connection.rs

// What the rest of the system needs from a database connection, regardless of
// the engine behind it.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::connection::ConnectionKind;
use crate::error::PublisherError;

#[async_trait]
pub trait LiveConnection: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> ConnectionKind;

    /// Lightweight round-trip against the engine.
    async fn test(&self) -> Result<(), PublisherError>;

    /// Catalogs and secrets registered inside an embedded engine.
    fn attached_databases(&self) -> Vec<String> {
        Vec::new()
    }
}

pub type ConnectionMap = BTreeMap<String, Arc<dyn LiveConnection>>;
