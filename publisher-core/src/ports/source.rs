// publisher-core/src/ports/source.rs

use async_trait::async_trait;
use object_store::ObjectStore;
use std::path::Path;
use std::sync::Arc;

use crate::domain::location::ObjectStoreUri;
use crate::error::PublisherError;

#[async_trait]
pub trait GitClient: Send + Sync {
    /// Clone `url` (optionally at `git_ref`) into the empty directory `dest`.
    async fn clone_repo(
        &self,
        url: &str,
        git_ref: Option<&str>,
        dest: &Path,
    ) -> Result<(), PublisherError>;
}

pub trait ObjectStoreResolver: Send + Sync {
    /// Store client scoped to the bucket named by `uri`.
    fn resolve(&self, uri: &ObjectStoreUri) -> Result<Arc<dyn ObjectStore>, PublisherError>;
}
