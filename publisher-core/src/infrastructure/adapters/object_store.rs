// publisher-core/src/infrastructure/adapters/object_store.rs

use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use std::sync::Arc;

use crate::domain::location::{ObjectStoreUri, StoreScheme};
use crate::error::PublisherError;
use crate::ports::source::ObjectStoreResolver;

/// Builds S3/GCS clients from the standard environment variables
/// (`AWS_*`, `GOOGLE_*`).
#[derive(Debug, Default, Clone)]
pub struct CloudStoreResolver;

impl ObjectStoreResolver for CloudStoreResolver {
    fn resolve(&self, uri: &ObjectStoreUri) -> Result<Arc<dyn ObjectStore>, PublisherError> {
        let store: Arc<dyn ObjectStore> = match uri.scheme {
            StoreScheme::S3 => Arc::new(
                AmazonS3Builder::from_env()
                    .with_bucket_name(&uri.bucket)
                    .build()?,
            ),
            StoreScheme::Gcs => Arc::new(
                GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(&uri.bucket)
                    .build()?,
            ),
        };
        Ok(store)
    }
}
