use std::collections::HashMap;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use tracing::debug;

use ctas_core::AwsConfig;

use crate::error::StorageError;

/// Maps a bucket name to the [`ObjectStore`] serving it.
///
/// `object_store` clients are scoped to one bucket, while the staging
/// bucket is chosen per query, so stores are resolved on demand.
pub trait BucketResolver: Send + Sync {
    fn resolve(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError>;
}

/// Resolves buckets to S3 stores in one region.
///
/// Credentials come from the environment (`AWS_ACCESS_KEY_ID`, profile,
/// instance metadata), as with the rest of the AWS stack.
#[derive(Debug, Clone)]
pub struct S3Buckets {
    region: String,
    endpoint_url: Option<String>,
}

impl S3Buckets {
    pub fn new(aws: &AwsConfig) -> Self {
        Self {
            region: aws.region.clone(),
            endpoint_url: aws.endpoint_url.clone(),
        }
    }
}

impl BucketResolver for S3Buckets {
    fn resolve(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(&self.region)
            .with_bucket_name(bucket);

        if let Some(ref endpoint) = self.endpoint_url {
            // object_store requires an absolute endpoint URL
            let endpoint_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint.clone()
            } else {
                format!("https://{}", endpoint)
            };
            builder = builder
                .with_endpoint(&endpoint_url)
                .with_allow_http(endpoint_url.starts_with("http://"));
        }

        let store = builder.build()?;
        debug!(bucket = %bucket, region = %self.region, "Resolved S3 object store");
        Ok(Arc::new(store))
    }
}

/// A fixed set of named stores. Unknown buckets do not resolve.
#[derive(Default, Clone)]
pub struct StaticBuckets {
    stores: HashMap<String, Arc<dyn ObjectStore>>,
}

impl StaticBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh in-memory bucket and return its store.
    pub fn add_memory(&mut self, bucket: &str) -> Arc<dyn ObjectStore> {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        self.stores.insert(bucket.to_string(), store.clone());
        store
    }
}

impl BucketResolver for StaticBuckets {
    fn resolve(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        self.stores
            .get(bucket)
            .cloned()
            .ok_or_else(|| StorageError::Inaccessible {
                bucket: bucket.to_string(),
                reason: "no such bucket".into(),
            })
    }
}
