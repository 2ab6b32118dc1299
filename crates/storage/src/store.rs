//! Prefix-scoped access to the staging bucket.
//!
//! [`ResultStore`] is the part of object storage the query lifecycle needs:
//! an access probe before anything is submitted, and a prefix delete for
//! cleanup. Prefixes are raw key prefixes (S3 semantics), not directories:
//! `a/b` matches both `a/b/c` and `a/b.csv`.

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::path::Path;
use tracing::{debug, info};

use crate::backend::BucketResolver;
use crate::error::StorageError;

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Check that `bucket` exists and the caller can read it.
    async fn probe_access(&self, bucket: &str) -> Result<(), StorageError>;

    /// Delete every object whose key starts with `prefix`, returning how
    /// many were deleted. An empty prefix match deletes nothing.
    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize, StorageError>;
}

/// [`ResultStore`] over `object_store` backends.
pub struct ObjectStoreResultStore<R> {
    buckets: R,
}

impl<R: BucketResolver> ObjectStoreResultStore<R> {
    pub fn new(buckets: R) -> Self {
        Self { buckets }
    }
}

/// Directory part of a raw prefix, used to narrow the listing.
fn list_root(prefix: &str) -> Option<Path> {
    prefix
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .filter(|dir| !dir.is_empty())
        .map(Path::from)
}

#[async_trait]
impl<R: BucketResolver> ResultStore for ObjectStoreResultStore<R> {
    async fn probe_access(&self, bucket: &str) -> Result<(), StorageError> {
        let store = self.buckets.resolve(bucket)?;
        let mut listing = store.list(None);
        listing
            .try_next()
            .await
            .map_err(|e| StorageError::Inaccessible {
                bucket: bucket.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize, StorageError> {
        let store = self.buckets.resolve(bucket)?;
        let root = list_root(prefix);

        let keys: Vec<Path> = store
            .list(root.as_ref())
            .try_filter(|meta| futures::future::ready(meta.location.as_ref().starts_with(prefix)))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await?;

        for key in &keys {
            store.delete(key).await?;
            debug!(bucket = %bucket, key = %key, "Deleted staged object");
        }

        info!(bucket = %bucket, prefix = %prefix, deleted = keys.len(), "Deleted objects under prefix");
        Ok(keys.len())
    }
}
