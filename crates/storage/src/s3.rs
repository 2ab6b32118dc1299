//! [`ResultStore`] implemented directly on the S3 API.
//!
//! `HeadBucket` is the access probe; cleanup pages through
//! `ListObjectsV2` and removes keys with `DeleteObjects`.

use async_trait::async_trait;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_types::SdkConfig;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::store::ResultStore;

/// `DeleteObjects` accepts at most this many keys per request.
const DELETE_BATCH: usize = 1000;

pub struct S3ResultStore {
    client: aws_sdk_s3::Client,
}

impl S3ResultStore {
    /// Build a client from an already loaded SDK config, so S3 shares the
    /// region, endpoint and credentials of the other AWS clients.
    pub fn from_sdk_config(sdk_config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk_config),
        }
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StorageError::S3(e.to_string()))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    .map(str::to_string),
            );
        }
        Ok(keys)
    }

    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<usize, StorageError> {
        let objects = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::S3(e.to_string()))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::S3(e.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        let failures = output.errors();
        if let Some(first) = failures.first() {
            warn!(
                bucket = %bucket,
                failed = failures.len(),
                key = first.key().unwrap_or("?"),
                "Some staged objects could not be deleted"
            );
            return Err(StorageError::S3(format!(
                "{} of {} deletes failed, first: {} ({})",
                failures.len(),
                keys.len(),
                first.key().unwrap_or("?"),
                first.message().unwrap_or("no message"),
            )));
        }
        Ok(keys.len())
    }
}

#[async_trait]
impl ResultStore for S3ResultStore {
    async fn probe_access(&self, bucket: &str) -> Result<(), StorageError> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| StorageError::Inaccessible {
                bucket: bucket.to_string(),
                reason: e.to_string(),
            })?;
        debug!(bucket = %bucket, "Bucket is accessible");
        Ok(())
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize, StorageError> {
        let keys = self.list_keys(bucket, prefix).await?;
        let mut deleted = 0;
        for chunk in keys.chunks(DELETE_BATCH) {
            deleted += self.delete_batch(bucket, chunk).await?;
        }
        info!(bucket = %bucket, prefix = %prefix, deleted, "Deleted objects under prefix");
        Ok(deleted)
    }
}
