//! Where Athena stages a query's output inside the caller's bucket.
//!
//! ```text
//! s3://{bucket}/__athena_temp__                 engine output location
//! s3://{bucket}/__athena_temp__/tables/{id}     CTAS table data
//! ```

use crate::engine::QueryHandle;

/// Directory owned by the lifecycle inside the staging bucket. Cleanup
/// refuses any prefix that does not contain it.
pub const SENTINEL_DIR: &str = "__athena_temp__";

/// Subdirectory of [`SENTINEL_DIR`] shared by every query's table data.
pub const TABLES_DIR: &str = "tables";

/// Output paths for one staging bucket. Derived, never caller-supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLocation {
    bucket: String,
}

impl OutputLocation {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Output location handed to the engine on submission.
    pub fn base_uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, SENTINEL_DIR)
    }

    /// Bucket-relative directory holding the table data for `handle`.
    pub fn table_prefix(&self, handle: &QueryHandle) -> String {
        format!("{}/{}/{}", SENTINEL_DIR, TABLES_DIR, handle)
    }

    pub fn table_uri(&self, handle: &QueryHandle) -> String {
        format!("s3://{}/{}", self.bucket, self.table_prefix(handle))
    }
}
