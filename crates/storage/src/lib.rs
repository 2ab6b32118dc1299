//! Staging-bucket access for transient query results.
//!
//! [`ResultStore`] probes and cleans the bucket, [`ColumnarReader`] loads
//! the Parquet files a query left there.

pub mod backend;
pub mod error;
pub mod reader;
pub mod s3;
pub mod store;

pub use backend::{BucketResolver, S3Buckets, StaticBuckets};
pub use error::StorageError;
pub use reader::{ColumnarReader, ParquetReader, Table};
pub use s3::S3ResultStore;
pub use store::{ObjectStoreResultStore, ResultStore};
