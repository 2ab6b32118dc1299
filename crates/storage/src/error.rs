use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// An S3 SDK error (stringified).
    #[error("S3 error: {0}")]
    S3(String),

    #[error("bucket '{bucket}' is not accessible: {reason}")]
    Inaccessible { bucket: String, reason: String },

    #[error("no result files under s3://{bucket}/{prefix}")]
    NoData { bucket: String, prefix: String },

    #[error("schema of '{key}' does not match the first result file")]
    SchemaMismatch { key: String },

    #[error("{0}")]
    Other(String),
}
