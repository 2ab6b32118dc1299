//! Read a directory of Parquet result files into memory.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectMeta;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::{debug, info};

use crate::backend::BucketResolver;
use crate::error::StorageError;

/// A fully loaded columnar table.
#[derive(Debug, Clone)]
pub struct Table {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl Table {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

#[async_trait]
pub trait ColumnarReader: Send + Sync {
    /// Read every data file under the directory `prefix` of `bucket` as one
    /// logical table.
    async fn read_table(&self, bucket: &str, prefix: &str) -> Result<Table, StorageError>;
}

/// Parquet [`ColumnarReader`] over `object_store`.
///
/// Files are read in key order. Empty objects and marker files whose name
/// starts with `_` or `.` (`_SUCCESS`, `.crc`, ...) are skipped, and all
/// files must share the schema of the first one.
pub struct ParquetReader<R> {
    buckets: R,
}

impl<R: BucketResolver> ParquetReader<R> {
    pub fn new(buckets: R) -> Self {
        Self { buckets }
    }
}

fn is_data_file(meta: &ObjectMeta) -> bool {
    let name = meta.location.filename().unwrap_or("");
    meta.size > 0 && !name.starts_with('_') && !name.starts_with('.')
}

#[async_trait]
impl<R: BucketResolver> ColumnarReader for ParquetReader<R> {
    async fn read_table(&self, bucket: &str, prefix: &str) -> Result<Table, StorageError> {
        let store = self.buckets.resolve(bucket)?;
        let dir = Path::from(prefix.trim_matches('/'));

        let mut files: Vec<ObjectMeta> = store
            .list(Some(&dir))
            .try_filter(|meta| futures::future::ready(is_data_file(meta)))
            .try_collect()
            .await?;
        files.sort_by(|a, b| a.location.cmp(&b.location));

        if files.is_empty() {
            return Err(StorageError::NoData {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            });
        }

        let mut schema: Option<SchemaRef> = None;
        let mut batches = Vec::new();

        for file in &files {
            let data: Bytes = store.get(&file.location).await?.bytes().await?;
            let builder = ParquetRecordBatchReaderBuilder::try_new(data)?;

            match &schema {
                Some(first) if first.fields() != builder.schema().fields() => {
                    return Err(StorageError::SchemaMismatch {
                        key: file.location.to_string(),
                    });
                }
                Some(_) => {}
                None => schema = Some(builder.schema().clone()),
            }

            for batch in builder.build()? {
                batches.push(batch?);
            }
            debug!(key = %file.location, size = file.size, "Read result file");
        }

        let table = Table {
            // Non-empty `files` guarantees a schema was recorded.
            schema: schema.ok_or_else(|| StorageError::Other("no schema read".into()))?,
            batches,
        };

        info!(
            bucket = %bucket,
            prefix = %prefix,
            files = files.len(),
            rows = table.num_rows(),
            "Loaded result table"
        );
        Ok(table)
    }
}
