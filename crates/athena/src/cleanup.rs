//! Removal of a query's staged files and transient table.

use serde::Serialize;
use tracing::{error, info, warn};

use ctas_storage::ResultStore;

use crate::catalog::CatalogService;
use crate::engine::QueryHandle;
use crate::error::QueryError;
use crate::location::{OutputLocation, SENTINEL_DIR, TABLES_DIR};
use crate::rewrite::TempTableName;

/// The artifacts one execution leaves behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupPlan {
    pub bucket: String,
    /// Bucket-relative key prefix of the staged files.
    pub prefix: String,
    pub database: String,
    pub table: String,
}

/// What a cleanup run achieved. Each deletion is reported on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub objects_deleted: usize,
    /// `false` if the table was already gone.
    pub table_dropped: bool,
    pub storage_error: Option<String>,
    pub catalog_error: Option<String>,
}

impl CleanupPlan {
    pub fn new(
        location: &OutputLocation,
        handle: &QueryHandle,
        database: &str,
        table: &TempTableName,
    ) -> Self {
        Self {
            bucket: location.bucket().to_string(),
            prefix: location.table_prefix(handle),
            database: database.to_string(),
            table: table.to_string(),
        }
    }

    /// Whether the prefix is still inside the lifecycle's own directory and
    /// names one execution rather than a shared parent.
    pub fn is_safe(&self) -> bool {
        let leaf = self.prefix.rsplit('/').next().unwrap_or_default();
        self.prefix.contains(SENTINEL_DIR)
            && !leaf.is_empty()
            && leaf != SENTINEL_DIR
            && leaf != TABLES_DIR
    }

    /// Delete the staged objects and drop the table.
    ///
    /// Returns [`QueryError::UnsafeCleanup`] without deleting anything when
    /// the prefix fails [`is_safe`](Self::is_safe). Otherwise both deletions
    /// are attempted regardless of how the other one fares, and the outcome
    /// is in the report. Running a plan again is harmless.
    pub async fn execute(
        &self,
        store: &dyn ResultStore,
        catalog: &dyn CatalogService,
    ) -> Result<CleanupReport, QueryError> {
        if !self.is_safe() {
            error!(
                bucket = %self.bucket,
                prefix = %self.prefix,
                sentinel = SENTINEL_DIR,
                "Cleanup prefix was edited, not deleting staged files or table"
            );
            return Err(QueryError::UnsafeCleanup {
                prefix: self.prefix.clone(),
                sentinel: SENTINEL_DIR.to_string(),
            });
        }

        let (objects, table) = tokio::join!(
            store.delete_prefix(&self.bucket, &self.prefix),
            catalog.delete_table(&self.database, &self.table),
        );

        let mut report = CleanupReport::default();
        match objects {
            Ok(n) => report.objects_deleted = n,
            Err(e) => {
                warn!(bucket = %self.bucket, prefix = %self.prefix, error = %e, "Failed to delete staged files");
                report.storage_error = Some(e.to_string());
            }
        }
        match table {
            Ok(dropped) => report.table_dropped = dropped,
            Err(e) => {
                warn!(database = %self.database, table = %self.table, error = %e, "Failed to drop transient table");
                report.catalog_error = Some(e.to_string());
            }
        }

        info!(
            bucket = %self.bucket,
            prefix = %self.prefix,
            table = %self.table,
            objects_deleted = report.objects_deleted,
            table_dropped = report.table_dropped,
            complete = report.is_complete(),
            "Cleanup finished"
        );
        Ok(report)
    }
}

impl CleanupReport {
    pub fn is_complete(&self) -> bool {
        self.storage_error.is_none() && self.catalog_error.is_none()
    }

    pub fn failures(&self) -> Vec<String> {
        let mut failures = Vec::new();
        if let Some(ref e) = self.storage_error {
            failures.push(format!("staged files: {e}"));
        }
        if let Some(ref e) = self.catalog_error {
            failures.push(format!("transient table: {e}"));
        }
        failures
    }

    /// `Err(QueryError::Cleanup)` unless both deletions succeeded.
    pub fn into_result(self) -> Result<Self, QueryError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(QueryError::Cleanup {
                failures: self.failures(),
            })
        }
    }
}
