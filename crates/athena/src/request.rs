//! Local validation of a query request.
//!
//! Everything here runs before any remote call: a rejected request leaves
//! no state behind and needs no cleanup.

use std::time::Duration;

use serde::Serialize;

use crate::error::QueryError;

/// A validated, immutable query request.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    sql: String,
    bucket: String,
    timeout: Duration,
    region: String,
}

impl QueryRequest {
    /// Validate and build a request.
    ///
    /// `bucket` is the staging bucket name only (`my-results`, not
    /// `s3://my-results/`). `timeout` must be non-zero.
    pub fn new(
        sql: impl Into<String>,
        bucket: impl Into<String>,
        timeout: Duration,
        region: impl Into<String>,
    ) -> Result<Self, QueryError> {
        let sql = sql.into();
        let bucket = bucket.into();

        verify_sql(&sql)?;
        verify_bucket_name(&bucket)?;
        if timeout.is_zero() {
            return Err(QueryError::InvalidQuery(
                "the timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            sql,
            bucket,
            timeout,
            region: region.into(),
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

/// The statement must be a `select` (case-insensitive, surrounding
/// whitespace ignored).
pub fn verify_sql(sql: &str) -> Result<(), QueryError> {
    if sql.trim().to_lowercase().starts_with("select") {
        Ok(())
    } else {
        Err(QueryError::InvalidQuery(
            "the sql statement must be a select query i.e. it must start with the token 'select'"
                .into(),
        ))
    }
}

/// The staging location must be a bare bucket name.
pub fn verify_bucket_name(bucket: &str) -> Result<(), QueryError> {
    if bucket.is_empty() {
        return Err(QueryError::inaccessible(bucket, "bucket name is empty"));
    }
    if bucket.contains('/') || bucket.contains(':') {
        return Err(QueryError::inaccessible(
            bucket,
            "bucket should be the bucket name only e.g. alpha-mydata, without s3:// or a key path",
        ));
    }
    Ok(())
}
