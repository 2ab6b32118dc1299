use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors surfaced by the query lifecycle.
///
/// Each variant identifies the phase that failed. Use [`QueryError::kind`]
/// to branch on the phase without matching fields.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The request was rejected locally; nothing remote was touched.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The staging bucket name is malformed or the bucket cannot be read.
    #[error("staging bucket '{bucket}' is not usable: {reason}")]
    InaccessibleStorage { bucket: String, reason: String },

    /// A remote call failed (network, throttling, SDK error). Says nothing
    /// about the query itself.
    #[error("{operation} call failed: {message}")]
    Transient { operation: &'static str, message: String },

    /// The engine ran the query and reported failure.
    #[error("Query {query_id} failed: {reason}")]
    EngineFailure { query_id: String, reason: String },

    /// The query was still queued or running when the deadline passed.
    #[error("Query {query_id} timed out after {:.1}s", .timeout.as_secs_f64())]
    DeadlineExceeded { query_id: String, timeout: Duration },

    /// The caller stopped waiting; the execution was cancelled.
    #[error("Query {query_id} was interrupted before completing")]
    Interrupted { query_id: String },

    /// The engine reported a state the lifecycle does not handle.
    #[error("Query {query_id} ended in an unrecognized state: {status}")]
    UnknownExecution { query_id: String, status: String },

    /// The engine reported success but the staged output could not be read.
    #[error("Query {query_id} succeeded but its output could not be read: {reason}")]
    Materialization { query_id: String, reason: String },

    /// The deletion prefix is not one execution's directory under the
    /// sentinel; nothing was deleted.
    #[error("refusing to clean up '{prefix}': not a single execution under '{sentinel}'")]
    UnsafeCleanup { prefix: String, sentinel: String },

    /// One or both cleanup deletions failed.
    #[error("cleanup incomplete: {}", .failures.join("; "))]
    Cleanup { failures: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidQuery,
    InaccessibleStorage,
    Transient,
    EngineFailure,
    DeadlineExceeded,
    Interrupted,
    UnknownExecution,
    Materialization,
    UnsafeCleanup,
    Cleanup,
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            QueryError::InaccessibleStorage { .. } => ErrorKind::InaccessibleStorage,
            QueryError::Transient { .. } => ErrorKind::Transient,
            QueryError::EngineFailure { .. } => ErrorKind::EngineFailure,
            QueryError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            QueryError::Interrupted { .. } => ErrorKind::Interrupted,
            QueryError::UnknownExecution { .. } => ErrorKind::UnknownExecution,
            QueryError::Materialization { .. } => ErrorKind::Materialization,
            QueryError::UnsafeCleanup { .. } => ErrorKind::UnsafeCleanup,
            QueryError::Cleanup { .. } => ErrorKind::Cleanup,
        }
    }

    pub(crate) fn transient(operation: &'static str, err: impl fmt::Display) -> Self {
        QueryError::Transient {
            operation,
            message: err.to_string(),
        }
    }

    pub(crate) fn inaccessible(bucket: &str, reason: impl fmt::Display) -> Self {
        QueryError::InaccessibleStorage {
            bucket: bucket.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
