//! AWS Athena as the remote query engine.
//!
//! [`QueryEngine`] is the submit / status / cancel surface the lifecycle
//! polls against; [`AthenaEngine`] implements it with the Athena SDK.

use std::fmt;

use async_trait::async_trait;
use aws_sdk_athena::types::{QueryExecution, QueryExecutionState, ResultConfiguration};
use aws_types::SdkConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Engine-assigned execution id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryHandle(String);

impl QueryHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution state as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// Anything else, including a missing state.
    Other(String),
}

/// One status poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStatus {
    pub state: EngineState,
    /// State-change reason; set by the engine on failure.
    pub reason: Option<String>,
    /// The full status payload, for diagnostics.
    pub raw: String,
    pub bytes_scanned: u64,
    pub execution_time_ms: u64,
}

impl QueryStatus {
    /// A bare status carrying only a state, with empty statistics.
    pub fn with_state(state: EngineState) -> Self {
        Self {
            raw: format!("{state:?}"),
            state,
            reason: None,
            bytes_scanned: 0,
            execution_time_ms: 0,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::with_state(EngineState::Failed)
        }
    }
}

/// Errors from the engine's API itself, as opposed to query failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An AWS SDK error (stringified).
    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    /// A response was missing a field the protocol requires.
    #[error("missing {0} in response")]
    MissingField(&'static str),
}

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Start executing `sql`, writing output under `output_location`.
    async fn submit(&self, sql: &str, output_location: &str) -> Result<QueryHandle, EngineError>;

    /// Fetch the current status. Never cached.
    async fn status(&self, handle: &QueryHandle) -> Result<QueryStatus, EngineError>;

    /// Request cancellation. Returns once the request is accepted, not when
    /// the execution has stopped.
    async fn cancel(&self, handle: &QueryHandle) -> Result<(), EngineError>;
}

// ---------------------------------------------------------------------------
// Athena
// ---------------------------------------------------------------------------

pub struct AthenaEngine {
    client: aws_sdk_athena::Client,
    workgroup: String,
}

impl AthenaEngine {
    pub fn from_sdk_config(sdk_config: &SdkConfig, workgroup: &str) -> Self {
        Self {
            client: aws_sdk_athena::Client::new(sdk_config),
            workgroup: workgroup.to_string(),
        }
    }
}

fn engine_state(state: Option<&QueryExecutionState>) -> EngineState {
    match state {
        Some(QueryExecutionState::Queued) => EngineState::Queued,
        Some(QueryExecutionState::Running) => EngineState::Running,
        Some(QueryExecutionState::Succeeded) => EngineState::Succeeded,
        Some(QueryExecutionState::Failed) => EngineState::Failed,
        Some(QueryExecutionState::Cancelled) => EngineState::Cancelled,
        Some(other) => EngineState::Other(other.as_str().to_string()),
        None => EngineState::Other("UNSET".to_string()),
    }
}

fn status_from_execution(qe: &QueryExecution) -> QueryStatus {
    let status = qe.status();
    let stats = qe.statistics();

    QueryStatus {
        state: engine_state(status.and_then(|s| s.state())),
        reason: status
            .and_then(|s| s.state_change_reason())
            .map(str::to_string),
        raw: format!("{:?}", qe),
        bytes_scanned: stats
            .and_then(|s| s.data_scanned_in_bytes())
            .unwrap_or(0)
            .max(0) as u64,
        execution_time_ms: stats
            .and_then(|s| s.engine_execution_time_in_millis())
            .unwrap_or(0)
            .max(0) as u64,
    }
}

#[async_trait]
impl QueryEngine for AthenaEngine {
    async fn submit(&self, sql: &str, output_location: &str) -> Result<QueryHandle, EngineError> {
        let resp = self
            .client
            .start_query_execution()
            .query_string(sql)
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(output_location)
                    .build(),
            )
            .work_group(&self.workgroup)
            .send()
            .await
            .map_err(|e| EngineError::AwsSdk(e.to_string()))?;

        let id = resp
            .query_execution_id()
            .filter(|id| !id.is_empty())
            .ok_or(EngineError::MissingField("QueryExecutionId"))?;

        info!(query_id = %id, workgroup = %self.workgroup, "Query execution started");
        Ok(QueryHandle::new(id))
    }

    async fn status(&self, handle: &QueryHandle) -> Result<QueryStatus, EngineError> {
        let resp = self
            .client
            .get_query_execution()
            .query_execution_id(handle.as_str())
            .send()
            .await
            .map_err(|e| EngineError::AwsSdk(e.to_string()))?;

        let qe = resp
            .query_execution()
            .ok_or(EngineError::MissingField("QueryExecution"))?;

        Ok(status_from_execution(qe))
    }

    async fn cancel(&self, handle: &QueryHandle) -> Result<(), EngineError> {
        self.client
            .stop_query_execution()
            .query_execution_id(handle.as_str())
            .send()
            .await
            .map_err(|e| EngineError::AwsSdk(e.to_string()))?;

        debug!(query_id = %handle, "Query cancellation requested");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests: response mapping only, no AWS calls
// ---------------------------------------------------------------------------
