//! Query lifecycle: submit, poll, materialize, clean up.
//!
//! A [`QueryLifecycle`] is opened by [`QueryLifecycle::start`] (probe the
//! staging bucket, rewrite, submit) and closed by
//! [`QueryLifecycle::finish`] (delete staged files and the transient
//! table). [`run_query`] wraps the two so that `finish` runs exactly once on
//! every path after a successful submission. A lifecycle dropped before
//! `finish` (its future was abandoned) cancels and cleans up on a
//! background task.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use aws_types::SdkConfig;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use ctas_core::{AwsConfig, Config, QueryConfig};
use ctas_storage::{ColumnarReader, ParquetReader, ResultStore, S3Buckets, S3ResultStore};

use crate::catalog::{CatalogService, GlueCatalog};
use crate::cleanup::{CleanupPlan, CleanupReport};
use crate::engine::{AthenaEngine, EngineState, QueryEngine, QueryHandle, QueryStatus};
use crate::error::QueryError;
use crate::location::OutputLocation;
use crate::request::QueryRequest;
use crate::result::{QueryMetadata, ResultTable};
use crate::rewrite::{rewrite, TempTableName};

// ---------------------------------------------------------------------------
// Settings & collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSettings {
    /// Delay between two status polls.
    pub poll_interval: Duration,
    /// Catalog database the transient table is created in.
    pub temp_database: String,
}

impl LifecycleSettings {
    pub fn from_config(query: &QueryConfig) -> Self {
        Self {
            poll_interval: query.poll_interval(),
            temp_database: query.temp_database.clone(),
        }
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            temp_database: "deleteme".to_string(),
        }
    }
}

/// The remote services a lifecycle talks to.
#[derive(Clone)]
pub struct AthenaClients {
    pub engine: Arc<dyn QueryEngine>,
    pub store: Arc<dyn ResultStore>,
    pub catalog: Arc<dyn CatalogService>,
    pub reader: Arc<dyn ColumnarReader>,
}

/// Load the SDK config shared by every AWS client, applying the custom
/// endpoint when one is configured.
pub async fn load_sdk_config(aws: &AwsConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_types::region::Region::new(aws.region.clone()));
    if let Some(ref endpoint) = aws.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}

impl AthenaClients {
    /// Production clients (Athena, S3, Glue) for `config.aws.region`.
    pub async fn connect(config: &Config) -> Self {
        let sdk_config = load_sdk_config(&config.aws).await;

        info!(
            region = %config.aws.region,
            endpoint = config.aws.endpoint_url.as_deref().unwrap_or("default"),
            workgroup = %config.query.workgroup,
            "Athena clients initialised"
        );

        Self {
            engine: Arc::new(AthenaEngine::from_sdk_config(&sdk_config, &config.query.workgroup)),
            store: Arc::new(S3ResultStore::from_sdk_config(&sdk_config)),
            catalog: Arc::new(GlueCatalog::from_sdk_config(&sdk_config)),
            reader: Arc::new(ParquetReader::new(S3Buckets::new(&config.aws))),
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Lifecycle view of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Unknown,
}

impl QueryState {
    /// Map an engine report. `Cancelled` is only ever requested by the
    /// lifecycle on timeout, so an engine-side cancel is unrecognized.
    pub fn from_engine(state: &EngineState) -> Self {
        match state {
            EngineState::Queued => QueryState::Queued,
            EngineState::Running => QueryState::Running,
            EngineState::Succeeded => QueryState::Succeeded,
            EngineState::Failed => QueryState::Failed,
            EngineState::Cancelled | EngineState::Other(_) => QueryState::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, QueryState::Queued | QueryState::Running)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// One submitted query and the cleanup obligation it carries.
///
/// Dropping a lifecycle without calling [`finish`](Self::finish) cancels a
/// live execution and runs the cleanup plan on a spawned task. Outside a
/// tokio runtime nothing can be spawned and the artifacts are left behind.
pub struct QueryLifecycle {
    request: QueryRequest,
    clients: AthenaClients,
    settings: LifecycleSettings,
    location: OutputLocation,
    table: TempTableName,
    handle: QueryHandle,
    started: Instant,
    state: QueryState,
    last_status: Option<QueryStatus>,
    finished: bool,
}

impl QueryLifecycle {
    /// Probe the staging bucket, rewrite the query and submit it.
    ///
    /// On error nothing was submitted and there is nothing to clean up.
    pub async fn start(
        request: QueryRequest,
        clients: AthenaClients,
        settings: LifecycleSettings,
    ) -> Result<Self, QueryError> {
        clients
            .store
            .probe_access(request.bucket())
            .await
            .map_err(|e| {
                QueryError::inaccessible(
                    request.bucket(),
                    format!("the bucket does not exist or you don't have access to it ({e})"),
                )
            })?;

        let location = OutputLocation::new(request.bucket());
        let rewritten = rewrite(request.sql(), &settings.temp_database, TempTableName::generate());

        let handle = clients
            .engine
            .submit(&rewritten.sql, &location.base_uri())
            .await
            .map_err(|e| QueryError::transient("StartQueryExecution", e))?;

        info!(
            query_id = %handle,
            table = %rewritten.table,
            output = %location.base_uri(),
            timeout_ms = request.timeout().as_millis() as u64,
            "Query submitted"
        );

        Ok(Self {
            request,
            clients,
            settings,
            location,
            table: rewritten.table,
            handle,
            started: Instant::now(),
            state: QueryState::Queued,
            last_status: None,
            finished: false,
        })
    }

    pub fn handle(&self) -> &QueryHandle {
        &self.handle
    }

    pub fn table_name(&self) -> &TempTableName {
        &self.table
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    /// S3 URI of the directory the table data is staged in.
    pub fn output_uri(&self) -> String {
        self.location.table_uri(&self.handle)
    }

    /// What [`finish`](Self::finish) will delete.
    pub fn cleanup_plan(&self) -> CleanupPlan {
        CleanupPlan::new(&self.location, &self.handle, &self.settings.temp_database, &self.table)
    }

    /// Poll until the execution reaches a terminal state.
    ///
    /// Each iteration fetches the status, acts on terminal states, then
    /// checks the deadline before sleeping, so a timeout is noticed at
    /// most one poll interval late.
    pub async fn wait_for_completion(&mut self) -> Result<&QueryStatus, QueryError> {
        loop {
            let status = self
                .clients
                .engine
                .status(&self.handle)
                .await
                .map_err(|e| QueryError::transient("GetQueryExecution", e))?;

            let next = QueryState::from_engine(&status.state);
            if next != self.state {
                debug!(query_id = %self.handle, from = ?self.state, to = ?next, "Query state changed");
            }
            self.state = next;

            debug!(
                query_id = %self.handle,
                state = ?status.state,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "Polling query status"
            );

            if self.state.is_terminal() {
                return self.conclude(status);
            }

            if self.started.elapsed() > self.request.timeout() {
                self.state = QueryState::TimedOut;
                warn!(
                    query_id = %self.handle,
                    timeout_ms = self.request.timeout().as_millis() as u64,
                    "Query timed out, cancelling"
                );
                self.request_cancel().await;
                return Err(QueryError::DeadlineExceeded {
                    query_id: self.handle.to_string(),
                    timeout: self.request.timeout(),
                });
            }

            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// Turn a terminal engine report into the poll result.
    fn conclude(&mut self, status: QueryStatus) -> Result<&QueryStatus, QueryError> {
        match self.state {
            QueryState::Succeeded => {
                info!(
                    query_id = %self.handle,
                    bytes_scanned = status.bytes_scanned,
                    execution_time_ms = status.execution_time_ms,
                    "Query succeeded"
                );
                Ok(self.last_status.insert(status))
            }
            QueryState::Failed => {
                let reason = status.reason.unwrap_or_else(|| "unknown".to_string());
                error!(query_id = %self.handle, reason = %reason, "Query failed");
                Err(QueryError::EngineFailure {
                    query_id: self.handle.to_string(),
                    reason,
                })
            }
            _ => {
                error!(query_id = %self.handle, status = %status.raw, "Query in unrecognized state");
                Err(QueryError::UnknownExecution {
                    query_id: self.handle.to_string(),
                    status: status.raw,
                })
            }
        }
    }

    /// Best-effort cancellation; failures are logged, not returned.
    async fn request_cancel(&self) {
        if let Err(e) = self.clients.engine.cancel(&self.handle).await {
            warn!(query_id = %self.handle, error = %e, "Cancellation request failed");
        }
    }

    /// Stop waiting for the execution, cancelling it if it is still live.
    pub async fn interrupt(&self) -> QueryError {
        warn!(query_id = %self.handle, state = ?self.state, "Query interrupted");
        if !self.state.is_terminal() {
            self.request_cancel().await;
        }
        QueryError::Interrupted {
            query_id: self.handle.to_string(),
        }
    }

    /// Load the staged output of a succeeded execution.
    pub async fn read_results(&self) -> Result<ResultTable, QueryError> {
        let status = match (&self.state, &self.last_status) {
            (QueryState::Succeeded, Some(status)) => status,
            _ => {
                return Err(QueryError::Materialization {
                    query_id: self.handle.to_string(),
                    reason: format!("query has not succeeded (state {:?})", self.state),
                })
            }
        };

        let prefix = self.location.table_prefix(&self.handle);
        let table = self
            .clients
            .reader
            .read_table(self.location.bucket(), &prefix)
            .await
            .map_err(|e| QueryError::Materialization {
                query_id: self.handle.to_string(),
                reason: e.to_string(),
            })?;

        Ok(ResultTable::new(
            table,
            QueryMetadata {
                query_id: self.handle.to_string(),
                bytes_scanned: status.bytes_scanned,
                execution_time_ms: status.execution_time_ms,
                state: self.state,
                output_location: self.output_uri(),
                completed_at: Utc::now(),
            },
        ))
    }

    /// Wait for completion, then read the result.
    pub async fn materialize(&mut self) -> Result<ResultTable, QueryError> {
        self.wait_for_completion().await?;
        self.read_results().await
    }

    /// Delete the staged files and the transient table.
    ///
    /// Consumes the lifecycle, so cleanup happens at most once per
    /// submission. `Err` only for [`QueryError::UnsafeCleanup`]; partial
    /// failures are in the report.
    pub async fn finish(mut self) -> Result<CleanupReport, QueryError> {
        let plan = self.cleanup_plan();
        let report = plan
            .execute(self.clients.store.as_ref(), self.clients.catalog.as_ref())
            .await;
        self.finished = true;
        report
    }
}

impl Drop for QueryLifecycle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                query_id = %self.handle,
                table = %self.table,
                output = %self.output_uri(),
                "Query lifecycle dropped outside a runtime, artifacts remain"
            );
            return;
        };

        warn!(
            query_id = %self.handle,
            table = %self.table,
            state = ?self.state,
            "Query lifecycle dropped before cleanup, cleaning up in the background"
        );

        let plan = self.cleanup_plan();
        let clients = self.clients.clone();
        let handle = self.handle.clone();
        let live = !self.state.is_terminal();

        runtime.spawn(async move {
            if live {
                if let Err(e) = clients.engine.cancel(&handle).await {
                    warn!(query_id = %handle, error = %e, "Cancellation request failed");
                }
            }
            match plan
                .execute(clients.store.as_ref(), clients.catalog.as_ref())
                .await
            {
                Ok(report) if report.is_complete() => {}
                Ok(report) => {
                    warn!(query_id = %handle, failures = ?report.failures(), "Background cleanup incomplete")
                }
                Err(e) => warn!(query_id = %handle, error = %e, "Background cleanup refused"),
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run `request` to completion and return its result.
///
/// Once the query is submitted, cleanup is attempted exactly once before
/// this returns, whether the query succeeded, failed, timed out or could
/// not be read. A cleanup failure is returned only when the query itself
/// succeeded; otherwise the query error wins and the cleanup failure is
/// logged.
pub async fn run_query(
    request: QueryRequest,
    clients: &AthenaClients,
    settings: &LifecycleSettings,
) -> Result<ResultTable, QueryError> {
    run_query_until(request, clients, settings, std::future::pending()).await
}

/// [`run_query`] that stops waiting once `shutdown` completes.
///
/// On shutdown a live execution is cancelled, cleanup still runs before
/// returning, and the result is [`QueryError::Interrupted`].
pub async fn run_query_until<F>(
    request: QueryRequest,
    clients: &AthenaClients,
    settings: &LifecycleSettings,
    shutdown: F,
) -> Result<ResultTable, QueryError>
where
    F: Future<Output = ()>,
{
    let mut lifecycle = QueryLifecycle::start(request, clients.clone(), settings.clone()).await?;
    let query_id = lifecycle.handle().to_string();

    let completed = tokio::select! {
        outcome = lifecycle.materialize() => Some(outcome),
        () = shutdown => None,
    };
    let outcome = match completed {
        Some(outcome) => outcome,
        None => Err(lifecycle.interrupt().await),
    };
    let cleanup = lifecycle.finish().await.and_then(CleanupReport::into_result);

    match (outcome, cleanup) {
        (Ok(table), Ok(_)) => Ok(table),
        (Ok(_), Err(cleanup_err)) => {
            error!(query_id = %query_id, error = %cleanup_err, "Query succeeded but cleanup failed");
            Err(cleanup_err)
        }
        (Err(primary), Err(cleanup_err)) => {
            warn!(
                query_id = %query_id,
                error = %primary,
                cleanup_error = %cleanup_err,
                "Cleanup failed after query error"
            );
            Err(primary)
        }
        (Err(primary), Ok(_)) => Err(primary),
    }
}

/// Validate, connect to `region` and run the query in one call.
///
/// Validation happens before any client is built.
pub async fn athena_query_to_table(
    sql: &str,
    bucket: &str,
    timeout: Duration,
    region: &str,
    config: &Config,
) -> Result<ResultTable, QueryError> {
    let request = QueryRequest::new(sql, bucket, timeout, region)?;
    let config = config.with_region(request.region());
    let clients = AthenaClients::connect(&config).await;
    run_query(request, &clients, &LifecycleSettings::from_config(&config.query)).await
}
