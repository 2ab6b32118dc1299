//! In-memory stand-ins for Athena, S3 and Glue.
//!
//! `ScriptedEngine` replays a fixed sequence of status responses. On submit
//! it behaves like CTAS: registers the table in the catalog and writes the
//! configured files under the table directory of the output location.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use parquet::arrow::ArrowWriter;

use ctas_athena::*;
use ctas_storage::{ObjectStoreResultStore, ParquetReader, ResultStore, StaticBuckets, StorageError};

pub const BUCKET: &str = "staging";
pub const HANDLE: &str = "0d5c3a9e-1f2b-4c3d-8e4f-00000000abcd";
pub const SECOND: Duration = Duration::from_secs(1);

pub enum Step {
    Status(QueryStatus),
    PollError(String),
}

/// What the fake engine does, in order.
pub struct Script {
    steps: VecDeque<Step>,
    /// Returned once `steps` is exhausted.
    fallback: EngineState,
    /// Data files written under the table directory on submit.
    files: Vec<Vec<u8>>,
    /// Whether submit registers the CTAS table.
    creates_table: bool,
    submit_error: Option<String>,
}

impl Script {
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            fallback: EngineState::Running,
            files: Vec::new(),
            creates_table: true,
            submit_error: None,
        }
    }

    pub fn poll(mut self, state: EngineState) -> Self {
        self.steps.push_back(Step::Status(QueryStatus::with_state(state)));
        self
    }

    pub fn poll_status(mut self, status: QueryStatus) -> Self {
        self.steps.push_back(Step::Status(status));
        self
    }

    pub fn poll_error(mut self, message: &str) -> Self {
        self.steps.push_back(Step::PollError(message.to_string()));
        self
    }

    pub fn then_forever(mut self, state: EngineState) -> Self {
        self.fallback = state;
        self
    }

    pub fn stage(mut self, file: Vec<u8>) -> Self {
        self.files.push(file);
        self
    }

    pub fn without_table(mut self) -> Self {
        self.creates_table = false;
        self
    }

    pub fn reject_submit(mut self, message: &str) -> Self {
        self.submit_error = Some(message.to_string());
        self
    }
}

pub struct ScriptedEngine {
    script: Mutex<Script>,
    store: Arc<dyn ObjectStore>,
    catalog: Arc<MemoryCatalog>,
    pub submissions: Mutex<Vec<(String, String)>>,
    pub polls: AtomicUsize,
    pub cancels: AtomicUsize,
}

impl ScriptedEngine {
    pub fn submitted_sql(&self) -> Vec<String> {
        self.submissions.lock().unwrap().iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

/// `create table db.name\n...` → `(db, name)`.
fn ctas_target(sql: &str) -> (String, String) {
    let rest = sql.strip_prefix("create table ").expect("not a CTAS statement");
    let target = rest.split_whitespace().next().expect("no table name");
    let (db, table) = target.split_once('.').expect("table is not qualified");
    (db.to_string(), table.to_string())
}

#[async_trait]
impl QueryEngine for ScriptedEngine {
    async fn submit(&self, sql: &str, output_location: &str) -> Result<QueryHandle, EngineError> {
        self.submissions
            .lock()
            .unwrap()
            .push((sql.to_string(), output_location.to_string()));

        let (files, creates_table) = {
            let script = self.script.lock().unwrap();
            if let Some(ref message) = script.submit_error {
                return Err(EngineError::AwsSdk(message.clone()));
            }
            (script.files.clone(), script.creates_table)
        };

        if creates_table {
            let (db, table) = ctas_target(sql);
            self.catalog.create_table(&db, &table);
        }

        let staged = !files.is_empty();
        let base = output_location
            .strip_prefix(&format!("s3://{BUCKET}/"))
            .expect("output location outside the staging bucket");
        for (i, data) in files.into_iter().enumerate() {
            let key = format!("{base}/tables/{HANDLE}/part-{i:05}");
            self.store.put(&Path::from(key), PutPayload::from(data)).await.unwrap();
        }
        if staged {
            let manifest = format!("{base}/tables/{HANDLE}-manifest.csv");
            self.store
                .put(&Path::from(manifest), PutPayload::from_static(b"part-00000\n"))
                .await
                .unwrap();
        }

        Ok(QueryHandle::new(HANDLE))
    }

    async fn status(&self, handle: &QueryHandle) -> Result<QueryStatus, EngineError> {
        assert_eq!(handle.as_str(), HANDLE);
        self.polls.fetch_add(1, Ordering::SeqCst);

        let mut script = self.script.lock().unwrap();
        match script.steps.pop_front() {
            Some(Step::Status(status)) => Ok(status),
            Some(Step::PollError(message)) => Err(EngineError::AwsSdk(message)),
            None => Ok(QueryStatus::with_state(script.fallback.clone())),
        }
    }

    async fn cancel(&self, handle: &QueryHandle) -> Result<(), EngineError> {
        assert_eq!(handle.as_str(), HANDLE);
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Store whose deletes always fail.
pub struct BrokenStore<S>(pub S);

#[async_trait]
impl<S: ResultStore> ResultStore for BrokenStore<S> {
    async fn probe_access(&self, bucket: &str) -> Result<(), StorageError> {
        self.0.probe_access(bucket).await
    }

    async fn delete_prefix(&self, _bucket: &str, _prefix: &str) -> Result<usize, StorageError> {
        Err(StorageError::S3("AccessDenied".into()))
    }
}

/// Catalog whose deletes always fail.
pub struct BrokenCatalog;

#[async_trait]
impl CatalogService for BrokenCatalog {
    async fn delete_table(&self, _database: &str, _table: &str) -> Result<bool, CatalogError> {
        Err(CatalogError::Glue("ThrottlingException".into()))
    }
}

pub struct Harness {
    pub store: Arc<dyn ObjectStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub engine: Arc<ScriptedEngine>,
    pub clients: AthenaClients,
}

impl Harness {
    pub fn new(script: Script) -> Self {
        let mut buckets = StaticBuckets::new();
        let store = buckets.add_memory(BUCKET);
        let catalog = Arc::new(MemoryCatalog::new());
        let engine = Arc::new(ScriptedEngine {
            script: Mutex::new(script),
            store: store.clone(),
            catalog: catalog.clone(),
            submissions: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        });

        let clients = AthenaClients {
            engine: engine.clone(),
            store: Arc::new(ObjectStoreResultStore::new(buckets.clone())),
            catalog: catalog.clone(),
            reader: Arc::new(ParquetReader::new(buckets)),
        };

        Self {
            store,
            catalog,
            engine,
            clients,
        }
    }

    pub fn settings() -> LifecycleSettings {
        LifecycleSettings {
            poll_interval: Duration::from_millis(10),
            temp_database: "deleteme".into(),
        }
    }

    pub fn request(&self, sql: &str, timeout: Duration) -> QueryRequest {
        QueryRequest::new(sql, BUCKET, timeout, "eu-west-1").unwrap()
    }

    pub async fn run(&self, sql: &str, timeout: Duration) -> Result<ResultTable, QueryError> {
        run_query(self.request(sql, timeout), &self.clients, &Self::settings()).await
    }

    pub async fn put(&self, key: &str) {
        self.store
            .put(&Path::from(key), PutPayload::from_static(b"x"))
            .await
            .unwrap();
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .store
            .list(None)
            .map_ok(|m| m.location.to_string())
            .try_collect()
            .await
            .unwrap();
        keys.sort();
        keys
    }

    pub async fn keys_under(&self, prefix: &str) -> Vec<String> {
        self.keys()
            .await
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect()
    }
}

/// The bucket-relative prefix the lifecycle stages results under.
pub fn generated_prefix() -> String {
    format!("{SENTINEL_DIR}/tables/{HANDLE}")
}

pub fn parquet_file(ids: &[i64], names: &[&str]) -> Vec<u8> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, true),
        Field::new("name", DataType::Utf8, true),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(ids.to_vec())),
            Arc::new(StringArray::from(names.to_vec())),
        ],
    )
    .unwrap();
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
    buf
}
