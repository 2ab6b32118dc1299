pub mod catalog;
pub mod cleanup;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod location;
pub mod request;
pub mod result;
pub mod rewrite;

pub use catalog::{CatalogError, CatalogService, GlueCatalog, MemoryCatalog};
pub use cleanup::{CleanupPlan, CleanupReport};
pub use engine::{AthenaEngine, EngineError, EngineState, QueryEngine, QueryHandle, QueryStatus};
pub use error::{ErrorKind, QueryError};
pub use lifecycle::{
    athena_query_to_table, load_sdk_config, run_query, run_query_until, AthenaClients,
    LifecycleSettings, QueryLifecycle, QueryState,
};
pub use location::{OutputLocation, SENTINEL_DIR};
pub use request::QueryRequest;
pub use result::{QueryMetadata, ResultTable};
pub use rewrite::{RewrittenQuery, TempTableName};
