//! The metadata catalog holding transient tables.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_types::SdkConfig;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// A Glue SDK error (stringified).
    #[error("Glue error: {0}")]
    Glue(String),
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Drop `database.table`. Returns `false` when the table was already
    /// absent, which is not an error.
    async fn delete_table(&self, database: &str, table: &str) -> Result<bool, CatalogError>;
}

/// [`CatalogService`] backed by the AWS Glue Data Catalog.
pub struct GlueCatalog {
    client: aws_sdk_glue::Client,
}

impl GlueCatalog {
    pub fn from_sdk_config(sdk_config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_glue::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl CatalogService for GlueCatalog {
    async fn delete_table(&self, database: &str, table: &str) -> Result<bool, CatalogError> {
        let result = self
            .client
            .delete_table()
            .database_name(database)
            .name(table)
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(database = %database, table = %table, "Dropped transient table");
                Ok(true)
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_entity_not_found_exception()) =>
            {
                debug!(database = %database, table = %table, "Transient table already absent");
                Ok(false)
            }
            Err(e) => Err(CatalogError::Glue(e.to_string())),
        }
    }
}

/// In-process catalog. Tables are `(database, table)` pairs.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: Mutex<HashSet<(String, String)>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, database: &str, table: &str) {
        self.lock().insert((database.to_string(), table.to_string()));
    }

    pub fn contains(&self, database: &str, table: &str) -> bool {
        self.lock().contains(&(database.to_string(), table.to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<(String, String)>> {
        // A poisoned set of names is still a valid set of names.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CatalogService for MemoryCatalog {
    async fn delete_table(&self, database: &str, table: &str) -> Result<bool, CatalogError> {
        Ok(self.lock().remove(&(database.to_string(), table.to_string())))
    }
}
