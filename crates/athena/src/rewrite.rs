//! Wraps a `select` in a CTAS statement so Athena writes the result as
//! Parquet files under the staging location.

use std::fmt;

use uuid::Uuid;

/// Prefix of every generated table name.
pub const TABLE_NAME_PREFIX: &str = "deleteme";

/// Name of a transient table. Only the lifecycle creates these.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TempTableName(String);

impl TempTableName {
    pub fn generate() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(format!("{}{}", TABLE_NAME_PREFIX, id.simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RewrittenQuery {
    pub table: TempTableName,
    pub sql: String,
}

/// Build the CTAS statement materializing `sql` as `database.table`.
pub fn rewrite(sql: &str, database: &str, table: TempTableName) -> RewrittenQuery {
    let sql = format!(
        "create table {database}.{table}\n\
         WITH (\n\
         format = 'PARQUET',\n\
         parquet_compression = 'SNAPPY')\n\
         as\n\
         {sql}"
    );
    RewrittenQuery { table, sql }
}
