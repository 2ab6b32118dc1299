use std::fmt;

use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ctas_storage::Table;

use crate::lifecycle::QueryState;

/// Execution metadata for a completed query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// Athena query execution ID.
    pub query_id: String,
    /// Total bytes scanned during execution.
    pub bytes_scanned: u64,
    /// Engine execution time in milliseconds.
    pub execution_time_ms: u64,
    /// Lifecycle state the execution ended in.
    pub state: QueryState,
    /// S3 directory the table data was read from.
    pub output_location: String,
    pub completed_at: DateTime<Utc>,
}

/// A query result loaded into memory.
///
/// Owned by the caller; nothing in the lifecycle keeps a reference to it
/// and the staged files it was read from are gone by the time it is
/// returned.
#[derive(Debug, Clone)]
pub struct ResultTable {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
    pub metadata: QueryMetadata,
}

/// Athena pricing: $5 per TB scanned.
const DOLLARS_PER_BYTE: f64 = 5.0 / (1024.0 * 1024.0 * 1024.0 * 1024.0);

impl ResultTable {
    pub fn new(table: Table, metadata: QueryMetadata) -> Self {
        Self {
            schema: table.schema,
            batches: table.batches,
            metadata,
        }
    }

    /// Returns the number of data rows across all batches.
    pub fn row_count(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn column_count(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.fields().iter().map(|f| f.name().as_str()).collect()
    }

    /// Merge all batches into one.
    pub fn concat(&self) -> Result<RecordBatch, ArrowError> {
        arrow::compute::concat_batches(&self.schema, &self.batches)
    }

    /// Estimates the query cost in USD based on Athena's $5/TB pricing model.
    pub fn cost_estimate_usd(&self) -> f64 {
        self.metadata.bytes_scanned as f64 * DOLLARS_PER_BYTE
    }

    /// Render every cell as text, `NULL` for nulls.
    fn render_rows(&self) -> Result<Vec<Vec<String>>, ArrowError> {
        let options = FormatOptions::default().with_null("NULL");
        let mut rows = Vec::with_capacity(self.row_count());
        for batch in &self.batches {
            let formatters = batch
                .columns()
                .iter()
                .map(|col| ArrayFormatter::try_new(col.as_ref(), &options))
                .collect::<Result<Vec<_>, _>>()?;
            for row in 0..batch.num_rows() {
                rows.push(formatters.iter().map(|f| f.value(row).to_string()).collect());
            }
        }
        Ok(rows)
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.schema.fields().is_empty() {
            return write!(f, "(empty result set)");
        }

        let rows = self.render_rows().map_err(|_| fmt::Error)?;
        let names = self.column_names();

        // Compute column widths (minimum = header length).
        let mut widths: Vec<usize> = names.iter().map(|n| n.len()).collect();
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() && cell.len() > widths[i] {
                    widths[i] = cell.len();
                }
            }
        }

        // Header row.
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{:<width$}", name, width = widths[i])?;
        }
        writeln!(f)?;

        // Separator.
        for (i, w) in widths.iter().enumerate() {
            if i > 0 {
                write!(f, "-+-")?;
            }
            write!(f, "{}", "-".repeat(*w))?;
        }
        writeln!(f)?;

        // Data rows.
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                if i > 0 {
                    write!(f, " | ")?;
                }
                write!(f, "{:<width$}", cell, width = widths[i])?;
            }
            writeln!(f)?;
        }

        // Metadata summary.
        writeln!(f)?;
        write!(
            f,
            "Query {} ({:?}) | {} rows | {:.3} MB scanned | {}ms | ${:.6}",
            self.metadata.query_id,
            self.metadata.state,
            rows.len(),
            self.metadata.bytes_scanned as f64 / (1024.0 * 1024.0),
            self.metadata.execution_time_ms,
            self.cost_estimate_usd(),
        )
    }
}
