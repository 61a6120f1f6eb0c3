//! Flat string tables and the writers that put them on disk.
//!
//! Records are flattened into rows of nullable UTF-8 cells (nested payloads
//! become JSON text) and written through a `TableWriter`. Parquet and CSV
//! writers are provided; tests substitute their own.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;

use crate::types::{MappedResponse, MatchRecord};

/// A record that can be flattened into one row of string cells.
pub trait TabularRecord {
    fn columns() -> &'static [&'static str];
    fn cells(&self) -> Vec<Option<String>>;
}

/// Column names plus rows, every cell nullable text.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn from_records<T: TabularRecord>(records: &[T]) -> Self {
        Self {
            columns: T::columns().to_vec(),
            rows: records.iter().map(TabularRecord::cells).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column(&self, idx: usize) -> StringArray {
        StringArray::from(
            self.rows
                .iter()
                .map(|r| r.get(idx).and_then(|c| c.as_deref()))
                .collect::<Vec<_>>(),
        )
    }
}

/// Writes a whole table to `path`, replacing whatever was there.
pub trait TableWriter: Send + Sync {
    /// File extension without the dot.
    fn extension(&self) -> &'static str;
    fn write(&self, path: &Path, table: &Table) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

pub struct ParquetTableWriter;

impl TableWriter for ParquetTableWriter {
    fn extension(&self) -> &'static str {
        "parquet"
    }

    fn write(&self, path: &Path, table: &Table) -> Result<()> {
        let schema = Arc::new(Schema::new(
            table
                .columns
                .iter()
                .map(|name| Field::new(*name, DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ));
        let arrays: Vec<ArrayRef> = (0..table.columns.len())
            .map(|idx| Arc::new(table.column(idx)) as ArrayRef)
            .collect();
        let batch = RecordBatch::try_new(schema.clone(), arrays)
            .context("building record batch")?;

        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = ArrowWriter::try_new(file, schema, None)
            .with_context(|| format!("opening parquet writer {}", path.display()))?;
        writer
            .write(&batch)
            .with_context(|| format!("writing record batch {}", path.display()))?;
        writer
            .close()
            .with_context(|| format!("closing parquet writer {}", path.display()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

pub struct CsvTableWriter;

impl TableWriter for CsvTableWriter {
    fn extension(&self) -> &'static str {
        "csv"
    }

    fn write(&self, path: &Path, table: &Table) -> Result<()> {
        let mut writer =
            csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
        writer
            .write_record(&table.columns)
            .with_context(|| format!("writing header {}", path.display()))?;
        for row in &table.rows {
            writer
                .write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))
                .with_context(|| format!("writing row {}", path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("flushing {}", path.display()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row schemas
// ---------------------------------------------------------------------------

const MATCH_COLUMNS: &[&str] = &[
    "id",
    "query",
    "root_tweet_id",
    "root_user",
    "root_text",
    "root_time",
    "grok_tweet_id",
    "grok_user",
    "grok_displayname",
    "grok_text",
    "grok_time",
    "conversation",
];

impl TabularRecord for MatchRecord {
    fn columns() -> &'static [&'static str] {
        MATCH_COLUMNS
    }

    fn cells(&self) -> Vec<Option<String>> {
        vec![
            Some(self.id.to_string()),
            Some(self.query.clone()),
            self.root_tweet_id.clone(),
            self.root_user.clone(),
            self.root_text.clone(),
            self.root_time.map(|t| t.to_rfc3339()),
            self.grok_tweet_id.clone(),
            self.grok_user.clone(),
            self.grok_displayname.clone(),
            Some(self.grok_text.clone()),
            self.grok_time.map(|t| t.to_rfc3339()),
            Some(self.conversation.to_json_text()),
        ]
    }
}

const RESPONSE_COLUMNS: &[&str] = &[
    "id",
    "timestamp",
    "persona",
    "prompt",
    "raw_response",
    "parsed_lines",
    "mapped_scores",
];

impl TabularRecord for MappedResponse {
    fn columns() -> &'static [&'static str] {
        RESPONSE_COLUMNS
    }

    fn cells(&self) -> Vec<Option<String>> {
        vec![
            Some(self.id.to_string()),
            Some(self.timestamp.to_rfc3339()),
            self.persona.clone(),
            Some(self.prompt.clone()),
            Some(self.raw_response.clone()),
            serde_json::to_string(&self.parsed_lines).ok(),
            serde_json::to_string(&self.mapped_scores).ok(),
        ]
    }
}
