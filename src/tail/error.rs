// ABOUTME: Error taxonomy recorded during a tail replication run
// ABOUTME: Each variant is scoped to the run, one table, or one row

use serde::Serialize;
use thiserror::Error;

/// An error that was caught and recorded rather than propagated.
///
/// Only `Connection`, `CatalogResolution` and `Critical` end a run early; every
/// other variant is scoped to a table or a row and the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncError {
    #[error("Failed to connect to {server}: {message}")]
    Connection { server: String, message: String },

    #[error("Failed to resolve tables to replicate: {message}")]
    CatalogResolution { message: String },

    #[error("Failed to read rows from table {table}: {message}")]
    TableRead { table: String, message: String },

    #[error("Failed to check existing rows in table {table}: {message}")]
    FilterRead { table: String, message: String },

    #[error("Failed to insert row {row} into table {table}: {message}")]
    RowInsert {
        table: String,
        row: usize,
        message: String,
    },

    #[error("Failed to insert rows into table {table}: {message}")]
    BatchCommit { table: String, message: String },

    #[error("Failed to process table {table}: {message}")]
    Table { table: String, message: String },

    #[error("Critical error: {message}")]
    Critical { message: String },
}

impl SyncError {
    /// Table the error is scoped to, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            SyncError::TableRead { table, .. }
            | SyncError::FilterRead { table, .. }
            | SyncError::RowInsert { table, .. }
            | SyncError::BatchCommit { table, .. }
            | SyncError::Table { table, .. } => Some(table),
            SyncError::Connection { .. }
            | SyncError::CatalogResolution { .. }
            | SyncError::Critical { .. } => None,
        }
    }
}

/// Render an anyhow error with its full context chain on one line.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
