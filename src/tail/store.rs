// ABOUTME: TableStore trait - explicit data access handle for source and target databases
// ABOUTME: Covers the catalog, tail read, full read, and transactional insert contracts

use anyhow::Result;
use async_trait::async_trait;

use super::row::{Row, RowSet};

/// A slice of a table in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    /// `None` reads to the end of the table
    pub limit: Option<u64>,
}

impl Window {
    /// The whole table.
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: None,
        }
    }

    /// The last `limit` rows of a table holding `total` rows.
    pub fn tail(total: u64, limit: u64) -> Self {
        Self {
            offset: total.saturating_sub(limit),
            limit: Some(limit),
        }
    }
}

/// Data access for one database connection.
///
/// The replication core only ever talks to databases through this trait, so the
/// source and target handles are explicit values owned by the caller.
#[async_trait]
pub trait TableStore: Send {
    /// A prepared INSERT statement for one table and column list.
    type Insert: Send + Sync;

    /// Which of `names` exist as base tables owned by the configured owner.
    async fn base_tables(&mut self, names: &[String]) -> Result<Vec<String>>;

    /// Total number of rows in a table.
    async fn count_rows(&mut self, table: &str) -> Result<u64>;

    /// Fetch rows in storage order. An empty `columns` selects every column.
    async fn fetch_rows(&mut self, table: &str, columns: &[String], window: Window)
        -> Result<RowSet>;

    /// Toggle auto-commit mode for subsequent statements.
    async fn set_autocommit(&mut self, enabled: bool) -> Result<()>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Prepare a parameterized INSERT over an explicit column list.
    async fn prepare_insert(&mut self, table: &str, columns: &[String]) -> Result<Self::Insert>;

    /// Insert one row. A failure must leave an open transaction usable.
    async fn insert_row(&mut self, insert: &Self::Insert, row: &Row) -> Result<u64>;
}
