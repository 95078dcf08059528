// ABOUTME: In-memory TableStore used by the replication unit tests
// ABOUTME: Supports transactions, a unique-column constraint, and injected failures

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};

use super::row::{Row, RowSet, Value};
use super::store::{TableStore, Window};

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Column index whose values must be unique
    pub unique: Option<usize>,
}

#[derive(Debug)]
pub struct MemoryInsert {
    table: String,
    positions: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub tables: BTreeMap<String, MemoryTable>,
    /// Relations that exist but are not base tables (views)
    pub views: HashSet<String>,
    pub autocommit: bool,
    pending: Option<Vec<(String, Row)>>,
    pub fail_catalog: bool,
    pub fail_count: HashSet<String>,
    pub fail_fetch: HashSet<String>,
    pub fail_prepare: bool,
    pub fail_commit: bool,
    pub panic_on_count: HashSet<String>,
    pub panic_on_catalog: bool,
    /// Panic once, when inserting the row at this zero-based position of a batch
    pub panic_on_insert: Option<usize>,
    inserts_attempted: usize,
    /// Transaction control calls in order
    pub calls: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            autocommit: true,
            ..Default::default()
        }
    }

    pub fn with_table(mut self, name: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
                unique: None,
            },
        );
        self
    }

    pub fn with_unique(mut self, name: &str, column: usize) -> Self {
        if let Some(table) = self.tables.get_mut(name) {
            table.unique = Some(column);
        }
        self
    }

    pub fn rows(&self, name: &str) -> &[Row] {
        self.tables
            .get(name)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
    }

    pub fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }

    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| anyhow!("relation \"{}\" does not exist", name))
    }

    fn violates_unique(&self, name: &str, row: &Row) -> Result<bool> {
        let table = self.table(name)?;
        let Some(col) = table.unique else {
            return Ok(false);
        };
        let value = &row.values()[col];
        let committed = table.rows.iter().any(|r| &r.values()[col] == value);
        let pending = self.pending.iter().flatten().any(|(t, r)| t == name && &r.values()[col] == value);
        Ok(committed || pending)
    }
}

/// Build rows of `(id, name)` with ids in `range`.
pub fn numbered_rows(range: std::ops::Range<i32>) -> Vec<Row> {
    range
        .map(|i| Row::new(vec![Value::I32(i), Value::Text(format!("row-{}", i))]))
        .collect()
}

#[async_trait]
impl TableStore for MemoryStore {
    type Insert = MemoryInsert;

    async fn base_tables(&mut self, names: &[String]) -> Result<Vec<String>> {
        if self.panic_on_catalog {
            panic!("catalog lookup crashed");
        }
        if self.fail_catalog {
            bail!("catalog unavailable");
        }
        Ok(names
            .iter()
            .filter(|n| self.tables.contains_key(*n) && !self.views.contains(*n))
            .cloned()
            .collect())
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64> {
        if self.panic_on_count.contains(table) {
            panic!("unexpected failure counting {}", table);
        }
        if self.fail_count.contains(table) {
            bail!("permission denied for table {}", table);
        }
        Ok(self.table(table)?.rows.len() as u64)
    }

    async fn fetch_rows(
        &mut self,
        table: &str,
        columns: &[String],
        window: Window,
    ) -> Result<RowSet> {
        if self.fail_fetch.contains(table) {
            bail!("could not read table {}", table);
        }
        let t = self.table(table)?;
        let positions: Vec<usize> = if columns.is_empty() {
            (0..t.columns.len()).collect()
        } else {
            columns
                .iter()
                .map(|c| {
                    t.columns
                        .iter()
                        .position(|tc| tc == c)
                        .ok_or_else(|| anyhow!("column \"{}\" does not exist", c))
                })
                .collect::<Result<_>>()?
        };
        let names = positions.iter().map(|&p| t.columns[p].clone()).collect();
        let limit = window.limit.unwrap_or(u64::MAX) as usize;
        let rows = t
            .rows
            .iter()
            .skip(window.offset as usize)
            .take(limit)
            .map(|r| Row::new(positions.iter().map(|&p| r.values()[p].clone()).collect()))
            .collect();
        Ok(RowSet::new(names, rows))
    }

    async fn set_autocommit(&mut self, enabled: bool) -> Result<()> {
        self.calls.push(format!("autocommit={}", enabled));
        if enabled && self.pending.take().is_some() {
            self.calls.push("rollback".to_string());
        }
        self.autocommit = enabled;
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        self.calls.push("begin".to_string());
        self.pending = Some(Vec::new());
        self.inserts_attempted = 0;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.calls.push("commit".to_string());
        if self.fail_commit {
            bail!("could not serialize access");
        }
        for (table, row) in self.pending.take().unwrap_or_default() {
            if let Some(t) = self.tables.get_mut(&table) {
                t.rows.push(row);
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.calls.push("rollback".to_string());
        self.pending = None;
        Ok(())
    }

    async fn prepare_insert(&mut self, table: &str, columns: &[String]) -> Result<MemoryInsert> {
        if self.fail_prepare {
            bail!("syntax error at or near \"INSERT\"");
        }
        let t = self.table(table)?;
        let positions = columns
            .iter()
            .map(|c| {
                t.columns
                    .iter()
                    .position(|tc| tc == c)
                    .ok_or_else(|| anyhow!("column \"{}\" does not exist", c))
            })
            .collect::<Result<_>>()?;
        Ok(MemoryInsert {
            table: table.to_string(),
            positions,
        })
    }

    async fn insert_row(&mut self, insert: &MemoryInsert, row: &Row) -> Result<u64> {
        let position = self.inserts_attempted;
        self.inserts_attempted += 1;
        if self.panic_on_insert == Some(position) {
            self.panic_on_insert = None;
            panic!("connection lost while inserting into {}", insert.table);
        }
        let width = self.table(&insert.table)?.columns.len();
        if row.len() != insert.positions.len() {
            bail!(
                "INSERT has {} expressions but {} target columns",
                row.len(),
                insert.positions.len()
            );
        }
        let mut values = vec![Value::Null; width];
        for (value, &pos) in row.values().iter().zip(&insert.positions) {
            values[pos] = value.clone();
        }
        let full = Row::new(values);
        if self.violates_unique(&insert.table, &full)? {
            bail!("duplicate key value violates unique constraint");
        }
        match self.pending.as_mut() {
            Some(pending) => pending.push((insert.table.clone(), full)),
            None => {
                if let Some(t) = self.tables.get_mut(&insert.table) {
                    t.rows.push(full);
                }
            }
        }
        Ok(1)
    }
}
