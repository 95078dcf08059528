// ABOUTME: Transactional writer - inserts a row batch into the target in one transaction
// ABOUTME: Per-row failures are isolated; outer failures roll back and credit nothing

use anyhow::{Context, Result};

use super::error::{describe, SyncError};
use super::row::Row;
use super::stats::SyncOutcome;
use super::store::TableStore;

/// Result of inserting a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowInsert {
    Inserted,
    Failed(String),
}

/// Per-row results of one committed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub results: Vec<RowInsert>,
}

impl BatchResult {
    pub fn inserted(&self) -> u64 {
        self.results
            .iter()
            .filter(|r| matches!(r, RowInsert::Inserted))
            .count() as u64
    }

    /// (row index, reason) for every failed row.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &str)> {
        self.results.iter().enumerate().filter_map(|(idx, r)| match r {
            RowInsert::Failed(reason) => Some((idx, reason.as_str())),
            RowInsert::Inserted => None,
        })
    }
}

/// Insert `rows` into `table` and return how many were committed.
///
/// Rows go in one at a time inside a single transaction. A row that fails is
/// recorded and skipped; the batch is committed after every row was tried.
/// If anything outside the per-row handling fails (auto-commit toggle, BEGIN,
/// statement preparation, COMMIT) the transaction is rolled back, the table is
/// marked failed and 0 is returned even if some rows had gone in.
///
/// Auto-commit is restored before returning on every path.
pub async fn write_rows<S>(
    store: &mut S,
    table: &str,
    rows: &[Row],
    columns: &[String],
    outcome: &mut SyncOutcome,
) -> u64
where
    S: TableStore,
{
    if rows.is_empty() {
        tracing::info!("No new rows to insert into table {}", table);
        return 0;
    }

    let inserted = match insert_batch(store, table, rows, columns).await {
        Ok(batch) => {
            for (idx, reason) in batch.failures() {
                outcome.rows_failed += 1;
                outcome.record(SyncError::RowInsert {
                    table: table.to_string(),
                    row: idx + 1,
                    message: reason.to_string(),
                });
            }
            let inserted = batch.inserted();
            outcome.rows_inserted = inserted;
            tracing::info!("Inserted {} rows into table {}", inserted, table);
            inserted
        }
        Err(e) => {
            if let Err(rollback_err) = store.rollback().await {
                tracing::warn!(
                    "Rollback of table {} failed: {:?}",
                    table,
                    rollback_err
                );
            }
            tracing::error!("Failed to insert rows into table {}: {:?}", table, e);
            outcome.fail(SyncError::BatchCommit {
                table: table.to_string(),
                message: describe(&e),
            });
            0
        }
    };

    if let Err(e) = store.set_autocommit(true).await {
        tracing::warn!("Failed to restore auto-commit after writing {}: {:?}", table, e);
    }

    inserted
}

async fn insert_batch<S>(
    store: &mut S,
    table: &str,
    rows: &[Row],
    columns: &[String],
) -> Result<BatchResult>
where
    S: TableStore,
{
    store
        .set_autocommit(false)
        .await
        .context("Failed to disable auto-commit")?;
    store.begin().await.context("Failed to begin transaction")?;

    let insert = store
        .prepare_insert(table, columns)
        .await
        .with_context(|| format!("Failed to prepare INSERT for {}", table))?;

    let mut batch = BatchResult::default();
    for (idx, row) in rows.iter().enumerate() {
        let result = match store.insert_row(&insert, row).await {
            Ok(_) => RowInsert::Inserted,
            Err(e) => {
                tracing::warn!("Failed to insert row {} into {}: {:#}", idx + 1, table, e);
                RowInsert::Failed(describe(&e))
            }
        };
        batch.results.push(result);
    }

    store
        .commit()
        .await
        .with_context(|| format!("Failed to commit inserts into {}", table))?;

    Ok(batch)
}
