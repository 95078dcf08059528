// ABOUTME: Tail reader - fetches the most recent rows of a table in storage order
// ABOUTME: Read failures yield an empty result and are recorded, never propagated

use anyhow::{Context, Result};

use super::error::{describe, SyncError};
use super::row::RowSet;
use super::stats::SyncOutcome;
use super::store::{TableStore, Window};

/// Read the last `limit` rows of `table`.
///
/// The tail is defined by the order the store returns rows in; no ORDER BY is
/// imposed. The count and the fetch are two separate statements, so rows added
/// in between can shift the window slightly.
///
/// On failure an empty `RowSet` (no rows, no columns) is returned and a
/// `TableRead` error is recorded in `outcome`.
pub async fn read_tail<S>(store: &mut S, table: &str, limit: u64, outcome: &mut SyncOutcome) -> RowSet
where
    S: TableStore,
{
    match try_read_tail(store, table, limit).await {
        Ok(rows) => {
            outcome.rows_fetched += rows.len() as u64;
            tracing::info!("Fetched {} rows from table {}", rows.len(), table);
            rows
        }
        Err(e) => {
            tracing::error!("Failed to read tail of table {}: {:?}", table, e);
            outcome.record(SyncError::TableRead {
                table: table.to_string(),
                message: describe(&e),
            });
            RowSet::empty()
        }
    }
}

async fn try_read_tail<S>(store: &mut S, table: &str, limit: u64) -> Result<RowSet>
where
    S: TableStore,
{
    if limit == 0 {
        return Ok(RowSet::empty());
    }

    let total = store
        .count_rows(table)
        .await
        .with_context(|| format!("Failed to count rows in {}", table))?;

    let window = Window::tail(total, limit);
    tracing::debug!(
        "Table {} has {} rows, reading from offset {}",
        table,
        total,
        window.offset
    );

    store
        .fetch_rows(table, &[], window)
        .await
        .with_context(|| format!("Failed to fetch rows from {}", table))
}
