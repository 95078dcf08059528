// ABOUTME: Table synchronizer - runs tail read, existence filter and writer for one table
// ABOUTME: Produces a SyncOutcome; never propagates errors to the run

use super::filter::novel_rows;
use super::reader::read_tail;
use super::stats::SyncOutcome;
use super::store::TableStore;
use super::writer::write_rows;

/// Copy the new rows among the last `limit` rows of `table` from `source` to `target`.
///
/// Stage errors are recorded in the returned outcome. A table whose tail read
/// comes back empty is finished without touching the target.
pub async fn sync_table<S, T>(table: &str, source: &mut S, target: &mut T, limit: u64) -> SyncOutcome
where
    S: TableStore,
    T: TableStore,
{
    let mut outcome = SyncOutcome::new(table);

    let candidates = read_tail(source, table, limit, &mut outcome).await;
    if candidates.is_empty() {
        tracing::info!("No rows found in table {}", table);
        return outcome;
    }

    let columns = candidates.columns.clone();
    let novel = novel_rows(target, table, candidates, &mut outcome).await;
    write_rows(target, table, &novel, &columns, &mut outcome).await;

    if outcome.is_failed() {
        tracing::warn!("Table {} failed, no rows credited", table);
    } else {
        tracing::info!(
            "Table {} synced: {} fetched, {} new, {} inserted, {} already present",
            table,
            outcome.rows_fetched,
            outcome.rows_novel,
            outcome.rows_inserted,
            outcome.rows_skipped
        );
    }

    outcome
}
