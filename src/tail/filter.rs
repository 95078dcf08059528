// ABOUTME: Existence filter - keeps only candidate rows not already present in the target
// ABOUTME: Compares row fingerprints against the full target table; fails open on read errors

use anyhow::Context;
use std::collections::HashSet;

use super::error::{describe, SyncError};
use super::fingerprint::{fingerprint, Fingerprint};
use super::row::{Row, RowSet};
use super::stats::SyncOutcome;
use super::store::{TableStore, Window};

/// Return the candidates whose fingerprint is absent from `table` in `store`.
///
/// Reads the entire target table (projected onto the candidate columns so both
/// sides fingerprint the same column order), so cost grows with the target
/// table's size. Candidate order is preserved.
///
/// If the target cannot be read, every candidate is returned and a
/// `FilterRead` error is recorded: inserting a duplicate is preferred over
/// silently dropping new rows.
pub async fn novel_rows<S>(
    store: &mut S,
    table: &str,
    candidates: RowSet,
    outcome: &mut SyncOutcome,
) -> Vec<Row>
where
    S: TableStore,
{
    if candidates.is_empty() {
        return Vec::new();
    }

    let existing = match store
        .fetch_rows(table, &candidates.columns, Window::all())
        .await
        .with_context(|| format!("Failed to read existing rows from {}", table))
    {
        Ok(existing) => existing,
        Err(e) => {
            tracing::error!(
                "Failed to check existing rows in table {}, treating all {} rows as new: {:?}",
                table,
                candidates.len(),
                e
            );
            outcome.record(SyncError::FilterRead {
                table: table.to_string(),
                message: describe(&e),
            });
            outcome.rows_novel = candidates.len() as u64;
            return candidates.rows;
        }
    };

    let present: HashSet<Fingerprint> = existing.rows.iter().map(fingerprint).collect();
    let total = candidates.len();
    let novel: Vec<Row> = candidates
        .rows
        .into_iter()
        .filter(|row| !present.contains(&fingerprint(row)))
        .collect();

    let skipped = (total - novel.len()) as u64;
    outcome.rows_novel = novel.len() as u64;
    outcome.rows_skipped += skipped;

    tracing::info!(
        "Table {}: {} new rows, {} already present ({} rows in target)",
        table,
        novel.len(),
        skipped,
        existing.len()
    );

    novel
}
