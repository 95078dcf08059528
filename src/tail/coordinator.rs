// ABOUTME: Run coordinator - resolves eligible tables and syncs them one at a time
// ABOUTME: Always returns finalized RunStatistics, even when resolution or a table fails

use anyhow::{Context, Result};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

use super::error::{describe, SyncError};
use super::stats::{RunStatistics, SyncOutcome};
use super::store::TableStore;
use super::table::sync_table;

/// Default number of tail rows read per table.
pub const DEFAULT_TAIL_LIMIT: u64 = 100;

/// Observer for per-table progress during a run.
pub trait Progress {
    fn tables_resolved(&mut self, _tables: &[String]) {}
    fn table_started(&mut self, _table: &str) {}
    fn table_finished(&mut self, _outcome: &SyncOutcome) {}
}

impl Progress for () {}

/// Names from `candidates` that exist as base tables in both `source` and `target`.
///
/// The target is only asked about tables the source already has. The result
/// keeps the order of `candidates`.
pub async fn resolve_eligible<S, T>(
    candidates: &[String],
    source: &mut S,
    target: &mut T,
) -> Result<Vec<String>>
where
    S: TableStore,
    T: TableStore,
{
    let in_source = source
        .base_tables(candidates)
        .await
        .context("Failed to list tables in source")?;
    if in_source.is_empty() {
        tracing::warn!("None of the configured tables exist in the source database");
        return Ok(Vec::new());
    }

    let in_source: Vec<String> = candidates
        .iter()
        .filter(|name| in_source.contains(name))
        .cloned()
        .collect();

    let in_target = target
        .base_tables(&in_source)
        .await
        .context("Failed to list tables in target")?;

    for name in in_source.iter().filter(|name| !in_target.contains(name)) {
        tracing::warn!("Skipping table {}: not present in target", name);
    }

    Ok(in_source
        .into_iter()
        .filter(|name| in_target.contains(name))
        .collect())
}

/// Run one replication pass over `table_names`.
///
/// Tables are processed sequentially in configured order. A table that fails
/// (including by panicking) is counted as failed and the next table is still
/// attempted. The returned statistics are always finalized.
pub async fn run<S, T, P>(
    table_names: &[String],
    source: &mut S,
    target: &mut T,
    tail_limit: u64,
    progress: &mut P,
) -> RunStatistics
where
    S: TableStore,
    T: TableStore,
    P: Progress,
{
    let mut stats = RunStatistics::start();

    let resolved = AssertUnwindSafe(resolve_eligible(table_names, &mut *source, &mut *target))
        .catch_unwind()
        .await;

    match resolved {
        Ok(Ok(eligible)) => {
            stats.tables_attempted = eligible.len();
            progress.tables_resolved(&eligible);
            if eligible.is_empty() {
                tracing::warn!("No tables available to replicate");
            }
            for table in &eligible {
                progress.table_started(table);
                let outcome = sync_guarded(table, source, target, tail_limit).await;
                progress.table_finished(&outcome);
                stats.absorb(outcome);
            }
        }
        Ok(Err(e)) => {
            tracing::error!("Failed to resolve tables: {:?}", e);
            stats.record(SyncError::CatalogResolution {
                message: describe(&e),
            });
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!("Unexpected failure while resolving tables: {}", message);
            stats.record(SyncError::Critical { message });
        }
    }

    stats.finish();
    stats
}

async fn sync_guarded<S, T>(table: &str, source: &mut S, target: &mut T, tail_limit: u64) -> SyncOutcome
where
    S: TableStore,
    T: TableStore,
{
    let result = AssertUnwindSafe(sync_table(table, &mut *source, &mut *target, tail_limit))
        .catch_unwind()
        .await;

    match result {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!("Unexpected failure while processing table {}: {}", table, message);

            // Leave the target connection usable for the next table
            if let Err(e) = target.set_autocommit(true).await {
                tracing::warn!("Failed to reset target session after {}: {:?}", table, e);
            }

            let mut outcome = SyncOutcome::new(table);
            outcome.fail(SyncError::Table {
                table: table.to_string(),
                message,
            });
            outcome
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tail::memory::{numbered_rows, MemoryStore};

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn store_with(tables: &[&str], rows: i32) -> MemoryStore {
        tables.iter().fold(MemoryStore::new(), |store, t| {
            store.with_table(t, &["id", "name"], numbered_rows(0..rows))
        })
    }

    #[derive(Default)]
    struct Recorder {
        resolved: Vec<String>,
        started: Vec<String>,
        finished: Vec<String>,
    }

    impl Progress for Recorder {
        fn tables_resolved(&mut self, tables: &[String]) {
            self.resolved = tables.to_vec();
        }
        fn table_started(&mut self, table: &str) {
            self.started.push(table.to_string());
        }
        fn table_finished(&mut self, outcome: &SyncOutcome) {
            self.finished.push(outcome.table.clone());
        }
    }

    #[tokio::test]
    async fn test_eligibility_is_intersection() {
        let mut source = store_with(&["a", "b"], 1);
        let mut target = store_with(&["b", "c"], 1);

        let eligible = resolve_eligible(&names(&["a", "b", "c"]), &mut source, &mut target)
            .await
            .unwrap();

        assert_eq!(eligible, names(&["b"]));
    }

    #[tokio::test]
    async fn test_views_are_not_eligible() {
        let mut source = store_with(&["a", "b"], 1);
        source.views.insert("a".to_string());
        let mut target = store_with(&["a", "b"], 1);

        let eligible = resolve_eligible(&names(&["a", "b"]), &mut source, &mut target)
            .await
            .unwrap();

        assert_eq!(eligible, names(&["b"]));
    }

    #[tokio::test]
    async fn test_eligible_keeps_configured_order() {
        let mut source = store_with(&["a", "b", "c"], 1);
        let mut target = store_with(&["a", "b", "c"], 1);

        let eligible = resolve_eligible(&names(&["c", "a", "b"]), &mut source, &mut target)
            .await
            .unwrap();

        assert_eq!(eligible, names(&["c", "a", "b"]));
    }

    #[tokio::test]
    async fn test_run_with_no_eligible_tables() {
        let mut source = store_with(&["a"], 3);
        let mut target = store_with(&["b"], 0);

        let stats = run(&names(&["a", "b"]), &mut source, &mut target, 100, &mut ()).await;

        assert_eq!(stats.tables_attempted, 0);
        assert!(stats.is_success());
        assert!(stats.is_finished());
    }

    #[tokio::test]
    async fn test_run_aggregates_tables() {
        let mut source = store_with(&["a", "b"], 10);
        let mut target = store_with(&["a", "b"], 4);
        let mut recorder = Recorder::default();

        let stats = run(&names(&["a", "b"]), &mut source, &mut target, 100, &mut recorder).await;

        assert_eq!(stats.tables_attempted, 2);
        assert_eq!(stats.tables_failed, 0);
        assert_eq!(stats.rows_inserted, 12);
        assert_eq!(stats.rows_skipped, 8);
        assert_eq!(recorder.resolved, names(&["a", "b"]));
        assert_eq!(recorder.started, names(&["a", "b"]));
        assert_eq!(recorder.finished, names(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_run_continues_after_table_panics() {
        let mut source = store_with(&["a", "b"], 3);
        source.panic_on_count.insert("a".to_string());
        let mut target = store_with(&["a", "b"], 0);

        let stats = run(&names(&["a", "b"]), &mut source, &mut target, 100, &mut ()).await;

        assert_eq!(stats.tables_attempted, 2);
        assert_eq!(stats.tables_failed, 1);
        assert_eq!(stats.rows_inserted, 3);
        assert_eq!(target.rows("b").len(), 3);
        assert!(matches!(
            &stats.errors[0],
            SyncError::Table { table, .. } if table == "a"
        ));
    }

    #[tokio::test]
    async fn test_panic_mid_batch_leaves_no_open_transaction() {
        let mut source = store_with(&["a"], 5);
        let mut target = store_with(&["a"], 0);
        target.panic_on_insert = Some(2);

        let stats = run(&names(&["a"]), &mut source, &mut target, 100, &mut ()).await;

        assert!(!target.in_transaction());
        assert!(target.autocommit);
        assert!(target.rows("a").is_empty());
        assert_eq!(
            target.calls,
            vec!["autocommit=false", "begin", "autocommit=true", "rollback"]
        );
        assert_eq!(stats.tables_failed, 1);
        assert!(matches!(
            &stats.errors[0],
            SyncError::Table { table, .. } if table == "a"
        ));
    }

    #[tokio::test]
    async fn test_catalog_panic_still_finalizes() {
        let mut source = store_with(&["a"], 3);
        source.panic_on_catalog = true;
        let mut target = store_with(&["a"], 0);

        let stats = run(&names(&["a"]), &mut source, &mut target, 100, &mut ()).await;

        assert!(stats.is_finished());
        assert_eq!(stats.tables_attempted, 0);
        assert!(matches!(stats.errors[0], SyncError::Critical { .. }));
    }

    #[tokio::test]
    async fn test_catalog_failure_still_finalizes() {
        let mut source = store_with(&["a"], 3);
        source.fail_catalog = true;
        let mut target = store_with(&["a"], 0);

        let stats = run(&names(&["a"]), &mut source, &mut target, 100, &mut ()).await;

        assert!(stats.is_finished());
        assert_eq!(stats.tables_attempted, 0);
        assert!(matches!(
            stats.errors[0],
            SyncError::CatalogResolution { .. }
        ));
    }
}
