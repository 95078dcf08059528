// ABOUTME: Run and table statistics for tail replication
// ABOUTME: SyncOutcome is per table, RunStatistics aggregates the whole run

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::SyncError;

/// Result of synchronizing one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub table: String,
    /// Rows returned by the tail read
    pub rows_fetched: u64,
    /// Candidates whose fingerprint was not found in the target
    pub rows_novel: u64,
    /// Candidates already present in the target
    pub rows_skipped: u64,
    /// Rows committed to the target
    pub rows_inserted: u64,
    /// Rows whose individual INSERT failed
    pub rows_failed: u64,
    /// Errors that did not stop the table
    pub errors: Vec<SyncError>,
    /// Error that ended the table's processing
    pub terminal_error: Option<SyncError>,
}

impl SyncOutcome {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Default::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.terminal_error.is_some()
    }

    pub fn record(&mut self, error: SyncError) {
        self.errors.push(error);
    }

    pub fn fail(&mut self, error: SyncError) {
        self.terminal_error = Some(error);
    }
}

/// Statistics accumulated over one run.
///
/// Created at run start and finalized exactly once at run end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    pub tables_attempted: usize,
    pub tables_failed: usize,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
    pub errors: Vec<SyncError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunStatistics {
    pub fn start() -> Self {
        Self {
            tables_attempted: 0,
            tables_failed: 0,
            rows_inserted: 0,
            rows_skipped: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Statistics for a run that could not get as far as the table loop.
    pub fn aborted(error: SyncError) -> Self {
        let mut stats = Self::start();
        stats.record(error);
        stats.finish();
        stats
    }

    pub fn record(&mut self, error: SyncError) {
        self.errors.push(error);
    }

    /// Fold a table's outcome into the run totals.
    pub fn absorb(&mut self, outcome: SyncOutcome) {
        self.rows_inserted += outcome.rows_inserted;
        self.rows_skipped += outcome.rows_skipped;
        self.errors.extend(outcome.errors);
        if let Some(err) = outcome.terminal_error {
            self.tables_failed += 1;
            self.errors.push(err);
        }
    }

    /// Stamp the end time. Later calls keep the first timestamp.
    pub fn finish(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }

    /// Check if the run completed without recording any error.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}
