// ABOUTME: Sync command - one tail replication pass from source to target
// ABOUTME: Connects both databases, runs the coordinator, and always emits a report

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use super::RunArgs;
use crate::config::{ConnectionDescriptor, ReplicationConfig};
use crate::postgres::PgStore;
use crate::report;
use crate::tail::error::describe;
use crate::tail::{self, Progress, RunStatistics, SyncError, SyncOutcome};

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub run: RunArgs,
    /// Number of most recent rows to read from each source table (default: 100)
    #[arg(long)]
    pub tail_limit: Option<u64>,
    /// Directory for the end-of-run report (default: ~/.tail-replicator/reports)
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
    /// Also print run statistics as JSON
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    fn resolve(&self) -> Result<ReplicationConfig> {
        let mut overrides = self.run.overrides();
        overrides.tail_limit = self.tail_limit;
        overrides.report_dir = self.report_dir.clone();
        self.run.resolve_with(overrides)
    }
}

/// Run one replication pass.
///
/// # Returns
///
/// `Ok(true)` when the run recorded no errors, `Ok(false)` otherwise. The
/// report is emitted in both cases. Configuration problems are returned as
/// errors before anything connects.
pub async fn sync(args: SyncArgs) -> Result<bool> {
    let config = args.resolve()?;

    tracing::info!(
        "Starting tail replication of {} table(s): {}",
        config.tables.len(),
        config.tables.join(", ")
    );
    tracing::info!(
        "Source: {} | Target: {} | Tail limit: {}",
        config.source.label(),
        config.target.label(),
        config.tail_limit
    );

    let stats = replicate(&config).await;
    report::emit(&stats, config.report_dir(), args.json);

    if stats.is_success() {
        tracing::info!("Tail replication completed without errors");
    } else {
        tracing::warn!(
            "Tail replication completed with {} error(s)",
            stats.errors.len()
        );
    }
    Ok(stats.is_success())
}

/// Connect, run, and disconnect. Connections are closed on every path.
async fn replicate(config: &ReplicationConfig) -> RunStatistics {
    let owner = config.owner.as_deref();

    let mut source = match PgStore::connect(&config.source, &config.schema, owner).await {
        Ok(store) => store,
        Err(e) => return connection_failed(&config.source, e),
    };
    let mut target = match PgStore::connect(&config.target, &config.schema, owner).await {
        Ok(store) => store,
        Err(e) => {
            source.close().await;
            return connection_failed(&config.target, e);
        }
    };

    let mut progress = TableProgress::new();
    let stats = tail::run(
        &config.tables,
        &mut source,
        &mut target,
        config.tail_limit,
        &mut progress,
    )
    .await;
    progress.finish(&stats);

    source.close().await;
    target.close().await;
    stats
}

fn connection_failed(descriptor: &ConnectionDescriptor, e: anyhow::Error) -> RunStatistics {
    tracing::error!("Critical failure connecting to {}: {:?}", descriptor.label(), e);
    RunStatistics::aborted(SyncError::Connection {
        server: descriptor.label(),
        message: describe(&e),
    })
}

/// Progress bar over the eligible tables with one line per finished table.
struct TableProgress {
    bar: ProgressBar,
}

impl TableProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar }
    }

    fn finish(&self, stats: &RunStatistics) {
        self.bar.finish_with_message(format!(
            "done ({} copied, {} skipped)",
            stats.rows_inserted, stats.rows_skipped
        ));
    }
}

impl Progress for TableProgress {
    fn tables_resolved(&mut self, tables: &[String]) {
        self.bar.set_length(tables.len() as u64);
        if tables.is_empty() {
            self.bar
                .println("No tables available to replicate. Check the configured table names.");
        }
    }

    fn table_started(&mut self, table: &str) {
        self.bar.set_message(format!("copying {}", table));
    }

    fn table_finished(&mut self, outcome: &SyncOutcome) {
        let line = match &outcome.terminal_error {
            Some(err) => format!("{}: failed - {}", outcome.table, err),
            None => format!(
                "{}: {} inserted, {} already present",
                outcome.table, outcome.rows_inserted, outcome.rows_skipped
            ),
        };
        self.bar.println(line);
        self.bar.inc(1);
    }
}
