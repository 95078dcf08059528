// ABOUTME: End-of-run report - renders RunStatistics as text and JSON
// ABOUTME: Appends the report to a dated file, logs it, and prints a short summary

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::tail::RunStatistics;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Render the full report block.
pub fn render(stats: &RunStatistics) -> String {
    let finished = stats
        .finished_at
        .map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| "(not finished)".to_string());

    let mut text = format!(
        "\n=== TAIL REPLICATION REPORT ===\n\
         Started:  {}\n\
         Finished: {}\n\
         Duration: {}\n\
         \n\
         Tables processed: {}\n\
         Tables failed:    {}\n\
         Rows copied:      {}\n\
         Rows skipped (already present): {}\n\
         \n\
         Errors: {}\n",
        stats.started_at.format(TIME_FORMAT),
        finished,
        format_duration(stats.duration()),
        stats.tables_attempted,
        stats.tables_failed,
        stats.rows_inserted,
        stats.rows_skipped,
        stats.errors.len(),
    );

    if !stats.errors.is_empty() {
        text.push_str("\nError details:\n");
        for (i, err) in stats.errors.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", i + 1, err));
        }
    }
    text
}

/// Format a duration as `HH:MM:SS.mmm`.
pub fn format_duration(duration: chrono::Duration) -> String {
    let millis = duration.num_milliseconds().max(0);
    let (secs, millis) = (millis / 1000, millis % 1000);
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        millis
    )
}

/// Path of the report file for `date` inside `dir`.
pub fn report_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("report_{}.txt", date.format("%d-%m-%Y")))
}

/// Append `text` to today's report file in `dir`, creating the directory if needed.
pub fn append(dir: &Path, text: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory {}", dir.display()))?;

    let path = report_path(dir, Local::now().date_naive());
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open report file {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("Failed to write report file {}", path.display()))?;

    Ok(path)
}

/// Statistics as pretty-printed JSON.
pub fn to_json(stats: &RunStatistics) -> Result<String> {
    serde_json::to_string_pretty(stats).context("Failed to serialize run statistics")
}

/// Log, persist, and summarize a finished run.
///
/// Persistence failures are logged and otherwise ignored. Returns the report
/// file path when it was written.
pub fn emit(stats: &RunStatistics, dir: Result<PathBuf>, json: bool) -> Option<PathBuf> {
    let text = render(stats);
    tracing::info!("{}", text);

    let saved = dir.and_then(|dir| append(&dir, &text));
    let path = match saved {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::error!("Failed to save report: {:?}", e);
            None
        }
    };

    println!();
    println!("Summary:");
    println!("  Tables processed: {}", stats.tables_attempted);
    println!("  Rows copied:      {}", stats.rows_inserted);
    println!("  Errors:           {}", stats.errors.len());
    if let Some(path) = &path {
        println!("  Full report saved to: {}", path.display());
    }

    if json {
        match to_json(stats) {
            Ok(out) => println!("{}", out),
            Err(e) => tracing::error!("{:?}", e),
        }
    }

    path
}
