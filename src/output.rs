//! Final reporting for a conversion run.
//!
//! Supports the log summary, a JSON report file, and a CSV run history.

use std::fs::{File, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use tracing::{debug, info};

use crate::summary::RunSummary;

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

/// One row of the run history CSV.
#[derive(Debug, Serialize)]
pub struct HistoryRow {
    pub timestamp: DateTime<Utc>,
    pub feeds_total: usize,
    pub corrupted: usize,
    pub no_shapes: usize,
    pub not_dumped: usize,
    pub dumped: usize,
    pub bad_stop_sequences: usize,
    pub elapsed_secs: f64,
}

impl HistoryRow {
    pub fn from_summary(summary: &RunSummary) -> Self {
        Self {
            timestamp: Utc::now(),
            feeds_total: summary.feeds_total,
            corrupted: summary.corrupted(),
            no_shapes: summary.no_shapes,
            not_dumped: summary.not_dumped,
            dumped: summary.dumped,
            bad_stop_sequences: summary.bad_stop_sequences,
            elapsed_secs: summary.elapsed_secs,
        }
    }
}

/// Logs the aggregate counts of a run against `feeds_total`.
pub fn log_summary(summary: &RunSummary) {
    let total = summary.feeds_total;
    let paths: Vec<String> = summary
        .corrupted_paths
        .iter()
        .map(|p| p.display().to_string())
        .collect();

    info!(paths = ?paths, "Corrupted feeds paths");
    info!(
        corrupted = summary.corrupted(),
        total,
        pct = RunSummary::pct(summary.corrupted(), total),
        "Corrupted feeds"
    );
    info!(
        no_shapes = summary.no_shapes,
        total,
        pct = RunSummary::pct(summary.no_shapes, total),
        "Feeds with no shapes"
    );
    info!(
        not_dumped = summary.not_dumped,
        total,
        pct = RunSummary::pct(summary.not_dumped, total),
        "Feeds parsed but not dumped"
    );
    info!(
        dumped = summary.dumped,
        total,
        pct = RunSummary::pct(summary.dumped, total),
        "Total dumped feeds"
    );
    info!(
        bad_stop_sequences = summary.bad_stop_sequences,
        "Bad stop sequences"
    );
    info!(
        processed = summary.processed(),
        elapsed_secs = summary.elapsed_secs,
        "Conversion finished"
    );
}

/// Writes the summary as pretty-printed JSON, stamped with the current time.
pub fn write_report(path: &Path, summary: &RunSummary) -> Result<()> {
    let report = RunReport {
        generated_at: Utc::now(),
        summary,
    };
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, &report)?;
    debug!(path = %path.display(), "Wrote run report");
    Ok(())
}

/// Appends a [`HistoryRow`] to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_history(path: &Path, row: &HistoryRow) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(row)?;
    writer.flush()?;

    Ok(())
}
