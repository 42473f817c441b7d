//! Command-line configuration for a conversion run.
//!
//! Required paths are optional at the clap layer so that a missing value is
//! reported as a [`ConvertError`] with usage guidance instead of a clap abort.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::error::ConvertError;

#[derive(Debug, Parser)]
#[command(name = "gtfs_converter")]
#[command(
    about = "Reads GTFS feeds, produces json with global ids for generator.",
    long_about = None
)]
pub struct ConverterArgs {
    /// Path to the mapping file of transit ids to GTFS keys
    #[arg(long, env = "GTFS_MAPPING_PATH", value_name = "FILE")]
    pub path_mapping: Option<PathBuf>,

    /// Directory with GTFS feeds subdirectories
    #[arg(long, env = "GTFS_FEEDS_PATH", value_name = "DIR")]
    pub path_gtfs_feeds: Option<PathBuf>,

    /// Output directory for dumping json files
    #[arg(long, env = "GTFS_OUTPUT_PATH", value_name = "DIR")]
    pub path_json: Option<PathBuf>,

    /// Resources directory holding transit_colors.json
    #[arg(long, env = "GTFS_RESOURCES_PATH", value_name = "DIR")]
    pub path_resources: Option<PathBuf>,

    /// Optional. Feed directory from which the process continues
    #[arg(long, env = "GTFS_START_FEED")]
    pub start_feed: Option<String>,

    /// Optional. Feed directory on which to stop the process
    #[arg(long, env = "GTFS_STOP_FEED")]
    pub stop_feed: Option<String>,

    /// Gzip compress the json output files
    #[arg(long, default_value_t = false)]
    pub gzip: bool,

    /// Optional: write the run summary as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Optional: append one CSV row with the run counters to this file
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,
}

/// Validated settings for a single run.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub mapping_path: PathBuf,
    pub feeds_path: PathBuf,
    pub output_path: PathBuf,
    pub resources_path: PathBuf,
    pub start_feed: Option<String>,
    pub stop_feed: Option<String>,
    pub gzip: bool,
    pub report_path: Option<PathBuf>,
    pub history_path: Option<PathBuf>,
}

impl ConverterArgs {
    /// Checks that every required option is present and that the directory
    /// options point at existing directories.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::MissingOption`] or
    /// [`ConvertError::NotADirectory`] for the first violation found.
    pub fn into_config(self) -> Result<ConverterConfig, ConvertError> {
        let mapping_path = required(self.path_mapping, "path-mapping")?;
        let feeds_path = required(self.path_gtfs_feeds, "path-gtfs-feeds")?;
        let output_path = required(self.path_json, "path-json")?;
        let resources_path = required(self.path_resources, "path-resources")?;

        ensure_dir(&feeds_path, "path-gtfs-feeds")?;
        ensure_dir(&output_path, "path-json")?;
        ensure_dir(&resources_path, "path-resources")?;

        Ok(ConverterConfig {
            mapping_path,
            feeds_path,
            output_path,
            resources_path,
            start_feed: non_empty(self.start_feed),
            stop_feed: non_empty(self.stop_feed),
            gzip: self.gzip,
            report_path: self.report,
            history_path: self.history,
        })
    }
}

fn required(value: Option<PathBuf>, field: &'static str) -> Result<PathBuf, ConvertError> {
    value
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(ConvertError::MissingOption(field))
}

fn ensure_dir(path: &Path, field: &'static str) -> Result<(), ConvertError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ConvertError::NotADirectory {
            field,
            path: path.to_path_buf(),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
