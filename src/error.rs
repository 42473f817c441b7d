//! Fatal errors raised before any feed is processed.
//!
//! Per-feed problems never surface here: they are classified, logged and
//! folded into the [`RunSummary`](crate::summary::RunSummary) counters.

use std::path::PathBuf;

use thiserror::Error;

use crate::transit::{MappingError, PaletteError};

/// Configuration-time failures. Any of these aborts the run with a failure
/// exit status and usage guidance.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A required option was not supplied on the command line or environment.
    #[error("missing required option --{0}")]
    MissingOption(&'static str),
    /// A path option does not point at an existing directory.
    #[error("{field} path {path:?} does not exist or is not a directory")]
    NotADirectory { field: &'static str, path: PathBuf },
    /// The feeds root could not be listed.
    #[error("failed to list feed directories in {path:?}: {source}")]
    ScanFeeds {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The feeds root holds no subdirectories.
    #[error("no subdirectories with GTFS feeds found in {0:?}")]
    NoFeeds(PathBuf),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Palette(#[from] PaletteError),
}
