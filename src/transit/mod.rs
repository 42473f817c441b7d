//! Transform/merge of validated feeds into global transit records.
//!
//! [`WorldFeed`] turns a parsed GTFS feed into networks, routes, lines, stops
//! and shapes carrying stable global ids from [`IdGenerator`], with route
//! colors mapped through [`ColorPicker`]. The driver only sees the
//! [`TransformEngine`] trait.

mod colors;
mod ids;
pub mod types;
mod world_feed;

pub use colors::{ColorPicker, PaletteError};
pub use ids::{IdGenerator, IdStage, MappingError};
pub use world_feed::WorldFeed;

use std::path::Path;

use anyhow::Result;

use crate::parser::GtfsFeed;

/// The transform stage the conversion driver hands validated feeds to.
pub trait TransformEngine {
    /// Folds a validated feed in. `false` means the feed could not be merged.
    fn ingest(&mut self, feed: GtfsFeed) -> bool;

    /// Writes the ingested data to `output_dir`, replacing earlier output
    /// when `overwrite` is set.
    fn persist(&mut self, output_dir: &Path, overwrite: bool) -> bool;

    /// Malformed stop sequences seen across every feed ingested so far.
    fn bad_stop_sequences(&self) -> usize;

    /// Saves the accumulated identifier mapping.
    fn flush_ids(&mut self) -> Result<()>;
}
