//! The conversion loop over all feed directories.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{error, info, info_span, warn};

use crate::config::ConverterConfig;
use crate::discovery::{FeedDirectory, discover_feeds, extend_path};
use crate::error::ConvertError;
use crate::output;
use crate::parser::GtfsFeed;
use crate::range::RangeGate;
use crate::summary::{FeedOutcome, FeedRecord, RunSummary};
use crate::transit::{ColorPicker, IdGenerator, TransformEngine, WorldFeed};
use crate::validator::{FeedStatus, validate};

/// Walks feed directories in order, validating each and handing valid ones to
/// the transform engine.
pub struct ConversionDriver<'a, E: TransformEngine> {
    engine: &'a mut E,
    gate: RangeGate,
    output_dir: PathBuf,
    persisted_once: bool,
}

impl<'a, E: TransformEngine> ConversionDriver<'a, E> {
    pub fn new(engine: &'a mut E, gate: RangeGate, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            gate,
            output_dir: output_dir.into(),
            persisted_once: false,
        }
    }

    /// Processes `feeds` in order and returns the accumulated counters.
    ///
    /// Per-feed failures never stop the loop; only the stop marker does. The
    /// identifier mapping is flushed once the loop ends.
    pub fn run(&mut self, feeds: &[FeedDirectory]) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::new(feeds.len());

        for (i, dir) in feeds.iter().enumerate() {
            let name = dir.basename();
            let span = info_span!("process_feed", feed = %name, index = dir.index);
            let _enter = span.enter();

            if self.gate.should_skip(&name) {
                info!(path = %dir.path.display(), "Skipped");
                summary.record(FeedRecord {
                    name,
                    path: dir.path.clone(),
                    outcome: FeedOutcome::Skipped,
                    elapsed_secs: 0.0,
                });
                continue;
            }

            let stop = self.gate.is_stop_marker(&name);
            if stop {
                summary.exclude_unvisited(feeds.len() - i - 1);
            }

            let feed_started = Instant::now();
            let outcome = self.process(&dir.path);
            let elapsed_secs = feed_started.elapsed().as_secs_f64();
            info!(?outcome, elapsed_secs, "Feed handled");

            summary.record(FeedRecord {
                name,
                path: dir.path.clone(),
                outcome,
                elapsed_secs,
            });

            if stop {
                break;
            }
        }

        if let Err(e) = self.engine.flush_ids() {
            error!(error = %format!("{e:#}"), "Failed to save id mapping");
        }

        summary.bad_stop_sequences = self.engine.bad_stop_sequences();
        summary.elapsed_secs = started.elapsed().as_secs_f64();
        summary
    }

    fn process(&mut self, path: &Path) -> FeedOutcome {
        let feed_path = extend_path(path);
        info!(path = %feed_path.display(), "Handling feed");

        let mut feed = GtfsFeed::new(feed_path);
        match validate(&mut feed) {
            FeedStatus::NoShapes => return FeedOutcome::NoShapes,
            FeedStatus::Corrupted => return FeedOutcome::Corrupted,
            FeedStatus::Ok => {}
        }

        if !self.engine.ingest(feed) {
            info!("Error transforming feed for json representation");
            return FeedOutcome::NotDumped;
        }

        let overwrite = !self.persisted_once;
        self.persisted_once = true;
        let saved = self.engine.persist(&self.output_dir, overwrite);
        info!(merged = saved, overwrite, "Merged");

        if saved {
            FeedOutcome::Dumped
        } else {
            FeedOutcome::NotDumped
        }
    }
}

/// Runs a full conversion described by `config`.
///
/// # Errors
///
/// Fails before any feed is handled if the feeds root cannot be listed or is
/// empty, or if the id mapping or color palette cannot be loaded.
pub fn run_conversion(config: &ConverterConfig) -> Result<RunSummary, ConvertError> {
    let feeds = discover_feeds(&config.feeds_path).map_err(|source| ConvertError::ScanFeeds {
        path: config.feeds_path.clone(),
        source,
    })?;
    if feeds.is_empty() {
        return Err(ConvertError::NoFeeds(config.feeds_path.clone()));
    }
    info!(count = feeds.len(), root = %config.feeds_path.display(), "Found feed directories");

    let ids = IdGenerator::load(&config.mapping_path)?;
    let colors = ColorPicker::load(&config.resources_path)?;
    let mut engine = WorldFeed::new(ids, colors).with_gzip(config.gzip);

    let gate = RangeGate::new(config.start_feed.clone(), config.stop_feed.clone());
    let summary = ConversionDriver::new(&mut engine, gate, &config.output_path).run(&feeds);

    output::log_summary(&summary);

    if let Some(path) = &config.report_path {
        if let Err(e) = output::write_report(path, &summary) {
            warn!(error = %format!("{e:#}"), "Failed to write run report");
        }
    }
    if let Some(path) = &config.history_path {
        if let Err(e) = output::append_history(path, &output::HistoryRow::from_summary(&summary)) {
            warn!(error = %format!("{e:#}"), "Failed to append run history");
        }
    }

    Ok(summary)
}
