use std::path::PathBuf;

use serde::Serialize;

/// What happened to one feed directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedOutcome {
    Skipped,
    NoShapes,
    Corrupted,
    NotDumped,
    Dumped,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedRecord {
    pub name: String,
    pub path: PathBuf,
    pub outcome: FeedOutcome,
    pub elapsed_secs: f64,
}

/// Counters accumulated over one conversion run.
///
/// `feeds_total` starts at the number of discovered directories. A skipped
/// feed adds one; a stop marker removes the directories after it.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub feeds_total: usize,
    pub corrupted_paths: Vec<PathBuf>,
    pub no_shapes: usize,
    pub not_dumped: usize,
    pub dumped: usize,
    pub bad_stop_sequences: usize,
    pub elapsed_secs: f64,
    pub feeds: Vec<FeedRecord>,
}

impl RunSummary {
    pub fn new(feeds_total: usize) -> Self {
        Self {
            feeds_total,
            ..Default::default()
        }
    }

    /// Folds one feed's outcome into the counters.
    pub fn record(&mut self, record: FeedRecord) {
        match record.outcome {
            FeedOutcome::Skipped => self.feeds_total += 1,
            FeedOutcome::NoShapes => self.no_shapes += 1,
            FeedOutcome::Corrupted => self.corrupted_paths.push(record.path.clone()),
            FeedOutcome::NotDumped => self.not_dumped += 1,
            FeedOutcome::Dumped => self.dumped += 1,
        }
        self.feeds.push(record);
    }

    /// Drops the directories after a stop marker from the denominator.
    pub fn exclude_unvisited(&mut self, count: usize) {
        self.feeds_total = self.feeds_total.saturating_sub(count);
    }

    pub fn corrupted(&self) -> usize {
        self.corrupted_paths.len()
    }

    /// Feeds that went through validation (everything except skips).
    pub fn processed(&self) -> usize {
        self.feeds
            .iter()
            .filter(|f| f.outcome != FeedOutcome::Skipped)
            .count()
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }
}
