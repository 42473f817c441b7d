//! Resume/halt control over the ordered feed list.

use tracing::info;

/// Start-at / stop-after filter, matched on feed basenames by exact equality.
///
/// Once the start marker has been seen the gate never skips again, even for a
/// later feed sharing the same basename.
#[derive(Debug, Clone)]
pub struct RangeGate {
    start: Option<String>,
    stop: Option<String>,
    passing: bool,
}

impl RangeGate {
    pub fn new(start: Option<String>, stop: Option<String>) -> Self {
        let start = start.filter(|s| !s.is_empty());
        let stop = stop.filter(|s| !s.is_empty());
        Self {
            passing: start.is_some(),
            start,
            stop,
        }
    }

    /// Returns `true` while the start marker has not been reached yet.
    pub fn should_skip(&mut self, basename: &str) -> bool {
        let Some(start) = &self.start else {
            return false;
        };
        if !self.passing {
            return false;
        }
        if basename != start {
            return true;
        }
        self.passing = false;
        false
    }

    /// Returns `true` if `basename` is the configured stop marker.
    pub fn is_stop_marker(&self, basename: &str) -> bool {
        match &self.stop {
            Some(stop) if stop == basename => {
                info!(feed = basename, "Stop on feed");
                true
            }
            _ => false,
        }
    }
}
