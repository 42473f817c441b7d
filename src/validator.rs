//! Parse-and-classify sequence for one feed directory.

use tracing::{debug, info, warn};

use crate::parser::{FeedFiles, FileKind};

/// Classification of a feed after its files have been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Ok,
    Corrupted,
    NoShapes,
}

/// How a read failure affects classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Failure or zero records means [`FeedStatus::NoShapes`].
    Shapes,
    /// Failure means [`FeedStatus::Corrupted`].
    Required,
    /// Failure is logged and otherwise ignored.
    Optional,
}

#[derive(Debug, Clone, Copy)]
pub struct ReadStep {
    pub label: &'static str,
    pub kind: FileKind,
    pub requirement: Requirement,
}

const fn step(label: &'static str, kind: FileKind, requirement: Requirement) -> ReadStep {
    ReadStep {
        label,
        kind,
        requirement,
    }
}

/// Files are read in this order; the first failing non-optional step decides
/// the classification and nothing after it is read.
pub const READ_STEPS: [ReadStep; 11] = [
    step("shapes", FileKind::Shapes, Requirement::Shapes),
    step("agencies", FileKind::Agencies, Requirement::Required),
    step("routes", FileKind::Routes, Requirement::Required),
    step("trips", FileKind::Trips, Requirement::Required),
    step("stops", FileKind::Stops, Requirement::Required),
    step("stop times", FileKind::StopTimes, Requirement::Required),
    step("calendar", FileKind::Calendar, Requirement::Optional),
    step("calendar dates", FileKind::CalendarDates, Requirement::Optional),
    step("frequencies", FileKind::Frequencies, Requirement::Optional),
    step("transfers", FileKind::Transfers, Requirement::Optional),
    step("feed info", FileKind::FeedInfo, Requirement::Optional),
];

/// Reads `feed` through [`READ_STEPS`] and classifies it.
pub fn validate<F: FeedFiles + ?Sized>(feed: &mut F) -> FeedStatus {
    match READ_STEPS.iter().try_for_each(|s| run_step(feed, s)) {
        Ok(()) => FeedStatus::Ok,
        Err(status) => status,
    }
}

fn run_step<F: FeedFiles + ?Sized>(feed: &mut F, step: &ReadStep) -> Result<(), FeedStatus> {
    match (step.requirement, feed.read(step.kind)) {
        (Requirement::Shapes, Err(e)) => {
            warn!(error = %e, "Could not get shapes");
            Err(FeedStatus::NoShapes)
        }
        (Requirement::Shapes, Ok(0)) => {
            warn!("Feed has no shapes");
            Err(FeedStatus::NoShapes)
        }
        (Requirement::Required, Err(e)) => {
            warn!(file = step.label, error = %e, "Could not parse required file");
            Err(FeedStatus::Corrupted)
        }
        (Requirement::Optional, Err(e)) if e.is_missing() => Ok(()),
        (Requirement::Optional, Err(e)) => {
            warn!(file = step.label, error = %e, "Could not parse optional file");
            Ok(())
        }
        (_, Ok(records)) => {
            if step.kind == FileKind::FeedInfo {
                info!("Feed info is present");
            }
            debug!(file = step.label, records, "Parsed file");
            Ok(())
        }
    }
}
