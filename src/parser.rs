//! CSV reader for a GTFS feed directory.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::records::{
    Agency, Calendar, CalendarDate, FeedInfo, Frequency, Route, Shape, Stop, StopTime, Transfer,
    Trip,
};

/// The GTFS files a feed may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Shapes,
    Agencies,
    Routes,
    Trips,
    Stops,
    StopTimes,
    Calendar,
    CalendarDates,
    Frequencies,
    Transfers,
    FeedInfo,
}

impl FileKind {
    pub fn file_name(self) -> &'static str {
        match self {
            FileKind::Shapes => "shapes.txt",
            FileKind::Agencies => "agency.txt",
            FileKind::Routes => "routes.txt",
            FileKind::Trips => "trips.txt",
            FileKind::Stops => "stops.txt",
            FileKind::StopTimes => "stop_times.txt",
            FileKind::Calendar => "calendar.txt",
            FileKind::CalendarDates => "calendar_dates.txt",
            FileKind::Frequencies => "frequencies.txt",
            FileKind::Transfers => "transfers.txt",
            FileKind::FeedInfo => "feed_info.txt",
        }
    }
}

/// Failure to load one GTFS file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{file} is absent")]
    Missing { file: &'static str },
    #[error("{file} could not be parsed: {source}")]
    Malformed {
        file: &'static str,
        #[source]
        source: csv::Error,
    },
}

impl ParseError {
    pub fn is_missing(&self) -> bool {
        matches!(self, ParseError::Missing { .. })
    }
}

/// Per-file read access to a feed.
///
/// `read` loads one file and returns how many records it held.
pub trait FeedFiles {
    fn read(&mut self, kind: FileKind) -> Result<usize, ParseError>;
}

/// In-memory contents of a GTFS feed directory, filled file by file.
#[derive(Debug, Default)]
pub struct GtfsFeed {
    pub path: PathBuf,
    pub shapes: Vec<Shape>,
    pub agencies: Vec<Agency>,
    pub routes: Vec<Route>,
    pub trips: Vec<Trip>,
    pub stops: Vec<Stop>,
    pub stop_times: Vec<StopTime>,
    pub calendar: Vec<Calendar>,
    pub calendar_dates: Vec<CalendarDate>,
    pub frequencies: Vec<Frequency>,
    pub transfers: Vec<Transfer>,
    pub feed_info: Vec<FeedInfo>,
}

impl GtfsFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

impl FeedFiles for GtfsFeed {
    fn read(&mut self, kind: FileKind) -> Result<usize, ParseError> {
        let dir = self.path.as_path();
        let count = match kind {
            FileKind::Shapes => load(dir, kind, &mut self.shapes)?,
            FileKind::Agencies => load(dir, kind, &mut self.agencies)?,
            FileKind::Routes => load(dir, kind, &mut self.routes)?,
            FileKind::Trips => load(dir, kind, &mut self.trips)?,
            FileKind::Stops => load(dir, kind, &mut self.stops)?,
            FileKind::StopTimes => load(dir, kind, &mut self.stop_times)?,
            FileKind::Calendar => load(dir, kind, &mut self.calendar)?,
            FileKind::CalendarDates => load(dir, kind, &mut self.calendar_dates)?,
            FileKind::Frequencies => load(dir, kind, &mut self.frequencies)?,
            FileKind::Transfers => load(dir, kind, &mut self.transfers)?,
            FileKind::FeedInfo => load(dir, kind, &mut self.feed_info)?,
        };
        Ok(count)
    }
}

fn load<T: DeserializeOwned>(
    dir: &Path,
    kind: FileKind,
    slot: &mut Vec<T>,
) -> Result<usize, ParseError> {
    *slot = read_records(dir, kind)?;
    Ok(slot.len())
}

/// Deserializes every row of `kind`'s file under `dir`.
///
/// # Errors
///
/// Returns [`ParseError::Missing`] if the file does not exist and
/// [`ParseError::Malformed`] if it cannot be opened or a row does not match
/// the expected columns.
pub fn read_records<T: DeserializeOwned>(dir: &Path, kind: FileKind) -> Result<Vec<T>, ParseError> {
    let path = dir.join(kind.file_name());
    if !path.is_file() {
        return Err(ParseError::Missing {
            file: kind.file_name(),
        });
    }

    let malformed = |source| ParseError::Malformed {
        file: kind.file_name(),
        source,
    };

    let file = File::open(&path).map_err(|e| malformed(csv::Error::from(e)))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(file);

    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(malformed)
}
