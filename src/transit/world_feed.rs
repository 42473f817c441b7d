use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::TransformEngine;
use super::colors::ColorPicker;
use super::ids::IdGenerator;
use super::types::{
    GlobalBatch, LineRecord, NetworkRecord, RouteRecord, ShapeRecord, StopRecord,
};
use crate::parser::GtfsFeed;
use crate::records::{Shape, Stop, StopTime};

/// Run-scoped transform engine shared by every feed of a conversion.
///
/// `ingest` converts a feed into a pending [`GlobalBatch`]; `persist` writes
/// that batch out as JSON lines, one file per record kind.
#[derive(Debug)]
pub struct WorldFeed {
    ids: IdGenerator,
    colors: ColorPicker,
    gzip: bool,
    pending: Option<GlobalBatch>,
    bad_stop_sequences: usize,
}

impl WorldFeed {
    pub fn new(ids: IdGenerator, colors: ColorPicker) -> Self {
        Self {
            ids,
            colors,
            gzip: false,
            pending: None,
            bad_stop_sequences: 0,
        }
    }

    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    #[cfg(test)]
    fn pending(&self) -> Option<&GlobalBatch> {
        self.pending.as_ref()
    }

    fn build(&mut self, feed: &GtfsFeed) -> Option<GlobalBatch> {
        let feed_key = feed_key(feed);
        let key = |kind: &str, gtfs_id: &str| format!("{feed_key}|{kind}|{gtfs_id}");
        let mut ids = self.ids.stage();
        let mut batch = GlobalBatch::default();

        let mut networks: HashMap<&str, u64> = HashMap::new();
        for agency in &feed.agencies {
            let gtfs_id = agency.agency_id.as_deref().unwrap_or(&agency.agency_name);
            let id = ids.make_id(&key("network", gtfs_id));
            networks.insert(gtfs_id, id);
            batch.networks.push(NetworkRecord {
                id,
                title: agency.agency_name.clone(),
            });
        }
        if batch.networks.is_empty() {
            warn!("Feed has no agencies");
            return None;
        }
        let sole_network = match batch.networks.as_slice() {
            [only] => Some(only.id),
            _ => None,
        };

        let mut routes: HashMap<&str, (u64, String)> = HashMap::new();
        for route in &feed.routes {
            let network_id = route
                .agency_id
                .as_deref()
                .and_then(|a| networks.get(a).copied())
                .or(sole_network);
            let Some(network_id) = network_id else {
                debug!(route = %route.route_id, "Route has no known agency");
                continue;
            };
            let id = ids.make_id(&key("route", &route.route_id));
            let title = route.title();
            routes.insert(&route.route_id, (id, title.clone()));
            batch.routes.push(RouteRecord {
                id,
                network_id,
                route_type: route.route_type,
                title,
                color: self.colors.pick(route.route_color.as_deref()),
            });
        }

        let stops: HashMap<&str, &Stop> =
            feed.stops.iter().map(|s| (s.stop_id.as_str(), s)).collect();
        let mut shapes: HashMap<&str, Vec<&Shape>> = HashMap::new();
        for point in &feed.shapes {
            shapes.entry(&point.shape_id).or_default().push(point);
        }
        let mut stop_times: HashMap<&str, Vec<&StopTime>> = HashMap::new();
        for st in &feed.stop_times {
            stop_times.entry(&st.trip_id).or_default().push(st);
        }
        let mut headways: HashMap<&str, u32> = HashMap::new();
        for f in &feed.frequencies {
            headways
                .entry(&f.trip_id)
                .and_modify(|h| *h = (*h).min(f.headway_secs))
                .or_insert(f.headway_secs);
        }

        let mut built_lines: HashSet<(&str, &str)> = HashSet::new();
        let mut used_stops: Vec<&str> = Vec::new();
        let mut seen_stops: HashSet<&str> = HashSet::new();
        let mut used_shapes: Vec<&str> = Vec::new();

        for trip in &feed.trips {
            let times = stop_times
                .get(trip.trip_id.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let Some(sequence) = ordered_stops(times, &stops) else {
                self.bad_stop_sequences += 1;
                debug!(trip = %trip.trip_id, "Bad stop sequence");
                continue;
            };

            let Some((route_id, route_title)) = routes.get(trip.route_id.as_str()) else {
                continue;
            };
            let shape_id = trip.shape_id.as_deref().filter(|s| shapes.contains_key(s));
            let Some(shape_id) = shape_id else {
                continue;
            };
            if !built_lines.insert((trip.route_id.as_str(), shape_id)) {
                continue;
            }

            let mut stop_ids = Vec::with_capacity(sequence.len());
            for stop_id in sequence {
                stop_ids.push(ids.make_id(&key("stop", stop_id)));
                if seen_stops.insert(stop_id) {
                    used_stops.push(stop_id);
                }
            }
            if !used_shapes.contains(&shape_id) {
                used_shapes.push(shape_id);
            }

            batch.lines.push(LineRecord {
                id: ids.make_id(&key("line", &format!("{}:{shape_id}", trip.route_id))),
                route_id: *route_id,
                shape_id: ids.make_id(&key("shape", shape_id)),
                title: trip
                    .trip_headsign
                    .clone()
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| route_title.clone()),
                stop_ids,
                headway_secs: headways.get(trip.trip_id.as_str()).copied(),
            });
        }

        if batch.lines.is_empty() {
            warn!("Feed produced no lines");
            return None;
        }

        for stop_id in used_stops {
            let stop = stops[stop_id];
            batch.stops.push(StopRecord {
                id: ids.make_id(&key("stop", stop_id)),
                title: stop.stop_name.clone().unwrap_or_default(),
                point: stop.stop_lat.zip(stop.stop_lon).map(|(lat, lon)| [lat, lon]),
            });
        }

        for shape_id in used_shapes {
            let mut points = shapes[shape_id].clone();
            points.sort_by_key(|p| p.shape_pt_sequence);
            batch.shapes.push(ShapeRecord {
                id: ids.make_id(&key("shape", shape_id)),
                polyline: points
                    .iter()
                    .map(|p| [p.shape_pt_lat, p.shape_pt_lon])
                    .collect(),
            });
        }

        ids.commit();
        Some(batch)
    }
}

impl TransformEngine for WorldFeed {
    fn ingest(&mut self, feed: GtfsFeed) -> bool {
        match self.build(&feed) {
            Some(batch) => {
                info!(
                    networks = batch.networks.len(),
                    routes = batch.routes.len(),
                    lines = batch.lines.len(),
                    stops = batch.stops.len(),
                    shapes = batch.shapes.len(),
                    "Feed transformed"
                );
                self.pending = Some(batch);
                true
            }
            None => false,
        }
    }

    fn persist(&mut self, output_dir: &Path, overwrite: bool) -> bool {
        let Some(batch) = self.pending.take() else {
            warn!("Nothing ingested to persist");
            return false;
        };

        match write_batch(output_dir, &batch, overwrite, self.gzip) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %format!("{e:#}"), "Failed to write json output");
                false
            }
        }
    }

    fn bad_stop_sequences(&self) -> usize {
        self.bad_stop_sequences
    }

    fn flush_ids(&mut self) -> Result<()> {
        Ok(self.ids.save()?)
    }
}

/// Feed identity shared by every key of the feed: the feed directory name
/// followed by its sorted agency names.
fn feed_key(feed: &GtfsFeed) -> String {
    let dir = feed
        .path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let mut names: Vec<&str> = feed
        .agencies
        .iter()
        .map(|a| a.agency_name.as_str())
        .collect();
    names.sort_unstable();
    format!("{dir}:{}", names.join(","))
}

/// Stop ids of a trip ordered by `stop_sequence`, or `None` if the sequence is
/// unusable: fewer than two stops, a repeated sequence number, or a stop that
/// is not in stops.txt.
fn ordered_stops<'a>(
    times: &[&'a StopTime],
    stops: &HashMap<&str, &Stop>,
) -> Option<Vec<&'a str>> {
    if times.len() < 2 {
        return None;
    }
    let mut times = times.to_vec();
    times.sort_by_key(|st| st.stop_sequence);
    if times.windows(2).any(|w| w[0].stop_sequence == w[1].stop_sequence) {
        return None;
    }
    times
        .into_iter()
        .map(|st| {
            stops
                .contains_key(st.stop_id.as_str())
                .then_some(st.stop_id.as_str())
        })
        .collect()
}

/// Stages all five output files next to their targets and only renames
/// them into place once every one of them was written, so a failed persist
/// leaves earlier output as it was.
fn write_batch(dir: &Path, batch: &GlobalBatch, overwrite: bool, gzip: bool) -> Result<()> {
    let staged = [
        stage_lines(dir, "networks", &batch.networks, overwrite, gzip)?,
        stage_lines(dir, "routes", &batch.routes, overwrite, gzip)?,
        stage_lines(dir, "lines", &batch.lines, overwrite, gzip)?,
        stage_lines(dir, "stops", &batch.stops, overwrite, gzip)?,
        stage_lines(dir, "shapes", &batch.shapes, overwrite, gzip)?,
    ];
    for file in &staged {
        fs::rename(&file.staging, &file.target)
            .with_context(|| format!("failed to move {}", file.target.display()))?;
    }
    Ok(())
}

/// Output file under construction. The staging copy is removed on drop
/// unless it was already renamed over the target.
struct StagedFile {
    staging: PathBuf,
    target: PathBuf,
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.staging.exists() {
            let _ = fs::remove_file(&self.staging);
        }
    }
}

/// Writes one JSON document per line into a staging copy of the output file.
/// Gzip output appends a new gzip member.
fn stage_lines<T: Serialize>(
    dir: &Path,
    name: &str,
    records: &[T],
    overwrite: bool,
    gzip: bool,
) -> Result<StagedFile> {
    let file_name = if gzip {
        format!("{name}.json.gz")
    } else {
        format!("{name}.json")
    };
    let staged = StagedFile {
        staging: dir.join(format!("{file_name}.tmp")),
        target: dir.join(file_name),
    };

    let mut body = Vec::new();
    for record in records {
        serde_json::to_writer(&mut body, record)?;
        body.push(b'\n');
    }

    if !overwrite && staged.target.exists() {
        fs::copy(&staged.target, &staged.staging)
            .with_context(|| format!("failed to copy {}", staged.target.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&staged.staging)
        .with_context(|| format!("failed to open {}", staged.staging.display()))?;

    if gzip {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&body)?;
        encoder.finish()?;
    } else {
        let mut writer = BufWriter::new(file);
        writer.write_all(&body)?;
        writer.flush()?;
    }

    debug!(path = %staged.target.display(), records = records.len(), "Staged json lines");
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Agency, Frequency, Route, Trip};
    use std::fs;
    use std::io::Read;

    fn engine(dir: &Path) -> WorldFeed {
        let ids = IdGenerator::load(&dir.join("mapping.csv")).unwrap();
        WorldFeed::new(ids, ColorPicker::from_entries([("red", (255, 0, 0))]))
    }

    fn stop(id: &str) -> Stop {
        Stop {
            stop_id: id.to_string(),
            stop_name: Some(format!("Stop {id}")),
            stop_lat: Some(52.0),
            stop_lon: Some(13.0),
            location_type: None,
            parent_station: None,
        }
    }

    fn stop_time(trip: &str, stop: &str, seq: u32) -> StopTime {
        StopTime {
            trip_id: trip.to_string(),
            arrival_time: None,
            departure_time: None,
            stop_id: stop.to_string(),
            stop_sequence: seq,
        }
    }

    fn trip(id: &str, shape: &str) -> Trip {
        Trip {
            route_id: "r1".to_string(),
            service_id: "daily".to_string(),
            trip_id: id.to_string(),
            trip_headsign: None,
            direction_id: None,
            shape_id: Some(shape.to_string()),
        }
    }

    fn shape_point(seq: u32) -> Shape {
        Shape {
            shape_id: "sh1".to_string(),
            shape_pt_lat: 52.0 + f64::from(seq),
            shape_pt_lon: 13.0,
            shape_pt_sequence: seq,
            shape_dist_traveled: None,
        }
    }

    fn sample_feed() -> GtfsFeed {
        GtfsFeed {
            agencies: vec![Agency {
                agency_id: None,
                agency_name: "City Transit".to_string(),
                agency_url: "https://example.com".to_string(),
                agency_timezone: "Europe/Berlin".to_string(),
            }],
            routes: vec![Route {
                route_id: "r1".to_string(),
                agency_id: None,
                route_short_name: Some("M1".to_string()),
                route_long_name: None,
                route_type: 3,
                route_color: Some("EE0000".to_string()),
            }],
            trips: vec![trip("t1", "sh1"), trip("t2", "sh1")],
            stops: vec![stop("a"), stop("b"), stop("c")],
            stop_times: vec![
                stop_time("t1", "b", 2),
                stop_time("t1", "a", 1),
                stop_time("t1", "c", 3),
                stop_time("t2", "a", 1),
                stop_time("t2", "b", 2),
            ],
            shapes: vec![shape_point(2), shape_point(1)],
            frequencies: vec![Frequency {
                trip_id: "t1".to_string(),
                start_time: "06:00:00".to_string(),
                end_time: "22:00:00".to_string(),
                headway_secs: 600,
                exact_times: None,
            }],
            ..GtfsFeed::default()
        }
    }

    #[test]
    fn test_ingest_builds_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = engine(dir.path());
        assert!(wf.ingest(sample_feed()));

        let batch = wf.pending().unwrap();
        assert_eq!(batch.networks.len(), 1);
        assert_eq!(batch.routes[0].color, "red");
        assert_eq!(batch.routes[0].title, "M1");
        // t2 shares route and shape with t1
        assert_eq!(batch.lines.len(), 1);
        assert_eq!(batch.lines[0].stop_ids.len(), 3);
        assert_eq!(batch.lines[0].headway_secs, Some(600));
        assert_eq!(batch.stops.len(), 3);
        assert_eq!(batch.shapes[0].polyline, vec![[53.0, 13.0], [54.0, 13.0]]);
        assert_eq!(wf.bad_stop_sequences(), 0);
    }

    #[test]
    fn test_bad_stop_sequences_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = engine(dir.path());

        let mut feed = sample_feed();
        feed.stop_times.push(stop_time("t2", "c", 2));
        feed.trips.push(trip("t3", "sh1"));
        feed.stop_times.push(stop_time("t3", "zz", 1));
        feed.stop_times.push(stop_time("t3", "a", 2));
        assert!(wf.ingest(feed));
        assert_eq!(wf.bad_stop_sequences(), 2);

        let mut feed = sample_feed();
        feed.trips.push(trip("t4", "sh1"));
        assert!(wf.ingest(feed));
        assert_eq!(wf.bad_stop_sequences(), 3);
    }

    #[test]
    fn test_ingest_fails_without_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = engine(dir.path());
        let mut feed = sample_feed();
        feed.shapes.clear();
        assert!(!wf.ingest(feed));
        assert!(wf.pending().is_none());
    }

    #[test]
    fn test_ingest_fails_without_agencies() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = engine(dir.path());
        let mut feed = sample_feed();
        feed.agencies.clear();
        assert!(!wf.ingest(feed));
    }

    #[test]
    fn test_ids_are_stable_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = engine(dir.path());
        assert!(wf.ingest(sample_feed()));
        let first_line = wf.pending().unwrap().lines[0].id;
        wf.flush_ids().unwrap();

        let mut again = engine(dir.path());
        assert!(again.ingest(sample_feed()));
        assert_eq!(again.pending().unwrap().lines[0].id, first_line);
    }

    #[test]
    fn test_persist_overwrite_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = engine(dir.path());

        assert!(wf.ingest(sample_feed()));
        assert!(wf.persist(dir.path(), true));
        assert!(wf.ingest(sample_feed()));
        assert!(wf.persist(dir.path(), false));

        let lines = fs::read_to_string(dir.path().join("lines.json")).unwrap();
        assert_eq!(lines.lines().count(), 2);

        assert!(wf.ingest(sample_feed()));
        assert!(wf.persist(dir.path(), true));
        let lines = fs::read_to_string(dir.path().join("lines.json")).unwrap();
        assert_eq!(lines.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(lines.trim()).unwrap();
        assert_eq!(value["title"], "M1");
    }

    #[test]
    fn test_persist_without_ingest_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = engine(dir.path());
        assert!(!wf.persist(dir.path(), true));
    }

    #[test]
    fn test_persist_to_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = engine(dir.path());
        assert!(wf.ingest(sample_feed()));
        assert!(!wf.persist(&dir.path().join("missing"), true));
    }

    #[test]
    fn test_persist_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = engine(dir.path()).with_gzip(true);
        assert!(wf.ingest(sample_feed()));
        assert!(wf.persist(dir.path(), true));
        assert!(wf.ingest(sample_feed()));
        assert!(wf.persist(dir.path(), false));

        let file = fs::File::open(dir.path().join("stops.json.gz")).unwrap();
        let mut text = String::new();
        flate2::read::MultiGzDecoder::new(file)
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn test_same_agency_name_in_different_feeds_gets_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = engine(dir.path());

        assert!(wf.ingest(GtfsFeed {
            path: PathBuf::from("feeds/city1"),
            ..sample_feed()
        }));
        let first = wf.pending().unwrap().clone();
        assert!(wf.ingest(GtfsFeed {
            path: PathBuf::from("feeds/city2"),
            ..sample_feed()
        }));
        let second = wf.pending().unwrap();

        let stop_ids = |b: &GlobalBatch| b.stops.iter().map(|s| s.id).collect::<HashSet<_>>();
        assert!(stop_ids(&first).is_disjoint(&stop_ids(second)));
        assert_ne!(first.networks[0].id, second.networks[0].id);
        assert_ne!(first.routes[0].id, second.routes[0].id);
        assert_ne!(first.lines[0].id, second.lines[0].id);
        assert_ne!(first.shapes[0].id, second.shapes[0].id);
    }

    #[test]
    fn test_rejected_feed_assigns_no_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = engine(dir.path());
        let mut feed = sample_feed();
        feed.shapes.clear();
        assert!(!wf.ingest(feed));

        assert!(wf.ingest(sample_feed()));
        assert_eq!(wf.pending().unwrap().networks[0].id, 1);

        let mut rejected = GtfsFeed {
            path: PathBuf::from("feeds/other"),
            ..sample_feed()
        };
        rejected.trips.clear();
        assert!(!wf.ingest(rejected));
        wf.flush_ids().unwrap();
        let mapping = fs::read_to_string(dir.path().join("mapping.csv")).unwrap();
        assert!(!mapping.contains("other:"));
    }

    #[test]
    fn test_failed_persist_keeps_earlier_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = engine(dir.path());
        assert!(wf.ingest(sample_feed()));
        assert!(wf.persist(dir.path(), true));

        // lines is staged after networks and routes
        fs::create_dir(dir.path().join("lines.json.tmp")).unwrap();
        assert!(wf.ingest(sample_feed()));
        assert!(!wf.persist(dir.path(), false));

        for name in ["networks.json", "routes.json", "lines.json"] {
            let text = fs::read_to_string(dir.path().join(name)).unwrap();
            assert_eq!(text.lines().count(), 1, "{name}");
        }
        assert!(!dir.path().join("networks.json.tmp").exists());
        assert!(!dir.path().join("routes.json.tmp").exists());
    }
}
