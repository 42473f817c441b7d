//! Global records written to the json output files.

use serde::Serialize;

/// A transit network, one per GTFS agency.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkRecord {
    pub id: u64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteRecord {
    pub id: u64,
    pub network_id: u64,
    pub route_type: u16,
    pub title: String,
    pub color: String,
}

/// One route variant: the stops a route serves along one shape.
#[derive(Debug, Clone, Serialize)]
pub struct LineRecord {
    pub id: u64,
    pub route_id: u64,
    pub shape_id: u64,
    pub title: String,
    pub stop_ids: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headway_secs: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopRecord {
    pub id: u64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<[f64; 2]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShapeRecord {
    pub id: u64,
    pub polyline: Vec<[f64; 2]>,
}

/// Everything produced from one ingested feed, waiting to be persisted.
#[derive(Debug, Default, Clone)]
pub struct GlobalBatch {
    pub networks: Vec<NetworkRecord>,
    pub routes: Vec<RouteRecord>,
    pub lines: Vec<LineRecord>,
    pub stops: Vec<StopRecord>,
    pub shapes: Vec<ShapeRecord>,
}
