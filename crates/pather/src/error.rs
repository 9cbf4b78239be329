// Error taxonomy of the navigation engine
//
// Only region/argument errors and the busy gate reach callers of query
// operations; chunk and graph file problems are absorbed at the search
// boundary and turn into "no path".

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NavError {
    #[error("world point ({x:.2}, {y:.2}) on map {map_id} lies in several areas {candidates:?} and no UI map hint was given")]
    AmbiguousArea {
        map_id: u32,
        x: f32,
        y: f32,
        candidates: Vec<u32>,
    },

    #[error("unknown UI map id {0}")]
    UnknownUiMap(u32),

    #[error("no area on map {map_id} contains ({x:.2}, {y:.2})")]
    NoAreaAt { map_id: u32, x: f32, y: f32 },

    #[error("search endpoints are on different maps ({from} and {to})")]
    MapMismatch { from: u32, to: u32 },

    #[error("no search locations staged")]
    NoLocations,

    #[error("malformed chunk {}: {reason}", path.display())]
    MalformedChunk { path: PathBuf, reason: String },

    #[error("malformed graph file {}: {reason}", path.display())]
    MalformedGraph { path: PathBuf, reason: String },

    #[error("invalid DBC data: {0}")]
    Dbc(String),

    #[error("a navigation query is already running")]
    Busy,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NavError>;
