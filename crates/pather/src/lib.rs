// pather - World navigation engine
//
// Routes between world points using static triangle geometry extracted from
// the client data: a chunked triangle world, a height resolver, a lazily
// grown spot graph searched with A*, and zone coordinate conversion.

pub mod config;
pub mod coords;
pub mod dbc;
pub mod error;
pub mod events;
pub mod graph;
pub mod height;
pub mod math;
pub mod service;
pub mod simplify;
pub mod sparse;
pub mod supplier;
pub mod triangle;
pub mod world;

pub use config::NavConfig;
pub use coords::{WorldMapArea, WorldMapAreas};
pub use error::{NavError, Result};
pub use events::{EventBus, NavEvent, NavObserver};
pub use graph::{PathGraph, ScoreMode, SearchState, SpotFlags, SpotId};
pub use height::{HeightResolver, ResolvedHeight, Surface};
pub use math::{Aabb, Vec3, WorldLocation};
pub use service::{NavigationHandle, NavigationService, SearchSession};
pub use simplify::simplify;
pub use supplier::{FileTriangleSupplier, MemoryTriangleSupplier, TriangleSupplier};
pub use triangle::{Chunk, ChunkKey, Triangle, TypeFlags};
pub use world::ChunkedTriangleWorld;
