// service.rs - Navigation service facade
//
// Owns one search session (world cache + spot graph) for the map currently
// being navigated. The session is rebuilt when a request names another map
// or on reset. One query runs at a time; NavigationHandle is the gate for
// callers sharing a service across threads.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::NavConfig;
use crate::coords::WorldMapAreas;
use crate::error::{NavError, Result};
use crate::events::{EventBus, NavEvent, NavObserver};
use crate::graph::{PathGraph, ScoreMode, SearchState};
use crate::height::{HeightResolver, ResolvedHeight};
use crate::math::{Aabb, Vec3, WorldLocation};
use crate::simplify::simplify;
use crate::supplier::{FileTriangleSupplier, TriangleSupplier};
use crate::world::ChunkedTriangleWorld;

/// Everything tied to the map being navigated
pub struct SearchSession {
    map_id: u32,
    world: ChunkedTriangleWorld,
    graph: PathGraph,
    from: Option<WorldLocation>,
    to: Option<WorldLocation>,
}

impl SearchSession {
    fn new(map_id: u32, config: &NavConfig, supplier: Arc<dyn TriangleSupplier>, events: EventBus) -> Self {
        Self {
            map_id,
            world: ChunkedTriangleWorld::new(map_id, supplier, config, events),
            graph: PathGraph::new(map_id, config),
            from: None,
            to: None,
        }
    }

    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    pub fn world(&self) -> &ChunkedTriangleWorld {
        &self.world
    }

    pub fn graph(&self) -> &PathGraph {
        &self.graph
    }

    pub fn locations(&self) -> Option<(WorldLocation, WorldLocation)> {
        Some((self.from?, self.to?))
    }
}

pub struct NavigationService {
    config: NavConfig,
    areas: WorldMapAreas,
    supplier: Arc<dyn TriangleSupplier>,
    events: EventBus,
    resolver: HeightResolver,
    session: Option<SearchSession>,
}

impl NavigationService {
    pub fn new(config: NavConfig, areas: WorldMapAreas, supplier: Arc<dyn TriangleSupplier>) -> Self {
        Self {
            resolver: HeightResolver::from_config(&config),
            config,
            areas,
            supplier,
            events: EventBus::new(),
            session: None,
        }
    }

    /// Service over `.tri` files in the configured data directory. A missing
    /// zone table only disables coordinate conversion.
    pub fn from_config(config: NavConfig) -> Result<Self> {
        let areas = if config.world_map_areas.exists() {
            WorldMapAreas::load(&config.world_map_areas)?
        } else {
            warn!(
                "Zone table {} not found, map coordinate conversion disabled",
                config.world_map_areas.display()
            );
            WorldMapAreas::default()
        };
        let supplier = Arc::new(FileTriangleSupplier::new(config.data_dir.clone()));
        Ok(Self::new(config, areas, supplier))
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn areas(&self) -> &WorldMapAreas {
        &self.areas
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self, observer: Arc<dyn NavObserver>) {
        self.events.subscribe(observer);
    }

    pub fn session(&self) -> Option<&SearchSession> {
        self.session.as_ref()
    }

    fn session_for(&mut self, map_id: u32) -> &mut SearchSession {
        if self.session.as_ref().is_some_and(|s| s.map_id != map_id) {
            info!("Switching navigation session to map {}", map_id);
            self.session = None;
        }
        let (config, supplier, events) = (&self.config, &self.supplier, &self.events);
        self.session
            .get_or_insert_with(|| SearchSession::new(map_id, config, supplier.clone(), events.clone()))
    }

    /// Stage a search and graph the start point. Both points must be on the
    /// same map. World data errors are logged; the search then reports no route.
    pub fn set_locations(&mut self, from: WorldLocation, to: WorldLocation) -> Result<()> {
        if from.map_id != to.map_id {
            return Err(NavError::MapMismatch {
                from: from.map_id,
                to: to.map_id,
            });
        }
        let resolver = self.resolver;
        let session = self.session_for(from.map_id);
        session.from = Some(from);
        session.to = Some(to);

        let graphed = snap(&resolver, &mut session.world, from.position())
            .and_then(|start| session.graph.graph_start(&mut session.world, start));
        if let Err(e) = graphed {
            error!("Cannot graph start {:?} on map {}: {:#}", from, from.map_id, e);
        }
        Ok(())
    }

    /// Run a search between the staged locations. `Ok(None)` means no route.
    pub fn do_search(&mut self, mode: ScoreMode) -> Result<Option<Vec<WorldLocation>>> {
        let resolver = self.resolver;
        let close_enough = self.config.close_enough;
        let tolerance = self.config.simplify_tolerance;

        let session = self.session.as_mut().ok_or(NavError::NoLocations)?;
        let (from, to) = session.locations().ok_or(NavError::NoLocations)?;
        let map_id = session.map_id;

        let snapped = snap(&resolver, &mut session.world, from.position())
            .and_then(|f| Ok((f, snap(&resolver, &mut session.world, to.position())?)));
        let (start, goal) = match snapped {
            Ok(points) => points,
            Err(e) => {
                error!("Cannot place search endpoints on map {}: {:#}", map_id, e);
                session.graph.abandon();
                return Ok(None);
            }
        };

        let Some(mut points) = session
            .graph
            .create_path(&mut session.world, start, goal, mode, close_enough)
        else {
            return Ok(None);
        };

        if tolerance > 0.0 {
            points = simplify(&points, tolerance);
        }

        self.events.publish(NavEvent::PathCreated {
            map_id,
            points: points.clone(),
        });
        Ok(Some(
            points
                .into_iter()
                .map(|p| WorldLocation::from_position(p, map_id))
                .collect(),
        ))
    }

    pub fn find_route(
        &mut self,
        from: WorldLocation,
        to: WorldLocation,
        mode: ScoreMode,
    ) -> Result<Option<Vec<WorldLocation>>> {
        self.set_locations(from, to)?;
        self.do_search(mode)
    }

    /// Standing height near `location.z`. Uses the active session's cache when
    /// the map matches, a throwaway world otherwise.
    pub fn resolve_z(&mut self, location: WorldLocation) -> Result<Option<ResolvedHeight>> {
        let resolver = self.resolver;
        let resolved = match self.session.as_mut().filter(|s| s.map_id == location.map_id) {
            Some(session) => resolver.resolve(&mut session.world, location.x, location.y, location.z),
            None => {
                let mut world = ChunkedTriangleWorld::new(
                    location.map_id,
                    self.supplier.clone(),
                    &self.config,
                    self.events.clone(),
                );
                resolver.resolve(&mut world, location.x, location.y, location.z)
            }
        };

        match resolved {
            Ok(r) => Ok(r),
            Err(e) => {
                error!("Height lookup at {:?} failed: {:#}", location, e);
                Ok(None)
            }
        }
    }

    /// UI map percentages to a world location at height `z`
    pub fn to_world(&self, ui_map_id: u32, map_x: f32, map_y: f32, z: f32) -> Result<WorldLocation> {
        let area = self
            .areas
            .by_ui_map(ui_map_id)
            .ok_or(NavError::UnknownUiMap(ui_map_id))?;
        let (x, y) = area.to_world_flip_xy(map_x, map_y);
        Ok(WorldLocation::new(x, y, z, area.map_id))
    }

    /// Like `to_world`, with z snapped to the standing height near `z`
    pub fn to_world_z(&mut self, ui_map_id: u32, map_x: f32, map_y: f32, z: f32) -> Result<WorldLocation> {
        let mut location = self.to_world(ui_map_id, map_x, map_y, z)?;
        if let Some(resolved) = self.resolve_z(location)? {
            location.z = resolved.z;
        }
        Ok(location)
    }

    /// World position to UI map percentages of the zone containing it; z is kept
    pub fn to_local(&self, world: Vec3, map_id: u32, ui_map_id: Option<u32>) -> Result<Vec3> {
        let area = self.areas.area_at(map_id, world.x, world.y, ui_map_id)?;
        let (ui_x, ui_y) = area.to_map_flip_xy(world.x, world.y);
        Ok(Vec3::new(ui_x, ui_y, world.z))
    }

    /// Persist the spot graph of the active session
    pub fn save(&mut self) -> Result<usize> {
        match self.session.as_mut() {
            Some(session) => session.graph.save(),
            None => Ok(0),
        }
    }

    pub fn reset(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Dropped navigation session for map {}", session.map_id);
        }
    }

    pub fn search_state(&self) -> SearchState {
        self.session
            .as_ref()
            .map_or(SearchState::Empty, |s| s.graph.state())
    }

    pub fn closest_spot(&self) -> Option<WorldLocation> {
        let session = self.session.as_ref()?;
        let id = session.graph.closest_spot()?;
        Some(WorldLocation::from_position(session.graph.spot(id).position, session.map_id))
    }

    pub fn peek_spot(&self) -> Option<WorldLocation> {
        let session = self.session.as_ref()?;
        let id = session.graph.peek_spot()?;
        Some(WorldLocation::from_position(session.graph.spot(id).position, session.map_id))
    }

    pub fn draw_lines(&self, map_id: u32, points: &[Vec3], label: &str) {
        self.events.publish(NavEvent::LinesAdded {
            map_id,
            points: points.to_vec(),
            label: label.to_string(),
        });
    }

    pub fn draw_sphere(&self, center: WorldLocation, radius: f32, label: &str) {
        self.events.publish(NavEvent::SphereAdded {
            map_id: center.map_id,
            center: center.position(),
            radius,
            label: label.to_string(),
        });
    }

    /// Warm the chunk cache of `map_id` over a rectangle
    pub fn preload(&mut self, map_id: u32, bounds: &Aabb) -> Result<usize> {
        self.session_for(map_id).world.preload(bounds)
    }
}

fn snap(resolver: &HeightResolver, world: &mut ChunkedTriangleWorld, p: Vec3) -> Result<Vec3> {
    Ok(match resolver.resolve(world, p.x, p.y, p.z)? {
        Some(r) => p.with_z(r.z),
        None => p,
    })
}

/// Shared service with a busy gate
#[derive(Clone)]
pub struct NavigationHandle {
    inner: Arc<Mutex<NavigationService>>,
}

impl NavigationHandle {
    pub fn new(service: NavigationService) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.inner.is_locked()
    }

    /// Route query that fails with `Busy` instead of waiting for another caller
    pub fn try_find_route(
        &self,
        from: WorldLocation,
        to: WorldLocation,
        mode: ScoreMode,
    ) -> Result<Option<Vec<WorldLocation>>> {
        let mut service = self.inner.try_lock().ok_or(NavError::Busy)?;
        service.find_route(from, to, mode)
    }

    /// Run `f` with exclusive access, waiting for any query in progress
    pub fn with<R>(&self, f: impl FnOnce(&mut NavigationService) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
