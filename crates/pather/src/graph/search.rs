// A* over the spot graph
//
// Min-heap via reversed ordering. Ties on f go to the smaller heuristic, then
// to the lower spot id, so identical inputs always produce identical routes.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::{Link, PathGraph, SpotFlags, SpotId};
use crate::error::Result;
use crate::math::Vec3;
use crate::world::ChunkedTriangleWorld;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreMode {
    /// Distance only (water links scaled)
    #[default]
    AStar,
    /// Distance plus a penalty for spots next to and links across models/objects
    AvoidModels,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SearchState {
    Empty,
    Graphed,
    Searching,
    Resolved,
    Failed,
}

struct OpenEntry {
    spot: SpotId,
    f: f32,
    h: f32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: the smallest f is the greatest entry
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.spot.cmp(&self.spot))
    }
}

impl PathGraph {
    /// Search a route from `from` to within `close_enough` of `to`.
    ///
    /// The route starts at the spot for `from` and ends with `to` itself. Any
    /// error while reading world data is logged and reported as no route.
    pub fn create_path(
        &mut self,
        world: &mut ChunkedTriangleWorld,
        from: Vec3,
        to: Vec3,
        mode: ScoreMode,
        close_enough: f32,
    ) -> Option<Vec<Vec3>> {
        match self.search(world, from, to, mode, close_enough) {
            Ok(Some(path)) => {
                self.state = SearchState::Resolved;
                Some(path)
            }
            Ok(None) => {
                self.state = SearchState::Failed;
                None
            }
            Err(e) => {
                error!(
                    "Search on map {} from {:?} to {:?} aborted: {:#}",
                    self.map_id, from, to, e
                );
                self.state = SearchState::Failed;
                None
            }
        }
    }

    /// Place the start spot for `from` and link it into the lattice. The
    /// graph stays `Graphed` until a search from the same point picks it up.
    pub fn graph_start(&mut self, world: &mut ChunkedTriangleWorld, from: Vec3) -> Result<SpotId> {
        self.staged = None;
        let start = self.spot_for_location(world, from)?;
        self.create_spots_around_spot(world, start, true)?;
        self.state = SearchState::Graphed;
        self.staged = Some((from, start));
        Ok(start)
    }

    /// Give up on the staged search without running it
    pub fn abandon(&mut self) {
        self.staged = None;
        self.state = SearchState::Failed;
    }

    fn link_cost(&self, from: SpotId, link: &Link, mode: ScoreMode) -> f32 {
        let a = &self.spots[from.index()];
        let b = &self.spots[link.to.index()];

        let mut cost = a.position.distance(b.position);
        if b.flags.contains(SpotFlags::IN_WATER) {
            cost *= self.settings.water_cost_factor;
        }
        if mode == ScoreMode::AvoidModels {
            if b.flags.contains(SpotFlags::CLOSE_TO_MODEL) {
                cost += self.settings.model_penalty;
            }
            if link.crosses_model {
                cost += self.settings.model_penalty;
            }
        }
        cost
    }

    fn search(
        &mut self,
        world: &mut ChunkedTriangleWorld,
        from: Vec3,
        to: Vec3,
        mode: ScoreMode,
        close_enough: f32,
    ) -> Result<Option<Vec<Vec3>>> {
        self.clear_current_path();
        self.closest = None;
        self.peek = None;

        let start = match self.staged.take() {
            Some((staged, start)) if self.state == SearchState::Graphed && staged == from => start,
            _ => self.graph_start(world, from)?,
        };
        self.state = SearchState::Searching;
        let agent_height = self.settings.agent_height;

        let mut g_score: FxHashMap<SpotId, f32> = FxHashMap::default();
        let mut came_from: FxHashMap<SpotId, SpotId> = FxHashMap::default();
        let mut closed: FxHashSet<SpotId> = FxHashSet::default();
        let mut best_h = f32::INFINITY;

        let h_start = self.spots[start.index()].position.distance(to);
        g_score.insert(start, 0.0);
        let mut open = BinaryHeap::new();
        open.push(OpenEntry {
            spot: start,
            f: h_start,
            h: h_start,
        });

        while let Some(current) = open.pop() {
            let id = current.spot;
            if !closed.insert(id) {
                continue;
            }
            if closed.len() > self.settings.max_search_spots {
                warn!(
                    "Search on map {} gave up after {} spots, closest {:.1} from target",
                    self.map_id, self.settings.max_search_spots, best_h
                );
                return Ok(None);
            }

            let position = self.spots[id.index()].position;
            if current.h < best_h {
                best_h = current.h;
                self.closest = Some(id);
            }

            if current.h <= close_enough && !world.is_step_blocked(position, to, agent_height)? {
                let path = self.finish(&came_from, id, to);
                debug!(
                    "Route on map {} found: {} points, {} spots closed",
                    self.map_id,
                    path.len(),
                    closed.len()
                );
                return Ok(Some(path));
            }

            if !self.spots[id.index()].is_expanded() {
                self.create_spots_around_spot(world, id, false)?;
            }

            let g_current = g_score.get(&id).copied().unwrap_or(f32::INFINITY);
            let links = self.spots[id.index()].links.clone();
            for link in &links {
                if closed.contains(&link.to) {
                    continue;
                }
                let tentative = g_current + self.link_cost(id, link, mode);
                if tentative < g_score.get(&link.to).copied().unwrap_or(f32::INFINITY) {
                    g_score.insert(link.to, tentative);
                    came_from.insert(link.to, id);
                    let h = self.spots[link.to.index()].position.distance(to);
                    open.push(OpenEntry {
                        spot: link.to,
                        f: tentative + h,
                        h,
                    });
                }
            }

            self.peek = open.peek().map(|e| e.spot);
        }

        warn!(
            "Search on map {} exhausted after {} spots, closest {:.1} from target",
            self.map_id,
            closed.len(),
            best_h
        );
        Ok(None)
    }

    fn finish(&mut self, came_from: &FxHashMap<SpotId, SpotId>, end: SpotId, to: Vec3) -> Vec<Vec3> {
        let mut ids = vec![end];
        let mut cursor = end;
        while let Some(&prev) = came_from.get(&cursor) {
            ids.push(prev);
            cursor = prev;
        }
        ids.reverse();

        for &id in &ids {
            self.spots[id.index()].flags |= SpotFlags::CURRENT_PATH;
        }

        let mut points: Vec<Vec3> = ids.iter().map(|id| self.spots[id.index()].position).collect();
        if points.last().is_none_or(|last| last.distance(to) > 1e-3) {
            points.push(to);
        }
        self.current_path = ids;
        points
    }
}
