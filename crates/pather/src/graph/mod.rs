// graph - Spot graph grown lazily over a global lattice
//
// Lattice spots sit at multiples of the step length on x and y, one per floor
// of a column. Search endpoints that are not lattice points become anchor
// spots, linked to the lattice points around them. Links are directed and
// only ever point at lattice spots.

mod persist;
mod search;

pub use search::{ScoreMode, SearchState};

use bitflags::bitflags;
use pather_shared::GRID_SIZE;

use crate::config::NavConfig;
use crate::error::Result;
use crate::height::{HeightResolver, Surface};
use crate::math::Vec3;
use crate::sparse::{SparseFloatMatrix3D, SparseMatrix2D};
use crate::triangle::ChunkKey;
use crate::world::ChunkedTriangleWorld;

use persist::GraphStore;

/// Horizontal slack for treating a point as sitting on a lattice point
pub const ON_LATTICE_EPSILON: f32 = 0.01;

/// Anchor spots link to every lattice point within this many steps
const ANCHOR_RING_STEPS: f32 = 1.5;

const NEIGHBOURS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpotId(pub u32);

impl SpotId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SpotFlags: u8 {
        /// Neighbours have been generated
        const EXPANDED = 0x01;
        const IN_WATER = 0x02;
        const ON_MODEL = 0x04;
        const CLOSE_TO_MODEL = 0x08;
        /// Part of the most recent route
        const CURRENT_PATH = 0x10;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Link {
    pub to: SpotId,
    pub crosses_model: bool,
}

#[derive(Clone, Debug)]
pub struct Spot {
    pub position: Vec3,
    pub flags: SpotFlags,
    pub links: Vec<Link>,
    lattice: Option<(i32, i32)>,
}

impl Spot {
    /// Lattice coordinates, `None` for anchors
    pub fn lattice(&self) -> Option<(i32, i32)> {
        self.lattice
    }

    pub fn is_anchor(&self) -> bool {
        self.lattice.is_none()
    }

    pub fn is_expanded(&self) -> bool {
        self.flags.contains(SpotFlags::EXPANDED)
    }
}

#[derive(Clone, Debug)]
struct GraphSettings {
    step: f32,
    agent_height: f32,
    slope_ratio: f32,
    chunk_size: f32,
    model_avoid_range: f32,
    model_min_area: f32,
    model_penalty: f32,
    water_cost_factor: f32,
    max_search_spots: usize,
}

pub struct PathGraph {
    map_id: u32,
    settings: GraphSettings,
    resolver: HeightResolver,
    spots: Vec<Spot>,
    lattice: SparseMatrix2D<Vec<SpotId>>,
    index: SparseFloatMatrix3D<Vec<SpotId>>,
    store: GraphStore,
    state: SearchState,
    closest: Option<SpotId>,
    peek: Option<SpotId>,
    staged: Option<(Vec3, SpotId)>,
    current_path: Vec<SpotId>,
}

impl PathGraph {
    pub fn new(map_id: u32, config: &NavConfig) -> Self {
        let step = if config.step_length > 0.0 { config.step_length } else { 3.0 };
        let chunk_size = if config.chunk_size > 0.0 { config.chunk_size } else { GRID_SIZE };

        Self {
            map_id,
            settings: GraphSettings {
                step,
                agent_height: config.agent_height,
                slope_ratio: config.max_slope_ratio(),
                chunk_size,
                model_avoid_range: config.model_avoid_range,
                model_min_area: config.model_min_area,
                model_penalty: config.model_penalty,
                water_cost_factor: config.water_cost_factor,
                max_search_spots: config.max_search_spots,
            },
            resolver: HeightResolver::from_config(config),
            spots: Vec::new(),
            lattice: SparseMatrix2D::new(),
            index: SparseFloatMatrix3D::new(step),
            store: GraphStore::new(config.graph_dir.clone()),
            state: SearchState::Empty,
            closest: None,
            peek: None,
            staged: None,
            current_path: Vec::new(),
        }
    }

    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn spot(&self, id: SpotId) -> &Spot {
        &self.spots[id.index()]
    }

    pub fn spots(&self) -> impl Iterator<Item = (SpotId, &Spot)> {
        self.spots.iter().enumerate().map(|(i, s)| (SpotId(i as u32), s))
    }

    /// Best spot reached so far by the last search (smallest distance to the target)
    pub fn closest_spot(&self) -> Option<SpotId> {
        self.closest
    }

    /// Next spot the last search would have expanded
    pub fn peek_spot(&self) -> Option<SpotId> {
        self.peek
    }

    pub fn current_path(&self) -> &[SpotId] {
        &self.current_path
    }

    pub fn lattice_position(&self, i: i32, j: i32) -> (f32, f32) {
        (i as f32 * self.settings.step, j as f32 * self.settings.step)
    }

    fn group_of(&self, i: i32, j: i32) -> ChunkKey {
        let (x, y) = self.lattice_position(i, j);
        ChunkKey::containing(self.map_id, x, y, self.settings.chunk_size)
    }

    /// Spot in lattice column (i, j) on the floor closest to `z`, within agent height
    pub fn find_in_column(&self, i: i32, j: i32, z: f32) -> Option<SpotId> {
        self.lattice
            .get(i, j)?
            .iter()
            .map(|&id| (id, (self.spots[id.index()].position.z - z).abs()))
            .filter(|(_, dz)| *dz < self.settings.agent_height)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(id, _)| id)
    }

    /// Spots within `radius` of `p`, ascending by id
    pub fn spots_near(&self, p: Vec3, radius: f32) -> Vec<SpotId> {
        let mut ids: Vec<SpotId> = self
            .index
            .get_all_in_cube((p.x - radius, p.y - radius, p.z - radius), (p.x + radius, p.y + radius, p.z + radius))
            .into_iter()
            .flatten()
            .copied()
            .filter(|id| self.spots[id.index()].position.distance(p) <= radius)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn find_anchor(&self, p: Vec3) -> Option<SpotId> {
        self.spots_near(p, ON_LATTICE_EPSILON)
            .into_iter()
            .find(|id| self.spots[id.index()].is_anchor())
    }

    fn insert_spot(&mut self, position: Vec3, flags: SpotFlags, lattice: Option<(i32, i32)>) -> SpotId {
        let id = SpotId(self.spots.len() as u32);
        self.spots.push(Spot {
            position,
            flags,
            links: Vec::new(),
            lattice,
        });
        if let Some((i, j)) = lattice {
            self.lattice.get_or_insert_with(i, j, Vec::new).push(id);
        }
        self.index
            .get_or_insert_with(position.x, position.y, position.z, Vec::new)
            .push(id);
        id
    }

    fn touch(&mut self, id: SpotId) {
        if let Some((i, j)) = self.spots[id.index()].lattice {
            let key = self.group_of(i, j);
            self.store.mark_dirty(key);
        }
    }

    fn add_link(&mut self, from: SpotId, link: Link) {
        let links = &mut self.spots[from.index()].links;
        if links.iter().any(|l| l.to == link.to) {
            return;
        }
        links.push(link);
        self.touch(from);
    }

    fn classify(&self, world: &mut ChunkedTriangleWorld, p: Vec3, surface: Surface) -> Result<SpotFlags> {
        let mut flags = match surface {
            Surface::Terrain => SpotFlags::empty(),
            Surface::Water => SpotFlags::IN_WATER,
            Surface::Model => SpotFlags::ON_MODEL,
        };
        let s = &self.settings;
        if world.is_close_to_model(p, s.model_avoid_range, s.model_min_area, s.agent_height)? {
            flags |= SpotFlags::CLOSE_TO_MODEL;
        }
        Ok(flags)
    }

    /// Spot for a search endpoint: the lattice spot when `p` sits on a lattice
    /// point, otherwise an anchor at exactly `p`
    pub fn spot_for_location(&mut self, world: &mut ChunkedTriangleWorld, p: Vec3) -> Result<SpotId> {
        let step = self.settings.step;
        let (i, j) = ((p.x / step).round() as i32, (p.y / step).round() as i32);
        let (lx, ly) = self.lattice_position(i, j);
        let on_lattice = (p.x - lx).abs() < ON_LATTICE_EPSILON && (p.y - ly).abs() < ON_LATTICE_EPSILON;

        if on_lattice {
            self.ensure_group(i, j);
            if let Some(id) = self.find_in_column(i, j, p.z) {
                return Ok(id);
            }
        } else if let Some(id) = self.find_anchor(p) {
            return Ok(id);
        }

        let surface = self
            .resolver
            .resolve(world, p.x, p.y, p.z)?
            .map_or(Surface::Terrain, |r| r.surface);

        if on_lattice {
            let position = Vec3::new(lx, ly, p.z);
            let flags = self.classify(world, position, surface)?;
            let id = self.insert_spot(position, flags, Some((i, j)));
            self.touch(id);
            Ok(id)
        } else {
            let flags = self.classify(world, p, surface)?;
            Ok(self.insert_spot(p, flags, None))
        }
    }

    /// Lattice points within the anchor ring of `p`, excluding p's own column
    fn lattice_ring(&self, p: Vec3) -> Vec<(i32, i32)> {
        let step = self.settings.step;
        let reach = ANCHOR_RING_STEPS * step;
        let (i0, i1) = (((p.x - reach) / step).ceil() as i32, ((p.x + reach) / step).floor() as i32);
        let (j0, j1) = (((p.y - reach) / step).ceil() as i32, ((p.y + reach) / step).floor() as i32);

        let mut ring = Vec::new();
        for i in i0..=i1 {
            for j in j0..=j1 {
                let (x, y) = self.lattice_position(i, j);
                let d = ((x - p.x).powi(2) + (y - p.y).powi(2)).sqrt();
                if d <= reach && d > ON_LATTICE_EPSILON {
                    ring.push((i, j));
                }
            }
        }
        ring
    }

    /// Generate and link the neighbours of a spot.
    ///
    /// Without `expand`, a lattice spot links to its 8 lattice neighbours and an
    /// already expanded spot is returned as-is. With `expand`, the ring is every
    /// lattice point within 1.5 steps, which is how anchors get seeded.
    /// Candidates the height resolver cannot place, that are too steep, blocked
    /// or have a hole between them and the spot are discarded.
    pub fn create_spots_around_spot(
        &mut self,
        world: &mut ChunkedTriangleWorld,
        id: SpotId,
        expand: bool,
    ) -> Result<Vec<SpotId>> {
        let spot = &self.spots[id.index()];
        if spot.is_expanded() && !expand {
            return Ok(spot.links.iter().map(|l| l.to).collect());
        }

        let ring: Vec<(i32, i32)> = match (spot.lattice, expand) {
            (Some((i, j)), false) => NEIGHBOURS.iter().map(|(di, dj)| (i + di, j + dj)).collect(),
            _ => self.lattice_ring(spot.position),
        };

        let mut linked = Vec::new();
        for (i, j) in ring {
            if let Some(n) = self.connect(world, id, i, j)? {
                linked.push(n);
            }
        }

        self.spots[id.index()].flags |= SpotFlags::EXPANDED;
        self.touch(id);
        Ok(linked)
    }

    fn connect(&mut self, world: &mut ChunkedTriangleWorld, from_id: SpotId, i: i32, j: i32) -> Result<Option<SpotId>> {
        self.ensure_group(i, j);

        let from = self.spots[from_id.index()].position;
        let (x, y) = self.lattice_position(i, j);
        let height = self.settings.agent_height;

        let Some(resolved) = self.resolver.resolve(world, x, y, from.z)? else {
            return Ok(None);
        };
        let to = Vec3::new(x, y, resolved.z);

        if (to.z - from.z).abs() > self.settings.slope_ratio * from.distance_2d(to) {
            return Ok(None);
        }

        let mid_hint = (from.z + to.z) * 0.5;
        match self.resolver.resolve(world, (from.x + x) * 0.5, (from.y + y) * 0.5, mid_hint)? {
            Some(mid) if (mid.z - mid_hint).abs() <= height => {}
            _ => return Ok(None),
        }

        if world.is_step_blocked(from, to, height)? {
            return Ok(None);
        }

        let target = match self.find_in_column(i, j, to.z) {
            Some(existing) => existing,
            None => {
                let flags = self.classify(world, to, resolved.surface)?;
                let id = self.insert_spot(to, flags, Some((i, j)));
                self.touch(id);
                id
            }
        };
        if target == from_id {
            return Ok(None);
        }

        let target_pos = self.spots[target.index()].position;
        let crosses_model = world.crosses_model(from, target_pos, self.settings.model_min_area, height)?;
        self.add_link(
            from_id,
            Link {
                to: target,
                crosses_model,
            },
        );
        Ok(Some(target))
    }

    fn clear_current_path(&mut self) {
        for id in std::mem::take(&mut self.current_path) {
            self.spots[id.index()].flags.remove(SpotFlags::CURRENT_PATH);
        }
    }

    /// Forget every spot and the progress of the last search. Saved groups
    /// will be read again when their lattice is next touched.
    pub fn clear(&mut self) {
        self.spots.clear();
        self.lattice.clear();
        self.index.clear();
        self.store.reset();
        self.state = SearchState::Empty;
        self.closest = None;
        self.peek = None;
        self.staged = None;
        self.current_path.clear();
    }
}
