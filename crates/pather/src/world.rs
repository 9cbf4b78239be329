// world.rs - Chunked triangle world for one map
//
// Chunks are pulled from the supplier the first time a query touches them and
// kept in an LRU-bounded cache. A chunk with no data is cached as known-absent
// so repeated queries over holes do not hit the disk again.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::config::NavConfig;
use crate::error::Result;
use crate::events::{EventBus, NavEvent};
use crate::math::{
    Aabb, Vec3, point_triangle_distance_2d, segment_crosses_triangle_2d, segment_intersects_triangle,
    triangle_area,
};
use crate::sparse::SparseMatrix2D;
use crate::supplier::TriangleSupplier;
use crate::triangle::{Chunk, ChunkKey, Triangle, TypeFlags, grid_index};

/// Solid surfaces closer than this above a floor do not count as a ceiling
const HEAD_CLEARANCE: f32 = 0.1;

#[derive(Clone, Debug)]
enum CacheSlot {
    Loaded(Arc<Chunk>),
    Absent,
}

#[derive(Clone, Debug)]
struct CacheEntry {
    slot: CacheSlot,
    last_used: u64,
}

/// Result of a column probe: extreme heights and the union of surface flags hit
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColumnHit {
    pub lowest: f32,
    pub highest: f32,
    pub flags: TypeFlags,
}

impl ColumnHit {
    fn add(hit: &mut Option<ColumnHit>, z: f32, flags: TypeFlags) {
        match hit {
            Some(h) => {
                h.lowest = h.lowest.min(z);
                h.highest = h.highest.max(z);
                h.flags |= flags;
            }
            None => {
                *hit = Some(ColumnHit {
                    lowest: z,
                    highest: z,
                    flags,
                })
            }
        }
    }
}

pub struct ChunkedTriangleWorld {
    map_id: u32,
    chunk_size: f32,
    cell_size: f32,
    max_cached: usize,
    supplier: Arc<dyn TriangleSupplier>,
    events: EventBus,
    cache: SparseMatrix2D<CacheEntry>,
    tick: u64,
}

impl ChunkedTriangleWorld {
    pub fn new(map_id: u32, supplier: Arc<dyn TriangleSupplier>, config: &NavConfig, events: EventBus) -> Self {
        Self {
            map_id,
            chunk_size: config.chunk_size,
            cell_size: config.triangle_cell_size,
            max_cached: config.max_cached_chunks.max(1),
            supplier,
            events,
            cache: SparseMatrix2D::new(),
            tick: 0,
        }
    }

    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    pub fn chunk_size(&self) -> f32 {
        self.chunk_size
    }

    /// Number of cache entries, absent markers included
    pub fn cached_chunks(&self) -> usize {
        self.cache.len()
    }

    pub fn loaded_chunks(&self) -> usize {
        self.cache
            .iter()
            .filter(|(_, e)| matches!(e.slot, CacheSlot::Loaded(_)))
            .count()
    }

    pub fn is_cached(&self, grid_x: i32, grid_y: i32) -> bool {
        self.cache.contains(grid_x, grid_y)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    fn key(&self, grid_x: i32, grid_y: i32) -> ChunkKey {
        ChunkKey::new(self.map_id, grid_x, grid_y)
    }

    /// Fetch a chunk through the cache, loading it on a miss
    pub fn chunk(&mut self, grid_x: i32, grid_y: i32) -> Result<Option<Arc<Chunk>>> {
        self.tick += 1;
        let tick = self.tick;

        if let Some(entry) = self.cache.get_mut(grid_x, grid_y) {
            entry.last_used = tick;
            return Ok(match &entry.slot {
                CacheSlot::Loaded(chunk) => Some(chunk.clone()),
                CacheSlot::Absent => None,
            });
        }

        let key = self.key(grid_x, grid_y);
        let triangles = self.supplier.load_chunk(key, &key.bounds(self.chunk_size))?;
        let slot = self.build_slot(key, triangles);
        let chunk = match &slot {
            CacheSlot::Loaded(chunk) => Some(chunk.clone()),
            CacheSlot::Absent => None,
        };
        self.insert(grid_x, grid_y, slot);
        Ok(chunk)
    }

    pub fn chunk_at(&mut self, x: f32, y: f32) -> Result<Option<Arc<Chunk>>> {
        let (gx, gy) = (grid_index(x, self.chunk_size), grid_index(y, self.chunk_size));
        self.chunk(gx, gy)
    }

    /// Loaded chunks overlapping a horizontal rectangle
    pub fn chunks_in(&mut self, min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Result<Vec<Arc<Chunk>>> {
        // Grid indices count down from the zero point, so max coords give min indices
        let (gx0, gx1) = (grid_index(max_x, self.chunk_size), grid_index(min_x, self.chunk_size));
        let (gy0, gy1) = (grid_index(max_y, self.chunk_size), grid_index(min_y, self.chunk_size));

        let mut chunks = Vec::new();
        for gx in gx0..=gx1 {
            for gy in gy0..=gy1 {
                if let Some(chunk) = self.chunk(gx, gy)? {
                    chunks.push(chunk);
                }
            }
        }
        Ok(chunks)
    }

    fn build_slot(&self, key: ChunkKey, triangles: Option<Vec<Triangle>>) -> CacheSlot {
        match triangles {
            Some(triangles) if !triangles.is_empty() => {
                let chunk = Chunk::new(key, triangles, self.chunk_size, self.cell_size);
                debug!(
                    "Loaded chunk {},{} of map {} ({} triangles)",
                    key.grid_x,
                    key.grid_y,
                    key.map_id,
                    chunk.len()
                );
                self.events.publish(NavEvent::ChunkAdded {
                    key,
                    triangles: chunk.len(),
                });
                CacheSlot::Loaded(Arc::new(chunk))
            }
            _ => {
                trace!("Chunk {},{} of map {} has no data", key.grid_x, key.grid_y, key.map_id);
                CacheSlot::Absent
            }
        }
    }

    fn insert(&mut self, grid_x: i32, grid_y: i32, slot: CacheSlot) {
        self.tick += 1;
        self.cache.set(
            grid_x,
            grid_y,
            CacheEntry {
                slot,
                last_used: self.tick,
            },
        );
        self.evict();
    }

    fn evict(&mut self) {
        while self.cache.len() > self.max_cached {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|(key, e)| (e.last_used, *key))
                .map(|(key, _)| key);
            let Some((gx, gy)) = oldest else { break };
            self.cache.remove(gx, gy);
            debug!("Evicted chunk {},{} of map {}", gx, gy, self.map_id);
        }
    }

    /// Load every missing chunk in the rectangle. Decoding runs in parallel;
    /// the cache is filled afterwards on this thread.
    pub fn preload(&mut self, bounds: &Aabb) -> Result<usize> {
        let (gx0, gx1) = (grid_index(bounds.max.x, self.chunk_size), grid_index(bounds.min.x, self.chunk_size));
        let (gy0, gy1) = (grid_index(bounds.max.y, self.chunk_size), grid_index(bounds.min.y, self.chunk_size));

        let mut missing = Vec::new();
        for gx in gx0..=gx1 {
            for gy in gy0..=gy1 {
                if !self.cache.contains(gx, gy) {
                    missing.push(self.key(gx, gy));
                }
            }
        }

        let supplier = &self.supplier;
        let chunk_size = self.chunk_size;
        let loaded: Vec<(ChunkKey, Option<Vec<Triangle>>)> = missing
            .par_iter()
            .map(|&key| -> Result<(ChunkKey, Option<Vec<Triangle>>)> {
                Ok((key, supplier.load_chunk(key, &key.bounds(chunk_size))?))
            })
            .collect::<Result<_>>()?;

        let mut count = 0;
        for (key, triangles) in loaded {
            let slot = self.build_slot(key, triangles);
            if matches!(slot, CacheSlot::Loaded(_)) {
                count += 1;
            }
            self.insert(key.grid_x, key.grid_y, slot);
        }
        Ok(count)
    }

    /// Triangles of the given kinds whose plane crosses the vertical line at (x, y)
    /// inside [min_z, max_z]
    pub fn probe(&mut self, x: f32, y: f32, min_z: f32, max_z: f32, flags: TypeFlags) -> Result<Option<ColumnHit>> {
        let Some(chunk) = self.chunk_at(x, y)? else {
            return Ok(None);
        };

        let mut hit = None;
        for tri in chunk.triangles_at(x, y) {
            if !tri.flags.intersects(flags) {
                continue;
            }
            if let Some(z) = tri.z_at(x, y)
                && (min_z..=max_z).contains(&z)
            {
                ColumnHit::add(&mut hit, z, tri.flags);
            }
        }
        Ok(hit)
    }

    /// All surface heights in the column window, highest first
    pub fn column(&mut self, x: f32, y: f32, min_z: f32, max_z: f32, flags: TypeFlags) -> Result<Vec<(f32, TypeFlags)>> {
        let Some(chunk) = self.chunk_at(x, y)? else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<(f32, TypeFlags)> = chunk
            .triangles_at(x, y)
            .filter(|t| t.flags.intersects(flags))
            .filter_map(|t| t.z_at(x, y).map(|z| (z, t.flags)))
            .filter(|(z, _)| (min_z..=max_z).contains(z))
            .collect();
        hits.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(hits)
    }

    /// Highest surface in the window with room for an agent standing on it
    pub fn find_standable_at(
        &mut self,
        x: f32,
        y: f32,
        min_z: f32,
        max_z: f32,
        agent_height: f32,
    ) -> Result<Option<(f32, TypeFlags)>> {
        let hits = self.column(x, y, min_z, max_z + agent_height, TypeFlags::ALL)?;

        for &(z, flags) in &hits {
            if z > max_z {
                continue;
            }
            let ceiling = hits.iter().any(|&(other, f)| {
                f.intersects(TypeFlags::SOLID) && other > z + HEAD_CLEARANCE && other < z + agent_height
            });
            if !ceiling {
                return Ok(Some((z, flags)));
            }
        }
        Ok(None)
    }

    fn triangles_near(&mut self, a: Vec3, b: Vec3, pad: f32) -> Result<Vec<Triangle>> {
        let (min_x, max_x) = (a.x.min(b.x) - pad, a.x.max(b.x) + pad);
        let (min_y, max_y) = (a.y.min(b.y) - pad, a.y.max(b.y) + pad);

        let mut out = Vec::new();
        for chunk in self.chunks_in(min_x, min_y, max_x, max_y)? {
            out.extend(chunk.triangles_in(min_x, min_y, max_x, max_y).into_iter().copied());
        }
        Ok(out)
    }

    /// Whether a solid surface cuts the walk from `a` to `b` at knee or head level
    pub fn is_step_blocked(&mut self, a: Vec3, b: Vec3, agent_height: f32) -> Result<bool> {
        let solids: Vec<Triangle> = self
            .triangles_near(a, b, 0.0)?
            .into_iter()
            .filter(|t| t.flags.intersects(TypeFlags::SOLID))
            .collect();

        for lift in [0.5, 0.9] {
            let up = Vec3::UP * (agent_height * lift);
            let (p0, p1) = (a + up, b + up);
            if solids.iter().any(|t| segment_intersects_triangle(p0, p1, &t.v)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn obstructions(&mut self, a: Vec3, b: Vec3, pad: f32, min_area: f32, agent_height: f32) -> Result<Vec<Triangle>> {
        let low = a.z.min(b.z) - agent_height * 0.5;
        let high = a.z.max(b.z) + agent_height;
        Ok(self
            .triangles_near(a, b, pad)?
            .into_iter()
            .filter(|t| t.flags.intersects(TypeFlags::OBSTRUCTION))
            .filter(|t| triangle_area(&t.v) >= min_area)
            .filter(|t| {
                let bounds = t.bounds();
                bounds.max.z >= low && bounds.min.z <= high
            })
            .collect())
    }

    /// A large enough model or object lies within `range` of `p` horizontally
    pub fn is_close_to_model(&mut self, p: Vec3, range: f32, min_area: f32, agent_height: f32) -> Result<bool> {
        Ok(self
            .obstructions(p, p, range, min_area, agent_height)?
            .iter()
            .any(|t| point_triangle_distance_2d(p, &t.v) <= range))
    }

    /// The walk from `a` to `b` passes over or through a large enough model or object
    pub fn crosses_model(&mut self, a: Vec3, b: Vec3, min_area: f32, agent_height: f32) -> Result<bool> {
        Ok(self
            .obstructions(a, b, 0.0, min_area, agent_height)?
            .iter()
            .any(|t| segment_crosses_triangle_2d(a, b, &t.v)))
    }
}
