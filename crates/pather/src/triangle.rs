// Triangles and per-grid chunks of world geometry

use bitflags::bitflags;
use pather_shared::ZERO_POINT;

use crate::math::{Aabb, Vec3, z_at_xy};
use crate::sparse::SparseFloatMatrix2D;

bitflags! {
    /// Surface classification of a triangle
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TypeFlags: u8 {
        const TERRAIN = 0x01;
        const WATER = 0x02;
        const OBJECT = 0x04;
        const MODEL = 0x08;

        const SOLID = Self::TERRAIN.bits() | Self::OBJECT.bits() | Self::MODEL.bits();
        const OBSTRUCTION = Self::OBJECT.bits() | Self::MODEL.bits();
        const ALL = Self::SOLID.bits() | Self::WATER.bits();
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub v: [Vec3; 3],
    pub flags: TypeFlags,
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3, flags: TypeFlags) -> Self {
        Self {
            v: [v0, v1, v2],
            flags,
        }
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_triangle(&self.v)
    }

    pub fn z_at(&self, x: f32, y: f32) -> Option<f32> {
        z_at_xy(&self.v, x, y)
    }

    pub fn is_finite(&self) -> bool {
        self.v.iter().all(|v| v.is_finite())
    }
}

/// Address of a chunk: map plus grid column (x) and row (y)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub map_id: u32,
    pub grid_x: i32,
    pub grid_y: i32,
}

impl ChunkKey {
    pub fn new(map_id: u32, grid_x: i32, grid_y: i32) -> Self {
        Self {
            map_id,
            grid_x,
            grid_y,
        }
    }

    /// Chunk containing world (x, y), counting grids down from the zero point
    pub fn containing(map_id: u32, x: f32, y: f32, chunk_size: f32) -> Self {
        Self::new(map_id, grid_index(x, chunk_size), grid_index(y, chunk_size))
    }

    /// Horizontal extent of the chunk; z is unbounded
    pub fn bounds(&self, chunk_size: f32) -> Aabb {
        let max_x = ZERO_POINT - self.grid_x as f32 * chunk_size;
        let max_y = ZERO_POINT - self.grid_y as f32 * chunk_size;
        Aabb::new(
            Vec3::new(max_x - chunk_size, max_y - chunk_size, f32::MIN),
            Vec3::new(max_x, max_y, f32::MAX),
        )
    }
}

pub fn grid_index(coord: f32, chunk_size: f32) -> i32 {
    ((ZERO_POINT - coord) / chunk_size).floor() as i32
}

/// One grid cell of geometry, built in a single step from its triangle list
#[derive(Debug)]
pub struct Chunk {
    key: ChunkKey,
    triangles: Vec<Triangle>,
    index: SparseFloatMatrix2D<Vec<u32>>,
}

impl Chunk {
    /// Index cells are clipped to the chunk; triangles reaching past it are
    /// only listed in the cells they share with it.
    pub fn new(key: ChunkKey, triangles: Vec<Triangle>, chunk_size: f32, cell_size: f32) -> Self {
        let mut index: SparseFloatMatrix2D<Vec<u32>> = SparseFloatMatrix2D::new(cell_size);
        let area = key.bounds(chunk_size);
        let (min_cx, max_cx) = (index.cell_of(area.min.x), index.cell_of(area.max.x));
        let (min_cy, max_cy) = (index.cell_of(area.min.y), index.cell_of(area.max.y));

        for (i, tri) in triangles.iter().enumerate() {
            if !tri.is_finite() {
                continue;
            }
            let b = tri.bounds();
            let (x0, x1) = (index.cell_of(b.min.x).max(min_cx), index.cell_of(b.max.x).min(max_cx));
            let (y0, y1) = (index.cell_of(b.min.y).max(min_cy), index.cell_of(b.max.y).min(max_cy));
            for cx in x0..=x1 {
                for cy in y0..=y1 {
                    let x = index.cell_origin(cx) + cell_size * 0.5;
                    let y = index.cell_origin(cy) + cell_size * 0.5;
                    index.get_or_insert_with(x, y, Vec::new).push(i as u32);
                }
            }
        }

        Self {
            key,
            triangles,
            index,
        }
    }

    pub fn key(&self) -> ChunkKey {
        self.key
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Triangles whose bounds cover the index cell of (x, y)
    pub fn triangles_at(&self, x: f32, y: f32) -> impl Iterator<Item = &Triangle> {
        self.index
            .get(x, y)
            .into_iter()
            .flatten()
            .map(|&i| &self.triangles[i as usize])
    }

    /// Triangles touching the horizontal rectangle, each reported once
    pub fn triangles_in(&self, min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Vec<&Triangle> {
        let mut ids: Vec<u32> = self
            .index
            .get_all_in_square(min_x, min_y, max_x, max_y)
            .into_iter()
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().map(|i| &self.triangles[i as usize]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f32, y0: f32, x1: f32, y1: f32, z: f32, flags: TypeFlags) -> Vec<Triangle> {
        vec![
            Triangle::new(Vec3::new(x0, y0, z), Vec3::new(x1, y0, z), Vec3::new(x1, y1, z), flags),
            Triangle::new(Vec3::new(x0, y0, z), Vec3::new(x1, y1, z), Vec3::new(x0, y1, z), flags),
        ]
    }

    #[test]
    fn test_flag_groups() {
        assert!(TypeFlags::SOLID.contains(TypeFlags::MODEL));
        assert!(!TypeFlags::SOLID.contains(TypeFlags::WATER));
        assert!(TypeFlags::OBSTRUCTION.intersects(TypeFlags::OBJECT));
        assert_eq!(TypeFlags::ALL.bits(), 0x0F);
    }

    #[test]
    fn test_chunk_index_lookup() {
        let mut tris = square(0.0, 0.0, 20.0, 20.0, 1.0, TypeFlags::TERRAIN);
        tris.extend(square(100.0, 100.0, 104.0, 104.0, 7.0, TypeFlags::MODEL));
        let chunk = Chunk::new(ChunkKey::new(0, 31, 31), tris, pather_shared::GRID_SIZE, 4.0);

        assert_eq!(chunk.len(), 4);
        assert_eq!(chunk.triangles_at(10.0, 10.0).count(), 2);
        assert!(chunk.triangles_at(102.0, 102.0).all(|t| t.flags == TypeFlags::MODEL));
        assert_eq!(chunk.triangles_at(60.0, 60.0).count(), 0);
        assert_eq!(chunk.triangles_in(-5.0, -5.0, 200.0, 200.0).len(), 4);
    }

    #[test]
    fn test_chunk_key_bounds_contain_point() {
        let size = pather_shared::GRID_SIZE;
        for &(x, y) in &[(0.5, 0.5), (-1200.0, 3000.0), (15900.0, -15900.0)] {
            let key = ChunkKey::containing(1, x, y, size);
            let b = key.bounds(size);
            assert!(b.min.x <= x && x <= b.max.x, "x={} in {:?}", x, b);
            assert!(b.min.y <= y && y <= b.max.y, "y={} in {:?}", y, b);
        }
        assert_eq!(ChunkKey::containing(0, 100.0, 100.0, size).grid_x, 31);
    }

    #[test]
    fn test_oversized_triangle_is_indexed_inside_chunk_only() {
        let size = pather_shared::GRID_SIZE;
        let key = ChunkKey::new(0, 32, 32);
        let huge = Triangle::new(
            Vec3::new(-20000.0, -20000.0, 0.0),
            Vec3::new(20000.0, -20000.0, 0.0),
            Vec3::new(0.0, 20000.0, 0.0),
            TypeFlags::TERRAIN,
        );
        let chunk = Chunk::new(key, vec![huge], size, 4.0);

        let b = key.bounds(size);
        let cells = ((size / 4.0).ceil() as usize + 1).pow(2);
        assert!(chunk.index.len() <= cells, "{} cells indexed", chunk.index.len());
        assert_eq!(chunk.triangles_at(b.min.x + 1.0, b.min.y + 1.0).count(), 1);
        assert_eq!(chunk.triangles_at(b.max.x + 100.0, b.min.y + 1.0).count(), 0);
    }

    #[test]
    fn test_non_finite_triangle_is_not_indexed() {
        let bad = Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1e30, 0.0, 0.0),
            Vec3::new(0.0, f32::NAN, 0.0),
            TypeFlags::TERRAIN,
        );
        let chunk = Chunk::new(ChunkKey::new(0, 31, 31), vec![bad], pather_shared::GRID_SIZE, 4.0);
        assert_eq!(chunk.len(), 1);
        assert!(chunk.index.is_empty());
    }
}
