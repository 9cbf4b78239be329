// Sparse spatial store
//
// Hash-backed grids keyed by integer cells. The addressable world grid is far
// larger than the populated part, so nothing here allocates per empty cell.
// There is no eviction at this layer; owners bound their own growth.
//
// Range queries visit cells in ascending key order so that callers iterating
// the results stay deterministic regardless of hash layout.

use pather_shared::ZERO_POINT;
use rustc_hash::FxHashMap;

/// Default float-key offset; every legal world coordinate maps to a non-negative cell
pub const DEFAULT_OFFSET: f32 = ZERO_POINT;

#[derive(Debug, Clone)]
pub struct SparseMatrix2D<T> {
    cells: FxHashMap<(i32, i32), T>,
}

impl<T> Default for SparseMatrix2D<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SparseMatrix2D<T> {
    pub fn new() -> Self {
        Self {
            cells: FxHashMap::default(),
        }
    }

    pub fn set(&mut self, x: i32, y: i32, value: T) {
        self.cells.insert((x, y), value);
    }

    pub fn get(&self, x: i32, y: i32) -> Option<&T> {
        self.cells.get(&(x, y))
    }

    pub fn get_mut(&mut self, x: i32, y: i32) -> Option<&mut T> {
        self.cells.get_mut(&(x, y))
    }

    pub fn get_or_insert_with(&mut self, x: i32, y: i32, f: impl FnOnce() -> T) -> &mut T {
        self.cells.entry((x, y)).or_insert_with(f)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.cells.contains_key(&(x, y))
    }

    pub fn remove(&mut self, x: i32, y: i32) -> Option<T> {
        self.cells.remove(&(x, y))
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Unordered iteration over populated cells
    pub fn iter(&self) -> impl Iterator<Item = ((i32, i32), &T)> {
        self.cells.iter().map(|(k, v)| (*k, v))
    }

    /// Populated keys in the inclusive rectangle, ascending by (x, y)
    pub fn keys_in_square(&self, min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Vec<(i32, i32)> {
        if min_x > max_x || min_y > max_y {
            return Vec::new();
        }

        let area = (max_x as i64 - min_x as i64 + 1) * (max_y as i64 - min_y as i64 + 1);
        if area <= self.cells.len() as i64 * 4 {
            let mut keys = Vec::new();
            for x in min_x..=max_x {
                for y in min_y..=max_y {
                    if self.cells.contains_key(&(x, y)) {
                        keys.push((x, y));
                    }
                }
            }
            keys
        } else {
            let mut keys: Vec<(i32, i32)> = self
                .cells
                .keys()
                .filter(|(x, y)| (min_x..=max_x).contains(x) && (min_y..=max_y).contains(y))
                .copied()
                .collect();
            keys.sort_unstable();
            keys
        }
    }

    /// All values whose cell lies in the inclusive rectangle; empty cells are skipped
    pub fn get_all_in_square(&self, min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Vec<&T> {
        self.keys_in_square(min_x, min_y, max_x, max_y)
            .into_iter()
            .filter_map(|(x, y)| self.cells.get(&(x, y)))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct SparseMatrix3D<T> {
    cells: FxHashMap<(i32, i32, i32), T>,
}

impl<T> Default for SparseMatrix3D<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SparseMatrix3D<T> {
    pub fn new() -> Self {
        Self {
            cells: FxHashMap::default(),
        }
    }

    pub fn set(&mut self, x: i32, y: i32, z: i32, value: T) {
        self.cells.insert((x, y, z), value);
    }

    pub fn get(&self, x: i32, y: i32, z: i32) -> Option<&T> {
        self.cells.get(&(x, y, z))
    }

    pub fn get_mut(&mut self, x: i32, y: i32, z: i32) -> Option<&mut T> {
        self.cells.get_mut(&(x, y, z))
    }

    pub fn get_or_insert_with(&mut self, x: i32, y: i32, z: i32, f: impl FnOnce() -> T) -> &mut T {
        self.cells.entry((x, y, z)).or_insert_with(f)
    }

    pub fn contains(&self, x: i32, y: i32, z: i32) -> bool {
        self.cells.contains_key(&(x, y, z))
    }

    pub fn remove(&mut self, x: i32, y: i32, z: i32) -> Option<T> {
        self.cells.remove(&(x, y, z))
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Populated keys in the inclusive box, ascending by (x, y, z)
    pub fn keys_in_cube(&self, min: (i32, i32, i32), max: (i32, i32, i32)) -> Vec<(i32, i32, i32)> {
        if min.0 > max.0 || min.1 > max.1 || min.2 > max.2 {
            return Vec::new();
        }

        let span = |lo: i32, hi: i32| hi as i64 - lo as i64 + 1;
        let volume = span(min.0, max.0)
            .saturating_mul(span(min.1, max.1))
            .saturating_mul(span(min.2, max.2));
        if volume <= self.cells.len() as i64 * 4 {
            let mut keys = Vec::new();
            for x in min.0..=max.0 {
                for y in min.1..=max.1 {
                    for z in min.2..=max.2 {
                        if self.cells.contains_key(&(x, y, z)) {
                            keys.push((x, y, z));
                        }
                    }
                }
            }
            keys
        } else {
            let mut keys: Vec<(i32, i32, i32)> = self
                .cells
                .keys()
                .filter(|(x, y, z)| {
                    (min.0..=max.0).contains(x) && (min.1..=max.1).contains(y) && (min.2..=max.2).contains(z)
                })
                .copied()
                .collect();
            keys.sort_unstable();
            keys
        }
    }

    /// All values in the inclusive box, ascending by (x, y, z)
    pub fn get_all_in_cube(&self, min: (i32, i32, i32), max: (i32, i32, i32)) -> Vec<&T> {
        self.keys_in_cube(min, max)
            .into_iter()
            .filter_map(|k| self.cells.get(&k))
            .collect()
    }
}

/// Float-keyed 2D store: `cell = floor((v + offset) / cell_size)`
#[derive(Debug, Clone)]
pub struct SparseFloatMatrix2D<T> {
    cell_size: f32,
    offset: f32,
    inner: SparseMatrix2D<T>,
}

impl<T> SparseFloatMatrix2D<T> {
    pub fn new(cell_size: f32) -> Self {
        Self::with_offset(cell_size, DEFAULT_OFFSET)
    }

    pub fn with_offset(cell_size: f32, offset: f32) -> Self {
        debug_assert!(cell_size > 0.0);
        Self {
            cell_size,
            offset,
            inner: SparseMatrix2D::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn cell_of(&self, v: f32) -> i32 {
        ((v + self.offset) / self.cell_size).floor() as i32
    }

    /// Lower corner of a cell in world units
    pub fn cell_origin(&self, cell: i32) -> f32 {
        cell as f32 * self.cell_size - self.offset
    }

    pub fn set(&mut self, x: f32, y: f32, value: T) {
        let (cx, cy) = (self.cell_of(x), self.cell_of(y));
        self.inner.set(cx, cy, value);
    }

    pub fn get(&self, x: f32, y: f32) -> Option<&T> {
        self.inner.get(self.cell_of(x), self.cell_of(y))
    }

    pub fn get_mut(&mut self, x: f32, y: f32) -> Option<&mut T> {
        let (cx, cy) = (self.cell_of(x), self.cell_of(y));
        self.inner.get_mut(cx, cy)
    }

    pub fn get_or_insert_with(&mut self, x: f32, y: f32, f: impl FnOnce() -> T) -> &mut T {
        let (cx, cy) = (self.cell_of(x), self.cell_of(y));
        self.inner.get_or_insert_with(cx, cy, f)
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        self.inner.contains(self.cell_of(x), self.cell_of(y))
    }

    pub fn remove(&mut self, x: f32, y: f32) -> Option<T> {
        let (cx, cy) = (self.cell_of(x), self.cell_of(y));
        self.inner.remove(cx, cy)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get_all_in_square(&self, min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Vec<&T> {
        self.inner.get_all_in_square(
            self.cell_of(min_x),
            self.cell_of(min_y),
            self.cell_of(max_x),
            self.cell_of(max_y),
        )
    }
}

/// Float-keyed 3D store
#[derive(Debug, Clone)]
pub struct SparseFloatMatrix3D<T> {
    cell_size: f32,
    offset: f32,
    inner: SparseMatrix3D<T>,
}

impl<T> SparseFloatMatrix3D<T> {
    pub fn new(cell_size: f32) -> Self {
        Self::with_offset(cell_size, DEFAULT_OFFSET)
    }

    pub fn with_offset(cell_size: f32, offset: f32) -> Self {
        debug_assert!(cell_size > 0.0);
        Self {
            cell_size,
            offset,
            inner: SparseMatrix3D::new(),
        }
    }

    pub fn cell_of(&self, v: f32) -> i32 {
        ((v + self.offset) / self.cell_size).floor() as i32
    }

    fn key(&self, x: f32, y: f32, z: f32) -> (i32, i32, i32) {
        (self.cell_of(x), self.cell_of(y), self.cell_of(z))
    }

    pub fn set(&mut self, x: f32, y: f32, z: f32, value: T) {
        let (cx, cy, cz) = self.key(x, y, z);
        self.inner.set(cx, cy, cz, value);
    }

    pub fn get(&self, x: f32, y: f32, z: f32) -> Option<&T> {
        let (cx, cy, cz) = self.key(x, y, z);
        self.inner.get(cx, cy, cz)
    }

    pub fn get_or_insert_with(&mut self, x: f32, y: f32, z: f32, f: impl FnOnce() -> T) -> &mut T {
        let (cx, cy, cz) = self.key(x, y, z);
        self.inner.get_or_insert_with(cx, cy, cz, f)
    }

    pub fn contains(&self, x: f32, y: f32, z: f32) -> bool {
        let (cx, cy, cz) = self.key(x, y, z);
        self.inner.contains(cx, cy, cz)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get_all_in_cube(&self, min: (f32, f32, f32), max: (f32, f32, f32)) -> Vec<&T> {
        self.inner
            .get_all_in_cube(self.key(min.0, min.1, min.2), self.key(max.0, max.1, max.2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_contains() {
        let mut m = SparseMatrix2D::new();
        m.set(3, -7, "a");
        assert_eq!(m.get(3, -7), Some(&"a"));
        assert!(m.contains(3, -7));
        assert!(!m.contains(-7, 3));
        assert_eq!(m.remove(3, -7), Some("a"));
        assert!(m.is_empty());
    }

    #[test]
    fn test_get_all_in_square_skips_empty_cells() {
        let mut m = SparseMatrix2D::new();
        m.set(0, 0, 1);
        m.set(2, 1, 2);
        m.set(5, 5, 3);
        assert_eq!(m.get_all_in_square(0, 0, 3, 3), vec![&1, &2]);
        assert!(m.get_all_in_square(10, 10, 12, 12).is_empty());
    }

    #[test]
    fn test_square_order_is_stable_for_large_rectangles() {
        let mut m = SparseMatrix2D::new();
        for (i, k) in [(40, 2), (-3, 9), (7, 7), (-3, -1)].iter().enumerate() {
            m.set(k.0, k.1, i);
        }
        // Larger than 4x the population, so the filtered path is taken
        let keys = m.keys_in_square(-100, -100, 100, 100);
        assert_eq!(keys, vec![(-3, -1), (-3, 9), (7, 7), (40, 2)]);
    }

    #[test]
    fn test_float_keys_are_non_negative_for_world_coordinates() {
        let m: SparseFloatMatrix2D<()> = SparseFloatMatrix2D::new(4.0);
        assert!(m.cell_of(-ZERO_POINT) >= 0);
        assert_eq!(m.cell_of(0.0), m.cell_of(1.0));
        assert_ne!(m.cell_of(-0.5), m.cell_of(4.0));
    }

    #[test]
    fn test_float_matrix_buckets() {
        let mut m = SparseFloatMatrix2D::with_offset(2.0, 0.0);
        m.get_or_insert_with(0.5, 0.5, Vec::new).push(1);
        m.get_or_insert_with(1.5, 1.9, Vec::new).push(2);
        m.get_or_insert_with(2.5, 0.5, Vec::new).push(3);
        assert_eq!(m.get(0.0, 0.0), Some(&vec![1, 2]));
        assert_eq!(m.len(), 2);
        assert_eq!(m.get_all_in_square(0.0, 0.0, 3.0, 1.0).len(), 2);
        assert_eq!(m.cell_origin(1), 2.0);
    }

    #[test]
    fn test_cube_walk_and_filter_agree() {
        let mut m = SparseMatrix3D::new();
        for x in 0..6 {
            for y in 0..6 {
                m.set(x, y, x - y, (x, y));
            }
        }
        // Small box walks cells, the large one filters keys; both ascend
        let small = m.keys_in_cube((1, 1, -1), (2, 2, 1));
        assert_eq!(small, vec![(1, 1, 0), (1, 2, -1), (2, 1, 1), (2, 2, 0)]);
        let large = m.keys_in_cube((-50, -50, -50), (50, 50, 50));
        assert_eq!(large.len(), 36);
        assert!(large.windows(2).all(|w| w[0] < w[1]));
        assert!(m.keys_in_cube((3, 0, 0), (2, 9, 9)).is_empty());
    }

    #[test]
    fn test_float_matrix_3d() {
        let mut m = SparseFloatMatrix3D::with_offset(1.0, 0.0);
        m.set(1.2, 2.2, 3.2, 'x');
        m.set(1.7, 2.7, 9.0, 'y');
        assert_eq!(m.get(1.0, 2.0, 3.9), Some(&'x'));
        assert!(m.contains(1.5, 2.5, 9.5));
        assert_eq!(m.get_all_in_cube((0.0, 0.0, 0.0), (2.0, 3.0, 4.0)), vec![&'x']);
    }
}
