// Geometry kernel: vectors, boxes and the triangle tests used by the world queries

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Barycentric slack so points on shared edges hit both neighbours
const EDGE_EPSILON: f32 = 1e-4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    pub const UP: Vec3 = Vec3::new(0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    pub fn distance_squared(self, other: Self) -> f32 {
        (self - other).length_squared()
    }

    /// Horizontal distance, ignoring z
    pub fn distance_2d(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }

    pub fn with_z(self, z: f32) -> Self {
        Self::new(self.x, self.y, z)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// A world position together with the map it belongs to
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldLocation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub map_id: u32,
}

impl WorldLocation {
    pub const fn new(x: f32, y: f32, z: f32, map_id: u32) -> Self {
        Self { x, y, z, map_id }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn from_position(p: Vec3, map_id: u32) -> Self {
        Self::new(p.x, p.y, p.z, map_id)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    pub fn from_triangle(v: &[Vec3; 3]) -> Self {
        let mut bounds = Self::from_point(v[0]);
        bounds.merge(v[1]);
        bounds.merge(v[2]);
        bounds
    }

    pub fn merge(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn expand(self, by: f32) -> Self {
        let d = Vec3::new(by, by, by);
        Self::new(self.min - d, self.max + d)
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn intersects_2d(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// Height of the triangle's plane at (x, y), if (x, y) projects inside it.
/// Vertical triangles never answer.
pub fn z_at_xy(v: &[Vec3; 3], x: f32, y: f32) -> Option<f32> {
    let denom = (v[1].y - v[2].y) * (v[0].x - v[2].x) + (v[2].x - v[1].x) * (v[0].y - v[2].y);
    if denom.abs() < 1e-6 {
        return None;
    }

    let a = ((v[1].y - v[2].y) * (x - v[2].x) + (v[2].x - v[1].x) * (y - v[2].y)) / denom;
    let b = ((v[2].y - v[0].y) * (x - v[2].x) + (v[0].x - v[2].x) * (y - v[2].y)) / denom;
    let c = 1.0 - a - b;

    if a < -EDGE_EPSILON || b < -EDGE_EPSILON || c < -EDGE_EPSILON {
        return None;
    }

    Some(a * v[0].z + b * v[1].z + c * v[2].z)
}

/// Segment p0..p1 against a triangle (Möller–Trumbore)
pub fn segment_intersects_triangle(p0: Vec3, p1: Vec3, v: &[Vec3; 3]) -> bool {
    let dir = p1 - p0;
    let edge1 = v[1] - v[0];
    let edge2 = v[2] - v[0];

    let h = dir.cross(edge2);
    let det = edge1.dot(h);
    if det.abs() < 1e-8 {
        return false;
    }

    let inv_det = 1.0 / det;
    let s = p0 - v[0];
    let u = inv_det * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return false;
    }

    let q = s.cross(edge1);
    let w = inv_det * dir.dot(q);
    if w < 0.0 || u + w > 1.0 {
        return false;
    }

    let t = inv_det * edge2.dot(q);
    (0.0..=1.0).contains(&t)
}

pub fn triangle_area(v: &[Vec3; 3]) -> f32 {
    (v[1] - v[0]).cross(v[2] - v[0]).length() * 0.5
}

/// Squared distance from `p` to the segment a..b
pub fn point_segment_distance_sq(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return p.distance_squared(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance_squared(a + ab * t)
}

fn cross_2d(o: Vec3, a: Vec3, b: Vec3) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn point_in_triangle_2d(p: Vec3, v: &[Vec3; 3]) -> bool {
    let d0 = cross_2d(v[0], v[1], p);
    let d1 = cross_2d(v[1], v[2], p);
    let d2 = cross_2d(v[2], v[0], p);
    let has_neg = d0 < 0.0 || d1 < 0.0 || d2 < 0.0;
    let has_pos = d0 > 0.0 || d1 > 0.0 || d2 > 0.0;
    !(has_neg && has_pos)
}

fn segments_intersect_2d(a0: Vec3, a1: Vec3, b0: Vec3, b1: Vec3) -> bool {
    let d1 = cross_2d(b0, b1, a0);
    let d2 = cross_2d(b0, b1, a1);
    let d3 = cross_2d(a0, a1, b0);
    let d4 = cross_2d(a0, a1, b1);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

/// Whether the horizontal projection of a..b touches the triangle's footprint
pub fn segment_crosses_triangle_2d(a: Vec3, b: Vec3, v: &[Vec3; 3]) -> bool {
    if point_in_triangle_2d(a, v) || point_in_triangle_2d(b, v) {
        return true;
    }
    (0..3).any(|i| segments_intersect_2d(a, b, v[i], v[(i + 1) % 3]))
}

/// Horizontal distance from `p` to the triangle's footprint (0 inside)
pub fn point_triangle_distance_2d(p: Vec3, v: &[Vec3; 3]) -> f32 {
    if point_in_triangle_2d(p, v) {
        return 0.0;
    }
    let flat = p.with_z(0.0);
    (0..3)
        .map(|i| point_segment_distance_sq(flat, v[i].with_z(0.0), v[(i + 1) % 3].with_z(0.0)))
        .fold(f32::INFINITY, f32::min)
        .sqrt()
}
