// Route simplification: radial distance followed by Douglas-Peucker

use crate::math::{Vec3, point_segment_distance_sq};

/// Reduce `points` to waypoints deviating at most `tolerance` from the route.
/// First and last points are always kept.
pub fn simplify(points: &[Vec3], tolerance: f32) -> Vec<Vec3> {
    if points.len() <= 2 || tolerance <= 0.0 {
        return points.to_vec();
    }

    let sq_tolerance = tolerance * tolerance;
    let radial = radial_distance(points, sq_tolerance);
    douglas_peucker(&radial, sq_tolerance)
}

fn radial_distance(points: &[Vec3], sq_tolerance: f32) -> Vec<Vec3> {
    let mut kept = vec![points[0]];
    let mut last = points[0];

    for &p in &points[1..points.len() - 1] {
        if p.distance_squared(last) > sq_tolerance {
            kept.push(p);
            last = p;
        }
    }

    kept.push(points[points.len() - 1]);
    kept
}

fn douglas_peucker(points: &[Vec3], sq_tolerance: f32) -> Vec<Vec3> {
    let last = points.len() - 1;
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[last] = true;

    let mut stack = vec![(0usize, last)];
    while let Some((first, end)) = stack.pop() {
        let mut max_sq = 0.0f32;
        let mut index = 0;

        for i in first + 1..end {
            let d = point_segment_distance_sq(points[i], points[first], points[end]);
            if d > max_sq {
                max_sq = d;
                index = i;
            }
        }

        if max_sq > sq_tolerance {
            keep[index] = true;
            stack.push((first, index));
            stack.push((index, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}
