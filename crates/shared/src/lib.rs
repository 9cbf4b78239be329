// Pather - Shared Library
// Logging, configuration and world-grid constants used by the engine and its tools

pub mod config;
pub mod log;

/// Edge length of one world grid (ADT tile) in world units
pub const GRID_SIZE: f32 = 533.333_3;

/// Number of grids along each world axis
pub const MAX_NUMBER_OF_GRIDS: i32 = 64;

/// World coordinate of grid (0, 0)'s far corner; the world spans [-ZERO_POINT, ZERO_POINT]
pub const ZERO_POINT: f32 = GRID_SIZE * (MAX_NUMBER_OF_GRIDS / 2) as f32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_point_covers_all_grids() {
        let span = GRID_SIZE * MAX_NUMBER_OF_GRIDS as f32;
        assert!((span / 2.0 - ZERO_POINT).abs() < 0.01);
    }
}
