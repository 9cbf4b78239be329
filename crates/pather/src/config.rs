// config.rs - Engine settings
//
// Built from defaults, from a JSON override file, or from the shared INI
// configuration (`Nav.*` keys, overridable through `Pather_Nav_*` env vars).

use std::path::PathBuf;

use pather_shared::GRID_SIZE;
use pather_shared::config::Config;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    pub data_dir: PathBuf,
    pub graph_dir: Option<PathBuf>,
    pub world_map_areas: PathBuf,
    pub chunk_size: f32,
    pub triangle_cell_size: f32,
    pub max_cached_chunks: usize,
    pub agent_height: f32,
    pub agent_radius: f32,
    pub step_length: f32,
    /// Degrees
    pub max_slope: f32,
    pub wide_search_range: f32,
    pub close_enough: f32,
    pub max_search_spots: usize,
    pub model_avoid_range: f32,
    pub model_min_area: f32,
    pub model_penalty: f32,
    pub water_cost_factor: f32,
    /// 0 disables route simplification
    pub simplify_tolerance: f32,
}

fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_world_map_areas() -> PathBuf { PathBuf::from("data/WorldMapArea.json") }
fn default_chunk_size() -> f32 { GRID_SIZE }
fn default_triangle_cell_size() -> f32 { 4.0 }
fn default_max_cached_chunks() -> usize { 64 }
fn default_agent_height() -> f32 { 2.0 }
fn default_agent_radius() -> f32 { 0.5 }
fn default_step_length() -> f32 { 3.0 }
fn default_max_slope() -> f32 { 50.0 }
fn default_wide_search_range() -> f32 { 2000.0 }
fn default_close_enough() -> f32 { 3.0 }
fn default_max_search_spots() -> usize { 20_000 }
fn default_model_avoid_range() -> f32 { 2.0 }
fn default_model_min_area() -> f32 { 1.0 }
fn default_model_penalty() -> f32 { 30.0 }
fn default_water_cost_factor() -> f32 { 2.0 }

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            graph_dir: None,
            world_map_areas: default_world_map_areas(),
            chunk_size: default_chunk_size(),
            triangle_cell_size: default_triangle_cell_size(),
            max_cached_chunks: default_max_cached_chunks(),
            agent_height: default_agent_height(),
            agent_radius: default_agent_radius(),
            step_length: default_step_length(),
            max_slope: default_max_slope(),
            wide_search_range: default_wide_search_range(),
            close_enough: default_close_enough(),
            max_search_spots: default_max_search_spots(),
            model_avoid_range: default_model_avoid_range(),
            model_min_area: default_model_min_area(),
            model_penalty: default_model_penalty(),
            water_cost_factor: default_water_cost_factor(),
            simplify_tolerance: 0.0,
        }
    }
}

impl NavConfig {
    /// Read `Nav.*` keys, falling back to the defaults for anything unset
    pub fn from_config(config: &Config) -> Self {
        let d = Self::default();
        let path = |key: &str, default: &PathBuf| {
            PathBuf::from(config.get_string_default(key, &default.to_string_lossy()))
        };
        let count = |key: &str, default: usize| {
            config.get_int_default(key, default as i32).max(0) as usize
        };

        let graph_dir = config.get_string("Nav.GraphDir");

        Self {
            data_dir: path("Nav.DataDir", &d.data_dir),
            graph_dir: (!graph_dir.is_empty()).then(|| PathBuf::from(graph_dir)),
            world_map_areas: path("Nav.WorldMapAreas", &d.world_map_areas),
            chunk_size: config.get_float_default("Nav.ChunkSize", d.chunk_size),
            triangle_cell_size: config.get_float_default("Nav.TriangleCellSize", d.triangle_cell_size),
            max_cached_chunks: count("Nav.MaxCachedChunks", d.max_cached_chunks).max(1),
            agent_height: config.get_float_default("Nav.AgentHeight", d.agent_height),
            agent_radius: config.get_float_default("Nav.AgentRadius", d.agent_radius),
            step_length: config.get_float_default("Nav.StepLength", d.step_length),
            max_slope: config.get_float_default("Nav.MaxSlope", d.max_slope),
            wide_search_range: config.get_float_default("Nav.WideSearchRange", d.wide_search_range),
            close_enough: config.get_float_default("Nav.CloseEnough", d.close_enough),
            max_search_spots: count("Nav.MaxSearchSpots", d.max_search_spots),
            model_avoid_range: config.get_float_default("Nav.ModelAvoidRange", d.model_avoid_range),
            model_min_area: config.get_float_default("Nav.ModelMinArea", d.model_min_area),
            model_penalty: config.get_float_default("Nav.ModelPenalty", d.model_penalty),
            water_cost_factor: config.get_float_default("Nav.WaterCostFactor", d.water_cost_factor),
            simplify_tolerance: config.get_float_default("Nav.SimplifyTolerance", d.simplify_tolerance),
        }
    }

    /// Rise allowed per unit of horizontal travel
    pub fn max_slope_ratio(&self) -> f32 {
        self.max_slope.to_radians().tan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_empty_config_is_default() {
        let config = Config::new();
        assert_eq!(NavConfig::from_config(&config), NavConfig::default());
    }

    #[test]
    fn test_from_config_reads_nav_section() {
        let mut config = Config::new();
        assert!(config.load_str(
            "[Nav]\nDataDir = /srv/tri\nGraphDir = /srv/graph\nStepLength = 4\nMaxSearchSpots = 500\n"
        ));
        let nav = NavConfig::from_config(&config);
        assert_eq!(nav.data_dir, PathBuf::from("/srv/tri"));
        assert_eq!(nav.graph_dir, Some(PathBuf::from("/srv/graph")));
        assert_eq!(nav.step_length, 4.0);
        assert_eq!(nav.max_search_spots, 500);
        assert_eq!(nav.agent_height, 2.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let nav: NavConfig = serde_json::from_str(r#"{"agent_height": 3.0}"#).unwrap();
        assert_eq!(nav.agent_height, 3.0);
        assert_eq!(nav.close_enough, 3.0);
        assert!(nav.graph_dir.is_none());
    }

    #[test]
    fn test_slope_ratio() {
        let nav = NavConfig {
            max_slope: 45.0,
            ..NavConfig::default()
        };
        assert!((nav.max_slope_ratio() - 1.0).abs() < 1e-5);
    }
}
