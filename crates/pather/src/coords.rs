// coords.rs - World <-> zone map coordinates
//
// A zone's map coordinates are percentages of its bounding rectangle.
// Map X runs from top (0) to bottom (100) along world X, map Y from left (0)
// to right (100) along world Y. The game UI lists the horizontal axis first,
// which is map Y; the *_flip_xy helpers take and return UI order.

use std::io::Read;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dbc::DbcFile;
use crate::error::{NavError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldMapArea {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "MapID")]
    pub map_id: u32,
    #[serde(rename = "AreaID")]
    pub area_id: u32,
    #[serde(rename = "AreaName", default)]
    pub area_name: String,
    #[serde(rename = "LocLeft")]
    pub loc_left: f32,
    #[serde(rename = "LocRight")]
    pub loc_right: f32,
    #[serde(rename = "LocTop")]
    pub loc_top: f32,
    #[serde(rename = "LocBottom")]
    pub loc_bottom: f32,
    /// Zero means "same as ID"
    #[serde(rename = "UIMapId", default)]
    pub ui_map_id: u32,
    #[serde(rename = "ContinentID", default)]
    pub continent_id: u32,
}

// Evaluated in f64; zone edges are thousands of units from the origin
impl WorldMapArea {
    pub fn to_world_x(&self, map_x: f32) -> f32 {
        let (top, bottom) = (self.loc_top as f64, self.loc_bottom as f64);
        ((bottom - top) * map_x as f64 / 100.0 + top) as f32
    }

    pub fn to_world_y(&self, map_y: f32) -> f32 {
        let (left, right) = (self.loc_left as f64, self.loc_right as f64);
        ((right - left) * map_y as f64 / 100.0 + left) as f32
    }

    pub fn to_map_x(&self, world_x: f32) -> f32 {
        let (top, bottom) = (self.loc_top as f64, self.loc_bottom as f64);
        (100.0 - (world_x as f64 - bottom) * 100.0 / (top - bottom)) as f32
    }

    pub fn to_map_y(&self, world_y: f32) -> f32 {
        let (left, right) = (self.loc_left as f64, self.loc_right as f64);
        (100.0 - (world_y as f64 - right) * 100.0 / (left - right)) as f32
    }

    /// UI (horizontal, vertical) percentages to world (x, y)
    pub fn to_world_flip_xy(&self, ui_x: f32, ui_y: f32) -> (f32, f32) {
        (self.to_world_x(ui_y), self.to_world_y(ui_x))
    }

    /// World (x, y) to UI (horizontal, vertical) percentages
    pub fn to_map_flip_xy(&self, world_x: f32, world_y: f32) -> (f32, f32) {
        (self.to_map_y(world_y), self.to_map_x(world_x))
    }

    pub fn contains(&self, world_x: f32, world_y: f32) -> bool {
        let (x0, x1) = (self.loc_bottom.min(self.loc_top), self.loc_bottom.max(self.loc_top));
        let (y0, y1) = (self.loc_right.min(self.loc_left), self.loc_right.max(self.loc_left));
        (x0..=x1).contains(&world_x) && (y0..=y1).contains(&world_y)
    }

    /// Continent-wide records (area 0) cover whole maps and are not zones
    pub fn is_zone(&self) -> bool {
        self.area_id != 0
    }
}

/// Zone table keyed by UI map id
#[derive(Clone, Debug, Default)]
pub struct WorldMapAreas {
    areas: Vec<WorldMapArea>,
    by_ui: FxHashMap<u32, usize>,
}

impl WorldMapAreas {
    pub fn new(mut areas: Vec<WorldMapArea>) -> Self {
        for area in &mut areas {
            if area.ui_map_id == 0 {
                area.ui_map_id = area.id;
            }
            if area.continent_id == 0 {
                area.continent_id = area.map_id;
            }
        }
        areas.sort_by_key(|a| a.ui_map_id);

        let by_ui = areas.iter().enumerate().map(|(i, a)| (a.ui_map_id, i)).collect();
        Self { areas, by_ui }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(Self::new(serde_json::from_reader(reader)?))
    }

    /// Read WorldMapArea.dbc
    pub fn from_dbc_bytes(bytes: &[u8]) -> Result<Self> {
        let dbc = DbcFile::from_bytes(bytes)?;
        if dbc.field_count() < 8 {
            return Err(NavError::Dbc(format!(
                "WorldMapArea needs 8 fields, file has {}",
                dbc.field_count()
            )));
        }

        let mut areas = Vec::with_capacity(dbc.record_count());
        for record in dbc.records() {
            let field = |i: usize| record.get_f32(i).unwrap_or(0.0);
            let id = record.get_u32(0).unwrap_or(0);
            let map_id = record.get_u32(1).unwrap_or(0);
            areas.push(WorldMapArea {
                id,
                map_id,
                area_id: record.get_u32(2).unwrap_or(0),
                area_name: record.get_string(3).unwrap_or_default(),
                loc_left: field(4),
                loc_right: field(5),
                loc_top: field(6),
                loc_bottom: field(7),
                ui_map_id: id,
                continent_id: map_id,
            });
        }
        Ok(Self::new(areas))
    }

    /// Load by extension: `.dbc` as a client database, anything else as JSON
    pub fn load(path: &Path) -> Result<Self> {
        let is_dbc = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dbc"));

        let areas = if is_dbc {
            Self::from_dbc_bytes(&std::fs::read(path)?)?
        } else {
            Self::from_json_reader(std::io::BufReader::new(std::fs::File::open(path)?))?
        };
        info!("Loaded {} world map areas from {}", areas.len(), path.display());
        Ok(areas)
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorldMapArea> {
        self.areas.iter()
    }

    pub fn by_ui_map(&self, ui_map_id: u32) -> Option<&WorldMapArea> {
        self.by_ui.get(&ui_map_id).map(|&i| &self.areas[i])
    }

    /// Zone of `map_id` containing world (x, y).
    ///
    /// Overlapping zones need `hint` (a UI map id) to pick one. With no zone
    /// containing the point, a hint naming a zone of the same map is used as is.
    pub fn area_at(&self, map_id: u32, x: f32, y: f32, hint: Option<u32>) -> Result<&WorldMapArea> {
        let candidates: Vec<&WorldMapArea> = self
            .areas
            .iter()
            .filter(|a| a.map_id == map_id && a.is_zone() && a.contains(x, y))
            .collect();

        match (candidates.as_slice(), hint) {
            ([only], _) => Ok(*only),
            ([], Some(ui)) => self
                .by_ui_map(ui)
                .filter(|a| a.map_id == map_id)
                .inspect(|a| debug!("({:.1}, {:.1}) outside every zone, using hinted {}", x, y, a.area_name))
                .ok_or(NavError::NoAreaAt { map_id, x, y }),
            ([], None) => Err(NavError::NoAreaAt { map_id, x, y }),
            (many, hint) => hint
                .and_then(|ui| many.iter().find(|a| a.ui_map_id == ui).copied())
                .ok_or_else(|| NavError::AmbiguousArea {
                    map_id,
                    x,
                    y,
                    candidates: many.iter().map(|a| a.ui_map_id).collect(),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TABLE: &str = r#"[
        {"ID": 14, "MapID": 1, "AreaID": 0, "AreaName": "Kalimdor",
         "LocLeft": 11733.3, "LocRight": -19733.3, "LocTop": 12799.9, "LocBottom": -11733.3},
        {"ID": 4, "MapID": 1, "AreaID": 14, "AreaName": "Durotar",
         "LocLeft": -1962.5, "LocRight": -7249.99, "LocTop": 1808.33, "LocBottom": -1716.67},
        {"ID": 9, "MapID": 1, "AreaID": 215, "AreaName": "Mulgore",
         "LocLeft": 2047.92, "LocRight": -3089.58, "LocTop": -272.917, "LocBottom": -3697.92},
        {"ID": 12, "MapID": 0, "AreaID": 12, "AreaName": "Elwynn",
         "LocLeft": 1535.42, "LocRight": -1935.42, "LocTop": -7939.58, "LocBottom": -10254.2}
    ]"#;

    fn table() -> WorldMapAreas {
        WorldMapAreas::from_json_str(TABLE).unwrap()
    }

    #[test]
    fn test_json_names_and_defaults() {
        let areas = table();
        assert_eq!(areas.len(), 4);
        let durotar = areas.by_ui_map(4).unwrap();
        assert_eq!(durotar.area_name, "Durotar");
        assert_eq!(durotar.continent_id, 1);
        assert!(areas.by_ui_map(99).is_none());
    }

    #[test]
    fn test_round_trip_inside_bounds() {
        let areas = table();
        let durotar = areas.by_ui_map(4).unwrap();
        for &(x, y) in &[(1000.0, -4000.0), (-1500.0, -7000.0), (0.0, -2000.0)] {
            let (ui_x, ui_y) = durotar.to_map_flip_xy(x, y);
            let (wx, wy) = durotar.to_world_flip_xy(ui_x, ui_y);
            assert_relative_eq!(wx, x, epsilon = 1e-3);
            assert_relative_eq!(wy, y, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_corners_map_to_percentages() {
        let areas = table();
        let elwynn = areas.by_ui_map(12).unwrap();
        assert_relative_eq!(elwynn.to_map_x(elwynn.loc_top), 0.0, epsilon = 1e-3);
        assert_relative_eq!(elwynn.to_map_x(elwynn.loc_bottom), 100.0, epsilon = 1e-3);
        assert_relative_eq!(elwynn.to_map_y(elwynn.loc_left), 0.0, epsilon = 1e-3);
        assert_relative_eq!(elwynn.to_world_y(100.0), elwynn.loc_right, epsilon = 1e-2);
    }

    #[test]
    fn test_area_lookup_skips_continent_records() {
        let areas = table();
        let found = areas.area_at(1, 1000.0, -4000.0, None).unwrap();
        assert_eq!(found.area_name, "Durotar");
        assert!(matches!(
            areas.area_at(1, 9000.0, 9000.0, None),
            Err(NavError::NoAreaAt { .. })
        ));
    }

    #[test]
    fn test_overlap_needs_hint() {
        let areas = table();
        // Durotar and Mulgore overlap around (-1000, -2500)
        let err = areas.area_at(1, -1000.0, -2500.0, None).unwrap_err();
        match err {
            NavError::AmbiguousArea { candidates, .. } => assert_eq!(candidates, vec![4, 9]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(areas.area_at(1, -1000.0, -2500.0, Some(9)).unwrap().area_name, "Mulgore");
    }

    #[test]
    fn test_hint_used_outside_every_zone() {
        let areas = table();
        assert_eq!(areas.area_at(1, 9000.0, 9000.0, Some(4)).unwrap().id, 4);
        // A hint from another map does not help
        assert!(areas.area_at(1, 9000.0, 9000.0, Some(12)).is_err());
    }

    #[test]
    fn test_dbc_loader() {
        let strings = b"\0Durotar\0";
        let record = vec![
            4u32.to_le_bytes(),
            1u32.to_le_bytes(),
            14u32.to_le_bytes(),
            1u32.to_le_bytes(),
            (-1962.5f32).to_le_bytes(),
            (-7249.99f32).to_le_bytes(),
            1808.33f32.to_le_bytes(),
            (-1716.67f32).to_le_bytes(),
        ];
        let bytes = crate::dbc::build_dbc(&[record], strings);
        let areas = WorldMapAreas::from_dbc_bytes(&bytes).unwrap();
        let durotar = areas.by_ui_map(4).unwrap();
        assert_eq!(durotar.area_name, "Durotar");
        assert_eq!(durotar.loc_top, 1808.33);
        assert_eq!(durotar.continent_id, 1);
    }
}
