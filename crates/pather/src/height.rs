// height.rs - Standing height resolution for a world column
//
// Precedence: water above terrain wins, then a model/object floor close to
// the terrain, then terrain. Only the terrain probe falls back to the wide
// window when the narrow one finds nothing.

use serde::{Deserialize, Serialize};

use crate::config::NavConfig;
use crate::error::Result;
use crate::triangle::TypeFlags;
use crate::world::ChunkedTriangleWorld;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Surface {
    Terrain,
    Water,
    Model,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedHeight {
    pub z: f32,
    pub surface: Surface,
}

#[derive(Clone, Copy, Debug)]
pub struct HeightResolver {
    agent_height: f32,
    wide_range: f32,
}

impl HeightResolver {
    pub fn new(agent_height: f32, wide_range: f32) -> Self {
        Self {
            agent_height,
            wide_range,
        }
    }

    pub fn from_config(config: &NavConfig) -> Self {
        Self::new(config.agent_height, config.wide_search_range)
    }

    pub fn agent_height(&self) -> f32 {
        self.agent_height
    }

    /// Resolve the standing height of (x, y) near `z_hint`, or `None` when the
    /// column has no usable surface
    pub fn resolve(&self, world: &mut ChunkedTriangleWorld, x: f32, y: f32, z_hint: f32) -> Result<Option<ResolvedHeight>> {
        let narrow = 2.0 * self.agent_height;
        let (min_z, max_z) = (z_hint - narrow, z_hint + narrow);

        let mut terrain = world
            .probe(x, y, min_z, max_z, TypeFlags::TERRAIN)?
            .map(|h| h.highest);
        if terrain.is_none() {
            terrain = world
                .probe(x, y, z_hint - self.wide_range, z_hint + self.wide_range, TypeFlags::TERRAIN)?
                .map(|h| h.highest);
        }

        let water = world.probe(x, y, min_z, max_z, TypeFlags::WATER)?.map(|h| h.highest);
        if let Some(w) = water
            && terrain.is_none_or(|t| w > t)
        {
            return Ok(Some(ResolvedHeight {
                z: w,
                surface: Surface::Water,
            }));
        }

        // The model surface nearest the ground (or the hint) is the candidate floor
        let reference = terrain.unwrap_or(z_hint);
        let model = world
            .column(x, y, min_z, max_z, TypeFlags::OBSTRUCTION)?
            .into_iter()
            .map(|(z, _)| z)
            .min_by(|a, b| (a - reference).abs().total_cmp(&(b - reference).abs()));

        let resolved = match (terrain, model) {
            (Some(t), Some(m)) => {
                // A model far from the ground is an overhang; equal heights go to terrain
                if (m - t).abs() > self.agent_height * 0.5 || m == t {
                    ResolvedHeight {
                        z: t,
                        surface: Surface::Terrain,
                    }
                } else {
                    ResolvedHeight {
                        z: m,
                        surface: Surface::Model,
                    }
                }
            }
            (None, Some(m)) => ResolvedHeight {
                z: m,
                surface: Surface::Model,
            },
            (Some(t), None) => ResolvedHeight {
                z: t,
                surface: Surface::Terrain,
            },
            (None, None) => return Ok(None),
        };
        Ok(Some(resolved))
    }
}
