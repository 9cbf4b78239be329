// Spot graph persistence
//
// Lattice spots are grouped by the world chunk they fall in, one file per
// group under <graph_dir>/<map:03>/<grid_x>_<grid_y>.spots. Only groups that
// changed since they were loaded or last saved are written. Anchors are never
// stored.
//
// Layout (little-endian):
//   magic "PSPT", version u32, spot count u32,
//   per spot: i i32, j i32, z f32, flags u8, link count u32,
//     per link: i i32, j i32, z f32, target flags u8, crosses_model u8

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use super::{Link, PathGraph, SpotFlags, SpotId};
use crate::error::{NavError, Result};
use crate::math::Vec3;
use crate::triangle::ChunkKey;

const GRAPH_MAGIC: &[u8; 4] = b"PSPT";
const GRAPH_VERSION: u32 = 1;
const MAX_RECORDS: u32 = 4_000_000;
const MAX_LINKS: u32 = 64;
const PREALLOC_RECORDS: u32 = 65_536;

/// Flags that survive a save/load cycle
fn stored_flags(flags: SpotFlags) -> SpotFlags {
    flags - SpotFlags::CURRENT_PATH
}

#[derive(Debug)]
pub(super) struct GraphStore {
    dir: Option<PathBuf>,
    loaded: FxHashSet<ChunkKey>,
    dirty: BTreeSet<ChunkKey>,
}

impl GraphStore {
    pub(super) fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            loaded: FxHashSet::default(),
            dirty: BTreeSet::new(),
        }
    }

    pub(super) fn mark_dirty(&mut self, key: ChunkKey) {
        if self.dir.is_some() {
            self.dirty.insert(key);
        }
    }

    pub(super) fn reset(&mut self) {
        self.loaded.clear();
        self.dirty.clear();
    }

    fn group_path(dir: &Path, key: ChunkKey) -> PathBuf {
        dir.join(format!("{:03}", key.map_id))
            .join(format!("{}_{}.spots", key.grid_x, key.grid_y))
    }

    /// Path of a group that has not been read yet, marking it as read
    fn take_unloaded(&mut self, key: ChunkKey) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        if !self.loaded.insert(key) {
            return None;
        }
        Some(Self::group_path(dir, key))
    }
}

#[derive(Clone, Debug, PartialEq)]
struct LinkRecord {
    i: i32,
    j: i32,
    z: f32,
    flags: SpotFlags,
    crosses_model: bool,
}

#[derive(Clone, Debug, PartialEq)]
struct SpotRecord {
    i: i32,
    j: i32,
    z: f32,
    flags: SpotFlags,
    links: Vec<LinkRecord>,
}

fn read_group<R: Read>(reader: &mut R) -> std::result::Result<Vec<SpotRecord>, String> {
    let io = |e: std::io::Error| e.to_string();

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(io)?;
    if &magic != GRAPH_MAGIC {
        return Err(format!("bad magic {:?}", magic));
    }
    let version = reader.read_u32::<LittleEndian>().map_err(io)?;
    if version != GRAPH_VERSION {
        return Err(format!("unsupported version {}", version));
    }

    let count = reader.read_u32::<LittleEndian>().map_err(io)?;
    if count > MAX_RECORDS {
        return Err(format!("spot count {} too large", count));
    }

    let flags_of = |raw: u8| SpotFlags::from_bits(raw).ok_or_else(|| format!("unknown spot flags {:#04x}", raw));

    let mut records = Vec::with_capacity(count.min(PREALLOC_RECORDS) as usize);
    for _ in 0..count {
        let i = reader.read_i32::<LittleEndian>().map_err(io)?;
        let j = reader.read_i32::<LittleEndian>().map_err(io)?;
        let z = reader.read_f32::<LittleEndian>().map_err(io)?;
        let flags = flags_of(reader.read_u8().map_err(io)?)?;

        let link_count = reader.read_u32::<LittleEndian>().map_err(io)?;
        if link_count > MAX_LINKS {
            return Err(format!("spot {},{} has {} links", i, j, link_count));
        }
        let mut links = Vec::with_capacity(link_count as usize);
        for _ in 0..link_count {
            links.push(LinkRecord {
                i: reader.read_i32::<LittleEndian>().map_err(io)?,
                j: reader.read_i32::<LittleEndian>().map_err(io)?,
                z: reader.read_f32::<LittleEndian>().map_err(io)?,
                flags: flags_of(reader.read_u8().map_err(io)?)?,
                crosses_model: reader.read_u8().map_err(io)? != 0,
            });
        }

        records.push(SpotRecord { i, j, z, flags, links });
    }
    Ok(records)
}

fn write_group<W: Write>(writer: &mut W, records: &[SpotRecord]) -> std::io::Result<()> {
    writer.write_all(GRAPH_MAGIC)?;
    writer.write_u32::<LittleEndian>(GRAPH_VERSION)?;
    writer.write_u32::<LittleEndian>(records.len() as u32)?;
    for r in records {
        writer.write_i32::<LittleEndian>(r.i)?;
        writer.write_i32::<LittleEndian>(r.j)?;
        writer.write_f32::<LittleEndian>(r.z)?;
        writer.write_u8(r.flags.bits())?;
        writer.write_u32::<LittleEndian>(r.links.len() as u32)?;
        for l in &r.links {
            writer.write_i32::<LittleEndian>(l.i)?;
            writer.write_i32::<LittleEndian>(l.j)?;
            writer.write_f32::<LittleEndian>(l.z)?;
            writer.write_u8(l.flags.bits())?;
            writer.write_u8(l.crosses_model as u8)?;
        }
    }
    Ok(())
}

impl PathGraph {
    /// Read the saved group holding lattice column (i, j) the first time the
    /// group is touched. A damaged file is skipped; the graph is rebuilt from
    /// the world instead.
    pub(super) fn ensure_group(&mut self, i: i32, j: i32) {
        let key = self.group_of(i, j);
        let Some(path) = self.store.take_unloaded(key) else {
            return;
        };

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!("Cannot open spot group {}: {}", path.display(), e);
                return;
            }
        };

        match read_group(&mut BufReader::new(file)) {
            Ok(records) => {
                debug!("Loaded {} spots from {}", records.len(), path.display());
                self.merge_records(records);
            }
            Err(reason) => {
                let err = NavError::MalformedGraph { path, reason };
                warn!("{}", err);
            }
        }
    }

    /// Find or create a lattice spot without touching its group
    fn place_stored(&mut self, i: i32, j: i32, z: f32, flags: SpotFlags) -> SpotId {
        if let Some(id) = self.find_in_column(i, j, z) {
            return id;
        }
        let (x, y) = self.lattice_position(i, j);
        self.insert_spot(Vec3::new(x, y, z), flags, Some((i, j)))
    }

    fn merge_records(&mut self, records: Vec<SpotRecord>) {
        for record in records {
            let id = self.place_stored(record.i, record.j, record.z, record.flags - SpotFlags::EXPANDED);
            let spot = &mut self.spots[id.index()];
            spot.flags |= record.flags - SpotFlags::EXPANDED;

            if !record.flags.contains(SpotFlags::EXPANDED) || spot.is_expanded() {
                continue;
            }

            let links: Vec<Link> = record
                .links
                .iter()
                .map(|l| Link {
                    to: self.place_stored(l.i, l.j, l.z, l.flags - SpotFlags::EXPANDED),
                    crosses_model: l.crosses_model,
                })
                .collect();

            let spot = &mut self.spots[id.index()];
            for link in links {
                if link.to != id && !spot.links.iter().any(|l| l.to == link.to) {
                    spot.links.push(link);
                }
            }
            spot.flags |= SpotFlags::EXPANDED;
        }
    }

    fn group_records(&self, key: ChunkKey) -> Vec<SpotRecord> {
        let mut records: Vec<SpotRecord> = self
            .spots
            .iter()
            .filter_map(|spot| {
                let (i, j) = spot.lattice?;
                (self.group_of(i, j) == key).then_some((i, j, spot))
            })
            .map(|(i, j, spot)| SpotRecord {
                i,
                j,
                z: spot.position.z,
                flags: stored_flags(spot.flags),
                links: spot
                    .links
                    .iter()
                    .filter_map(|l| {
                        let target = &self.spots[l.to.index()];
                        let (ti, tj) = target.lattice?;
                        Some(LinkRecord {
                            i: ti,
                            j: tj,
                            z: target.position.z,
                            flags: stored_flags(target.flags) - SpotFlags::EXPANDED,
                            crosses_model: l.crosses_model,
                        })
                    })
                    .collect(),
            })
            .collect();

        records.sort_by(|a, b| (a.i, a.j).cmp(&(b.i, b.j)).then(a.z.total_cmp(&b.z)));
        records
    }

    /// Write every changed group. Returns how many files were written; with
    /// no graph directory configured this does nothing.
    pub fn save(&mut self) -> Result<usize> {
        let Some(dir) = self.store.dir.clone() else {
            return Ok(0);
        };
        if self.store.dirty.is_empty() {
            return Ok(0);
        }

        let map_dir = dir.join(format!("{:03}", self.map_id));
        std::fs::create_dir_all(&map_dir)?;

        // A group stays dirty until its file is fully written
        let dirty: Vec<ChunkKey> = self.store.dirty.iter().copied().collect();
        let mut written = 0;
        for key in dirty {
            let records = self.group_records(key);
            if !records.is_empty() {
                let path = GraphStore::group_path(&dir, key);
                let mut writer = BufWriter::new(File::create(&path)?);
                write_group(&mut writer, &records)?;
                writer.flush()?;
                debug!("Saved {} spots to {}", records.len(), path.display());
                written += 1;
            }
            self.store.dirty.remove(&key);
        }

        info!("Saved {} spot groups for map {}", written, self.map_id);
        Ok(written)
    }

    /// Groups changed since the last load or save
    pub fn dirty_groups(&self) -> usize {
        self.store.dirty.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::NavConfig;
    use crate::events::EventBus;
    use crate::graph::ScoreMode;
    use crate::supplier::MemoryTriangleSupplier;
    use crate::triangle::TypeFlags;
    use crate::world::ChunkedTriangleWorld;

    fn setup(dir: &Path) -> (ChunkedTriangleWorld, NavConfig) {
        let mut supplier = MemoryTriangleSupplier::new();
        supplier.add_quad(0, (-10.0, -10.0), (40.0, 10.0), 0.0, TypeFlags::TERRAIN);
        let config = NavConfig {
            graph_dir: Some(dir.to_path_buf()),
            ..NavConfig::default()
        };
        let world = ChunkedTriangleWorld::new(0, Arc::new(supplier), &config, EventBus::new());
        (world, config)
    }

    #[test]
    fn test_group_codec() {
        let records = vec![SpotRecord {
            i: -4,
            j: 7,
            z: 1.25,
            flags: SpotFlags::EXPANDED | SpotFlags::IN_WATER,
            links: vec![LinkRecord {
                i: -3,
                j: 7,
                z: 1.5,
                flags: SpotFlags::IN_WATER,
                crosses_model: true,
            }],
        }];
        let mut bytes = Vec::new();
        write_group(&mut bytes, &records).unwrap();
        assert_eq!(read_group(&mut bytes.as_slice()).unwrap(), records);
        assert!(read_group(&mut &bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_save_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (mut world, config) = setup(dir.path());
        let mut graph = PathGraph::new(0, &config);
        graph
            .create_path(&mut world, Vec3::ZERO, Vec3::new(30.0, 0.0, 0.0), ScoreMode::AStar, 3.0)
            .unwrap();

        let written = graph.save().unwrap();
        assert!(written > 0);
        let files: Vec<PathBuf> = std::fs::read_dir(dir.path().join("000"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        let before: Vec<Vec<u8>> = files.iter().map(|p| std::fs::read(p).unwrap()).collect();

        assert_eq!(graph.save().unwrap(), 0);
        let after: Vec<Vec<u8>> = files.iter().map(|p| std::fs::read(p).unwrap()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_saved_spots_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let (mut world, config) = setup(dir.path());
        let mut first = PathGraph::new(0, &config);
        let route = first
            .create_path(&mut world, Vec3::ZERO, Vec3::new(30.0, 0.0, 0.0), ScoreMode::AStar, 3.0)
            .unwrap();
        first.save().unwrap();

        let mut second = PathGraph::new(0, &config);
        let start = second.spot_for_location(&mut world, Vec3::ZERO).unwrap();
        assert!(second.spot(start).is_expanded());
        assert!(second.len() > 1);

        let again = second
            .create_path(&mut world, Vec3::ZERO, Vec3::new(30.0, 0.0, 0.0), ScoreMode::AStar, 3.0)
            .unwrap();
        assert_eq!(route, again);
    }

    #[test]
    fn test_corrupt_group_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (mut world, config) = setup(dir.path());
        let map_dir = dir.path().join("000");
        std::fs::create_dir_all(&map_dir).unwrap();
        let key = ChunkKey::containing(0, 0.0, 0.0, config.chunk_size);
        std::fs::write(GraphStore::group_path(dir.path(), key), b"junk").unwrap();

        let mut graph = PathGraph::new(0, &config);
        let start = graph.spot_for_location(&mut world, Vec3::ZERO).unwrap();
        assert!(!graph.spot(start).is_expanded());
    }

    #[test]
    fn test_failed_save_keeps_groups_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let (mut world, config) = setup(dir.path());
        let mut graph = PathGraph::new(0, &config);
        graph
            .create_path(&mut world, Vec3::ZERO, Vec3::new(30.0, 0.0, 0.0), ScoreMode::AStar, 3.0)
            .unwrap();
        let dirty = graph.dirty_groups();
        assert!(dirty > 0);

        // A directory squatting on the first group's file name makes its write fail
        let first = *graph.store.dirty.iter().next().unwrap();
        let blocker = GraphStore::group_path(dir.path(), first);
        std::fs::create_dir_all(&blocker).unwrap();
        assert!(graph.save().is_err());
        assert_eq!(graph.dirty_groups(), dirty);

        std::fs::remove_dir(&blocker).unwrap();
        assert_eq!(graph.save().unwrap(), dirty);
        assert_eq!(graph.dirty_groups(), 0);
        assert!(blocker.is_file());
    }

    #[test]
    fn test_inflated_spot_count_fails_on_truncation() {
        let mut bytes = Vec::new();
        write_group(&mut bytes, &[]).unwrap();
        let at = bytes.len() - 4;
        bytes[at..].copy_from_slice(&MAX_RECORDS.to_le_bytes());
        assert!(read_group(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn test_no_graph_dir_is_noop() {
        let (mut world, _) = setup(Path::new("/nonexistent"));
        let mut graph = PathGraph::new(0, &NavConfig::default());
        graph
            .create_path(&mut world, Vec3::ZERO, Vec3::new(9.0, 0.0, 0.0), ScoreMode::AStar, 3.0)
            .unwrap();
        assert_eq!(graph.dirty_groups(), 0);
        assert_eq!(graph.save().unwrap(), 0);
    }
}
