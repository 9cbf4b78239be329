// Triangle suppliers - where chunk geometry comes from
//
// `.tri` chunk files are produced by the extraction tools, one file per grid:
//   <data_dir>/<map:03><grid_y:02><grid_x:02>.tri
//
// Layout (little-endian):
//   magic "PTRI", version u32, map_id u32, grid_x i32, grid_y i32, count u32,
//   count x { 9 x f32 vertex coords, u8 type flags }

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::{NavError, Result};
use crate::math::{Aabb, Vec3};
use crate::triangle::{ChunkKey, Triangle, TypeFlags};

const CHUNK_MAGIC: &[u8; 4] = b"PTRI";
const CHUNK_VERSION: u32 = 1;

/// Upper bound on triangles per chunk; anything above is treated as corruption
const MAX_CHUNK_TRIANGLES: u32 = 8_000_000;

/// Preallocation cap; larger chunks grow as records are actually read
const PREALLOC_TRIANGLES: u32 = 65_536;

/// Source of per-chunk triangle lists.
///
/// `Ok(None)` means the chunk has no data. Errors are reserved for data
/// that exists but cannot be decoded.
pub trait TriangleSupplier: Send + Sync {
    fn load_chunk(&self, key: ChunkKey, bounds: &Aabb) -> Result<Option<Vec<Triangle>>>;
}

pub fn chunk_file_name(key: ChunkKey) -> String {
    format!("{:03}{:02}{:02}.tri", key.map_id, key.grid_y, key.grid_x)
}

/// Reads `.tri` files from a data directory
pub struct FileTriangleSupplier {
    data_dir: PathBuf,
}

impl FileTriangleSupplier {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn chunk_path(&self, key: ChunkKey) -> PathBuf {
        self.data_dir.join(chunk_file_name(key))
    }
}

impl TriangleSupplier for FileTriangleSupplier {
    fn load_chunk(&self, key: ChunkKey, _bounds: &Aabb) -> Result<Option<Vec<Triangle>>> {
        let path = self.chunk_path(key);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!("No chunk file {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let triangles = read_chunk(&mut BufReader::new(file), key).map_err(|reason| {
            NavError::MalformedChunk {
                path: path.clone(),
                reason,
            }
        })?;
        debug!("Read {} triangles from {}", triangles.len(), path.display());
        Ok(Some(triangles))
    }
}

fn read_chunk<R: Read>(reader: &mut R, key: ChunkKey) -> std::result::Result<Vec<Triangle>, String> {
    let io = |e: std::io::Error| e.to_string();

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(io)?;
    if &magic != CHUNK_MAGIC {
        return Err(format!("bad magic {:?}", magic));
    }

    let version = reader.read_u32::<LittleEndian>().map_err(io)?;
    if version != CHUNK_VERSION {
        return Err(format!("unsupported version {}", version));
    }

    let map_id = reader.read_u32::<LittleEndian>().map_err(io)?;
    let grid_x = reader.read_i32::<LittleEndian>().map_err(io)?;
    let grid_y = reader.read_i32::<LittleEndian>().map_err(io)?;
    if ChunkKey::new(map_id, grid_x, grid_y) != key {
        return Err(format!(
            "header says map {} grid {},{} but file is for {:?}",
            map_id, grid_x, grid_y, key
        ));
    }

    let count = reader.read_u32::<LittleEndian>().map_err(io)?;
    if count > MAX_CHUNK_TRIANGLES {
        return Err(format!("triangle count {} too large", count));
    }

    let mut triangles = Vec::with_capacity(count.min(PREALLOC_TRIANGLES) as usize);
    for i in 0..count {
        let mut v = [Vec3::ZERO; 3];
        for vertex in v.iter_mut() {
            let x = reader.read_f32::<LittleEndian>().map_err(io)?;
            let y = reader.read_f32::<LittleEndian>().map_err(io)?;
            let z = reader.read_f32::<LittleEndian>().map_err(io)?;
            *vertex = Vec3::new(x, y, z);
        }
        if !v.iter().all(|p| p.is_finite()) {
            return Err(format!("triangle {} has a non-finite vertex", i));
        }
        let raw = reader.read_u8().map_err(io)?;
        let flags = TypeFlags::from_bits(raw).ok_or_else(|| format!("unknown type flags {:#04x}", raw))?;
        triangles.push(Triangle { v, flags });
    }

    Ok(triangles)
}

/// Write a chunk in the `.tri` layout
pub fn write_chunk<W: Write>(writer: &mut W, key: ChunkKey, triangles: &[Triangle]) -> Result<()> {
    writer.write_all(CHUNK_MAGIC)?;
    writer.write_u32::<LittleEndian>(CHUNK_VERSION)?;
    writer.write_u32::<LittleEndian>(key.map_id)?;
    writer.write_i32::<LittleEndian>(key.grid_x)?;
    writer.write_i32::<LittleEndian>(key.grid_y)?;
    writer.write_u32::<LittleEndian>(triangles.len() as u32)?;
    for tri in triangles {
        for v in &tri.v {
            writer.write_f32::<LittleEndian>(v.x)?;
            writer.write_f32::<LittleEndian>(v.y)?;
            writer.write_f32::<LittleEndian>(v.z)?;
        }
        writer.write_u8(tri.flags.bits())?;
    }
    Ok(())
}

/// Write `<dir>/<map><gy><gx>.tri`, returning the file path
pub fn write_chunk_file(dir: &Path, key: ChunkKey, triangles: &[Triangle]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(chunk_file_name(key));
    let mut writer = BufWriter::new(File::create(&path)?);
    write_chunk(&mut writer, key, triangles)?;
    writer.flush()?;
    Ok(path)
}

/// Whole-map triangle soups held in memory, cut into chunks on request
#[derive(Default)]
pub struct MemoryTriangleSupplier {
    maps: FxHashMap<u32, Vec<Triangle>>,
}

impl MemoryTriangleSupplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, map_id: u32, triangle: Triangle) {
        self.maps.entry(map_id).or_default().push(triangle);
    }

    pub fn extend(&mut self, map_id: u32, triangles: impl IntoIterator<Item = Triangle>) {
        self.maps.entry(map_id).or_default().extend(triangles);
    }

    /// Two triangles covering an axis-aligned horizontal rectangle at height z
    pub fn add_quad(&mut self, map_id: u32, min: (f32, f32), max: (f32, f32), z: f32, flags: TypeFlags) {
        let (x0, y0) = min;
        let (x1, y1) = max;
        self.extend(
            map_id,
            [
                Triangle::new(Vec3::new(x0, y0, z), Vec3::new(x1, y0, z), Vec3::new(x1, y1, z), flags),
                Triangle::new(Vec3::new(x0, y0, z), Vec3::new(x1, y1, z), Vec3::new(x0, y1, z), flags),
            ],
        );
    }
}

impl TriangleSupplier for MemoryTriangleSupplier {
    fn load_chunk(&self, key: ChunkKey, bounds: &Aabb) -> Result<Option<Vec<Triangle>>> {
        let Some(soup) = self.maps.get(&key.map_id) else {
            return Ok(None);
        };

        let triangles: Vec<Triangle> = soup
            .iter()
            .filter(|t| t.bounds().intersects_2d(bounds))
            .copied()
            .collect();

        if triangles.is_empty() {
            Ok(None)
        } else {
            Ok(Some(triangles))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Triangle> {
        vec![
            Triangle::new(
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(10.0, 0.0, 1.0),
                Vec3::new(0.0, 10.0, 1.5),
                TypeFlags::TERRAIN,
            ),
            Triangle::new(
                Vec3::new(2.0, 2.0, 4.0),
                Vec3::new(3.0, 2.0, 4.0),
                Vec3::new(2.0, 3.0, 6.0),
                TypeFlags::MODEL,
            ),
        ]
    }

    #[test]
    fn test_chunk_file_name() {
        assert_eq!(chunk_file_name(ChunkKey::new(1, 7, 32)), "0013207.tri");
    }

    #[test]
    fn test_file_supplier_reads_written_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let key = ChunkKey::new(0, 31, 30);
        write_chunk_file(dir.path(), key, &sample()).unwrap();

        let supplier = FileTriangleSupplier::new(dir.path());
        let loaded = supplier.load_chunk(key, &key.bounds(533.3333)).unwrap().unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let supplier = FileTriangleSupplier::new(dir.path());
        let key = ChunkKey::new(0, 1, 1);
        assert!(supplier.load_chunk(key, &key.bounds(533.3333)).unwrap().is_none());
    }

    #[test]
    fn test_truncated_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let key = ChunkKey::new(0, 31, 31);
        let path = write_chunk_file(dir.path(), key, &sample()).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        let supplier = FileTriangleSupplier::new(dir.path());
        let err = supplier.load_chunk(key, &key.bounds(533.3333)).unwrap_err();
        assert!(matches!(err, NavError::MalformedChunk { .. }));
    }

    #[test]
    fn test_header_must_match_file_key() {
        let dir = tempfile::tempdir().unwrap();
        let key = ChunkKey::new(0, 31, 31);
        let other = ChunkKey::new(0, 30, 31);
        let path = write_chunk_file(dir.path(), key, &sample()).unwrap();
        std::fs::rename(&path, dir.path().join(chunk_file_name(other))).unwrap();

        let supplier = FileTriangleSupplier::new(dir.path());
        assert!(supplier.load_chunk(other, &other.bounds(533.3333)).is_err());
    }

    #[test]
    fn test_memory_supplier_cuts_by_bounds() {
        let mut supplier = MemoryTriangleSupplier::new();
        supplier.add_quad(0, (-5.0, -5.0), (5.0, 5.0), 0.0, TypeFlags::TERRAIN);

        let size = 533.3333;
        let inside = ChunkKey::containing(0, 1.0, 1.0, size);
        let far = ChunkKey::containing(0, 3000.0, 3000.0, size);
        assert_eq!(supplier.load_chunk(inside, &inside.bounds(size)).unwrap().unwrap().len(), 2);
        assert!(supplier.load_chunk(far, &far.bounds(size)).unwrap().is_none());
        assert!(supplier.load_chunk(ChunkKey::new(1, 0, 0), &far.bounds(size)).unwrap().is_none());
    }

    #[test]
    fn test_non_finite_vertex_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let key = ChunkKey::new(0, 31, 31);
        let mut tris = sample();
        tris[1].v[2].x = f32::INFINITY;
        write_chunk_file(dir.path(), key, &tris).unwrap();

        let supplier = FileTriangleSupplier::new(dir.path());
        let err = supplier.load_chunk(key, &key.bounds(533.3333)).unwrap_err();
        assert!(matches!(err, NavError::MalformedChunk { ref reason, .. } if reason.contains("non-finite")));
    }

    #[test]
    fn test_inflated_count_fails_on_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let key = ChunkKey::new(0, 31, 31);
        let path = write_chunk_file(dir.path(), key, &[]).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        let at = bytes.len() - 4;
        bytes[at..].copy_from_slice(&MAX_CHUNK_TRIANGLES.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let supplier = FileTriangleSupplier::new(dir.path());
        assert!(matches!(
            supplier.load_chunk(key, &key.bounds(533.3333)),
            Err(NavError::MalformedChunk { .. })
        ));
    }
}
