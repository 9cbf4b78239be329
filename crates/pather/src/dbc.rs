// dbc.rs - Minimal WDBC client database reader
//
// Enough to pull fixed-width records out of WorldMapArea.dbc: u32/f32 fields
// and string-table references.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{NavError, Result};

const WDBC_MAGIC: &[u8; 4] = b"WDBC";
const HEADER_SIZE: usize = 20;

pub struct DbcFile {
    record_count: u32,
    field_count: u32,
    record_size: u32,
    data: Vec<u8>,
    string_table: Vec<u8>,
}

pub struct DbcRecord<'a> {
    file: &'a DbcFile,
    index: usize,
}

fn truncated(what: &str) -> NavError {
    NavError::Dbc(format!("truncated {}", what))
}

impl DbcFile {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(truncated("header"));
        }

        let mut cursor = Cursor::new(bytes);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if &magic != WDBC_MAGIC {
            return Err(NavError::Dbc(format!("bad magic {:?}", magic)));
        }

        let record_count = cursor.read_u32::<LittleEndian>()?;
        let field_count = cursor.read_u32::<LittleEndian>()?;
        let record_size = cursor.read_u32::<LittleEndian>()?;
        let string_size = cursor.read_u32::<LittleEndian>()?;

        if field_count.checked_mul(4) != Some(record_size) {
            return Err(NavError::Dbc(format!(
                "{} fields do not fill a {} byte record",
                field_count, record_size
            )));
        }

        let data_size = record_count
            .checked_mul(record_size)
            .ok_or_else(|| NavError::Dbc("record block size overflows".into()))? as usize;
        if bytes.len() < HEADER_SIZE + data_size + string_size as usize {
            return Err(truncated("record block"));
        }

        let mut data = vec![0u8; data_size];
        cursor.read_exact(&mut data)?;
        let mut string_table = vec![0u8; string_size as usize];
        cursor.read_exact(&mut string_table)?;

        Ok(Self {
            record_count,
            field_count,
            record_size,
            data,
            string_table,
        })
    }

    pub fn record_count(&self) -> usize {
        self.record_count as usize
    }

    pub fn field_count(&self) -> usize {
        self.field_count as usize
    }

    pub fn record(&self, index: usize) -> Option<DbcRecord<'_>> {
        (index < self.record_count()).then_some(DbcRecord { file: self, index })
    }

    pub fn records(&self) -> impl Iterator<Item = DbcRecord<'_>> {
        (0..self.record_count()).map(move |index| DbcRecord { file: self, index })
    }
}

impl DbcRecord<'_> {
    fn field_bytes(&self, field: usize) -> Option<[u8; 4]> {
        if field >= self.file.field_count() {
            return None;
        }
        let start = self.index * self.file.record_size as usize + field * 4;
        self.file.data.get(start..start + 4)?.try_into().ok()
    }

    pub fn get_u32(&self, field: usize) -> Option<u32> {
        self.field_bytes(field).map(u32::from_le_bytes)
    }

    pub fn get_f32(&self, field: usize) -> Option<f32> {
        self.field_bytes(field).map(f32::from_le_bytes)
    }

    /// Strings past the end of the table read as empty
    pub fn get_string(&self, field: usize) -> Option<String> {
        let offset = self.get_u32(field)? as usize;
        let Some(slice) = self.file.string_table.get(offset..) else {
            return Some(String::new());
        };
        let len = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
        Some(String::from_utf8_lossy(&slice[..len]).into_owned())
    }
}

/// Assemble a WDBC image from raw 4-byte fields and a string table
#[cfg(test)]
pub(crate) fn build_dbc(records: &[Vec<[u8; 4]>], strings: &[u8]) -> Vec<u8> {
    let field_count = records.first().map_or(0, |r| r.len()) as u32;
    let mut out = Vec::new();
    out.extend_from_slice(WDBC_MAGIC);
    out.extend_from_slice(&(records.len() as u32).to_le_bytes());
    out.extend_from_slice(&field_count.to_le_bytes());
    out.extend_from_slice(&(field_count * 4).to_le_bytes());
    out.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    for record in records {
        for field in record {
            out.extend_from_slice(field);
        }
    }
    out.extend_from_slice(strings);
    out
}
