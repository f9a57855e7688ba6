//! Record encoding and file-name conventions shared by the writer, the
//! loader and the merge iterator.

use anyhow::{bail, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memtable::Entry;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Extension of the data file.
pub const DATA_EXT: &str = "sst";
/// Suffix appended to the data path for the index file.
pub const INDEX_EXT: &str = "index";
/// Suffix for not-yet-published files.
pub const TMP_EXT: &str = "tmp";

/// Allocation guard for keys read back from disk (64 KiB).
pub(crate) const MAX_KEY_BYTES: usize = 64 * 1024;
/// Allocation guard for values read back from disk (64 MiB).
pub(crate) const MAX_VALUE_BYTES: usize = 64 * 1024 * 1024;

/// Data file name for a table id: `table_<id>.sst`.
#[must_use]
pub fn data_file_name(id: u64) -> String {
    format!("table_{}.{}", id, DATA_EXT)
}

/// Index path for a data path: `table_<id>.sst` -> `table_<id>.sst.index`.
#[must_use]
pub fn index_path(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_os_string();
    name.push(".");
    name.push(INDEX_EXT);
    PathBuf::from(name)
}

/// Extracts the table id from a `table_<id>.sst` file name.
#[must_use]
pub fn parse_table_id(data_path: &Path) -> Option<u64> {
    let stem = data_path.file_stem()?.to_str()?;
    stem.strip_prefix("table_")?.parse().ok()
}

/// Number of bytes one record occupies on disk.
#[must_use]
pub(crate) fn record_len(key: &[u8], entry: &Entry) -> u64 {
    let vlen = entry.value.as_ref().map_or(0, Vec::len);
    4 + key.len() as u64 + 4 + vlen as u64 + 8 + 1
}

/// Writes one data record:
/// `u32 key_len | key | u32 val_len | value | u64 seq | u8 tombstone`.
///
/// A tombstone is written with `val_len = 0` and the flag set.
pub(crate) fn write_record<W: Write>(w: &mut W, key: &[u8], entry: &Entry) -> Result<()> {
    w.write_u32::<LittleEndian>(key.len() as u32)?;
    w.write_all(key)?;
    match &entry.value {
        Some(v) => {
            w.write_u32::<LittleEndian>(v.len() as u32)?;
            w.write_all(v)?;
        }
        None => w.write_u32::<LittleEndian>(0)?,
    }
    w.write_u64::<LittleEndian>(entry.seq)?;
    w.write_u8(entry.is_tombstone() as u8)?;
    Ok(())
}

/// Reads one data record written by [`write_record`].
pub(crate) fn read_record<R: Read>(r: &mut R) -> Result<(Vec<u8>, Entry)> {
    let key_len = r.read_u32::<LittleEndian>()? as usize;
    if key_len > MAX_KEY_BYTES {
        bail!("corrupt record: key_len {} exceeds {}", key_len, MAX_KEY_BYTES);
    }
    let mut key = vec![0u8; key_len];
    r.read_exact(&mut key)?;

    let val_len = r.read_u32::<LittleEndian>()? as usize;
    if val_len > MAX_VALUE_BYTES {
        bail!("corrupt record: val_len {} exceeds {}", val_len, MAX_VALUE_BYTES);
    }
    let mut value = vec![0u8; val_len];
    r.read_exact(&mut value)?;

    let seq = r.read_u64::<LittleEndian>()?;
    let tombstone = r.read_u8()? != 0;

    let entry = Entry {
        seq,
        value: if tombstone { None } else { Some(value) },
    };
    Ok((key, entry))
}
