use anyhow::{bail, Context, Result};
use bloom::BloomFilter;
use byteorder::{LittleEndian, ReadBytesExt};
use memtable::Entry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::format::{self, index_path, parse_table_id, read_record, MAX_KEY_BYTES};

/// Sanity ceiling on index entry counts; a count beyond this is a corrupt
/// index, not a table.
const MAX_INDEX_ENTRIES: u64 = 1 << 40;

/// An immutable on-disk table: metadata and in-memory index over a data file.
///
/// Point lookups open the data file per call — a seek and a bounded read —
/// rather than keeping a shared handle. That trades a little syscall overhead
/// for trivial lifetime and sharing rules: an `SsTable` is plain immutable
/// data and can sit behind an `Arc` with no interior locking.
pub struct SsTable {
    id: u64,
    level: usize,
    /// Path of the data file; the index file sits next to it.
    path: PathBuf,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    bloom: BloomFilter,
    /// Key -> byte offset of the record in the data file.
    index: BTreeMap<Vec<u8>, u64>,
}

impl SsTable {
    pub(crate) fn from_parts(
        id: u64,
        level: usize,
        path: PathBuf,
        min_key: Vec<u8>,
        max_key: Vec<u8>,
        bloom: BloomFilter,
        index: BTreeMap<Vec<u8>, u64>,
    ) -> Self {
        Self {
            id,
            level,
            path,
            min_key,
            max_key,
            bloom,
            index,
        }
    }

    /// Loads a table by parsing its index file.
    ///
    /// `data_path` is the `.sst` file; the index is expected at
    /// `<data_path>.index`. Any parse failure is an error — the caller
    /// (the engine's recovery path) skips such tables without deleting
    /// their data files.
    pub fn load(data_path: &Path, level: usize) -> Result<Self> {
        let id = parse_table_id(data_path)
            .with_context(|| format!("unrecognised table file name {}", data_path.display()))?;

        let data_len = std::fs::metadata(data_path)
            .with_context(|| format!("missing data file {}", data_path.display()))?
            .len();

        let idx_path = index_path(data_path);
        let file = File::open(&idx_path)
            .with_context(|| format!("failed to open index {}", idx_path.display()))?;
        let mut r = BufReader::new(file);

        let count = r.read_u64::<LittleEndian>()?;
        if count == 0 || count > MAX_INDEX_ENTRIES {
            bail!("corrupt index: implausible entry count {}", count);
        }

        let min_key = read_key(&mut r)?;
        let max_key = read_key(&mut r)?;
        if min_key > max_key {
            bail!("corrupt index: min_key > max_key");
        }

        let bloom = BloomFilter::read_from(&mut r).context("corrupt index: bad bloom filter")?;

        let mut index = BTreeMap::new();
        for _ in 0..count {
            let key = read_key(&mut r)?;
            let offset = r.read_u64::<LittleEndian>()?;
            if offset >= data_len {
                bail!(
                    "corrupt index: offset {} past end of data file ({} bytes)",
                    offset,
                    data_len
                );
            }
            index.insert(key, offset);
        }

        Ok(Self::from_parts(
            id,
            level,
            data_path.to_path_buf(),
            min_key,
            max_key,
            bloom,
            index,
        ))
    }

    /// Point lookup.
    ///
    /// The bloom filter is consulted first; a negative answer skips the table
    /// without touching the data file. On an index hit the record is decoded
    /// from the data file and its stored key compared against the request —
    /// a mismatch means the index is lying and the table reports absence.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        if !self.bloom.possibly_contains(key) {
            return Ok(None);
        }

        let offset = match self.index.get(key) {
            Some(&o) => o,
            None => return Ok(None),
        };

        let mut file = File::open(&self.path)
            .with_context(|| format!("failed to open data file {}", self.path.display()))?;
        file.seek(SeekFrom::Start(offset))?;
        let (stored_key, entry) = read_record(&mut BufReader::new(file))?;

        if stored_key != key {
            tracing::warn!(
                table = %self.path.display(),
                offset,
                "index pointed at a different key; treating as absent"
            );
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// `true` if `min_key <= key <= max_key`.
    #[must_use]
    pub fn contains_range(&self, key: &[u8]) -> bool {
        self.min_key.as_slice() <= key && key <= self.max_key.as_slice()
    }

    /// Bloom filter answer for the key: `false` means definitely absent.
    #[must_use]
    pub fn possibly_contains(&self, key: &[u8]) -> bool {
        self.bloom.possibly_contains(key)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    /// Path of the data file.
    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.path
    }

    /// Path of the index file.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        format::index_path(&self.path)
    }

    #[must_use]
    pub fn min_key(&self) -> &[u8] {
        &self.min_key
    }

    #[must_use]
    pub fn max_key(&self) -> &[u8] {
        &self.max_key
    }

    /// Number of records in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.index.keys().map(|k| k.as_slice())
    }
}

impl std::fmt::Debug for SsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsTable")
            .field("id", &self.id)
            .field("level", &self.level)
            .field("entries", &self.index.len())
            .field("path", &self.path)
            .finish()
    }
}

fn read_key<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > MAX_KEY_BYTES {
        bail!("corrupt index: key_len {} exceeds {}", len, MAX_KEY_BYTES);
    }
    let mut key = vec![0u8; len];
    r.read_exact(&mut key)?;
    Ok(key)
}
