use anyhow::{bail, ensure, Result};
use bloom::BloomFilter;
use byteorder::{LittleEndian, WriteBytesExt};
use memtable::Entry;
use std::collections::BTreeMap;
use std::fs::{rename, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::format::{index_path, record_len, write_record};
use crate::SsTable;

/// Streaming SSTable construction.
///
/// Records are appended in ascending key order with [`add`](Self::add) and
/// published with [`finish`](Self::finish). Until then everything lives in
/// `.tmp` siblings of the final paths, so a crash or an abandoned build never
/// leaves a half-visible table:
///
/// 1. data records stream into `table_<id>.sst.tmp`
/// 2. `finish` fsyncs it, writes `table_<id>.sst.index.tmp`, fsyncs that
/// 3. the data file is renamed first, the index file last
///
/// Discovery goes by index files, so an index on disk always has its data.
pub struct TableBuilder {
    id: u64,
    level: usize,
    data_path: PathBuf,
    tmp_data: PathBuf,
    file: BufWriter<File>,
    bloom: BloomFilter,
    /// (key, data offset) in insertion order — ascending by key.
    entries: Vec<(Vec<u8>, u64)>,
    offset: u64,
}

impl TableBuilder {
    /// Starts a table at `data_path` (the final `.sst` path), sized for
    /// `expected_items` keys.
    pub fn new(data_path: &Path, id: u64, level: usize, expected_items: usize) -> Result<Self> {
        let tmp_data = tmp_path(data_path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_data)?;

        Ok(Self {
            id,
            level,
            data_path: data_path.to_path_buf(),
            tmp_data,
            file: BufWriter::new(file),
            bloom: BloomFilter::for_items(expected_items),
            entries: Vec::with_capacity(expected_items),
            offset: 0,
        })
    }

    /// Appends one record. Keys must arrive in strictly ascending order.
    pub fn add(&mut self, key: &[u8], entry: &Entry) -> Result<()> {
        if let Some((last, _)) = self.entries.last() {
            ensure!(
                key > last.as_slice(),
                "keys must be added in strictly ascending order"
            );
        }

        write_record(&mut self.file, key, entry)?;
        self.bloom.add(key);
        self.entries.push((key.to_vec(), self.offset));
        self.offset += record_len(key, entry);
        Ok(())
    }

    /// Number of records added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seals and publishes the table, returning its loaded handle.
    pub fn finish(self) -> Result<SsTable> {
        if self.entries.is_empty() {
            let _ = std::fs::remove_file(&self.tmp_data);
            bail!("refusing to publish an empty table");
        }

        // Seal the data file.
        let data_file = self.file.into_inner().map_err(|e| e.into_error())?;
        data_file.sync_all()?;
        drop(data_file);

        // min/max fall out of the insertion order invariant.
        let min_key = self.entries.first().map(|(k, _)| k.clone()).unwrap_or_default();
        let max_key = self.entries.last().map(|(k, _)| k.clone()).unwrap_or_default();

        // Write the index to its own tmp file.
        let final_index = index_path(&self.data_path);
        let tmp_index = tmp_path(&final_index);
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_index)?;
            let mut w = BufWriter::new(file);

            w.write_u64::<LittleEndian>(self.entries.len() as u64)?;
            w.write_u32::<LittleEndian>(min_key.len() as u32)?;
            w.write_all(&min_key)?;
            w.write_u32::<LittleEndian>(max_key.len() as u32)?;
            w.write_all(&max_key)?;
            self.bloom.write_to(&mut w)?;
            for (key, offset) in &self.entries {
                w.write_u32::<LittleEndian>(key.len() as u32)?;
                w.write_all(key)?;
                w.write_u64::<LittleEndian>(*offset)?;
            }

            let file = w.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }

        // Publish: data first, index last.
        rename(&self.tmp_data, &self.data_path)?;
        rename(&tmp_index, &final_index)?;

        let index: BTreeMap<Vec<u8>, u64> = self.entries.into_iter().collect();
        Ok(SsTable::from_parts(
            self.id,
            self.level,
            self.data_path,
            min_key,
            max_key,
            self.bloom,
            index,
        ))
    }

    /// Discards the build, removing any tmp files. Used when a merge fails
    /// partway: the partial output must never become visible.
    pub fn abandon(self) {
        let tmp_index = tmp_path(&index_path(&self.data_path));
        drop(self.file);
        let _ = std::fs::remove_file(&self.tmp_data);
        let _ = std::fs::remove_file(&tmp_index);
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(crate::TMP_EXT);
    PathBuf::from(name)
}
