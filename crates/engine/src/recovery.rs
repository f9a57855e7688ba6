//! Cold-start recovery: table discovery, WAL replay, and startup hygiene.
//!
//! Discovery iterates the `L0..L<n>` directories and parses every
//! `.sst.index` file. A table whose index cannot be parsed is skipped with a
//! warning — quarantined, its data file left in place — never a fatal error.
//! The sequence counter is then seeded above every loaded table id: ids come
//! from the same counter as record sequences and are allocated after every
//! record they cover, so `max(id) + 1` is always safe. WAL replay finally
//! re-inserts logged operations in their original order under fresh
//! sequence numbers.

use anyhow::Result;
use memtable::Memtable;
use parking_lot::Mutex;
use sstable::SsTable;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wal::{WalError, WalReader, WalRecord};

use crate::{layout, Options};

/// Removes leftover `*.tmp` files from interrupted flushes or compactions.
pub(crate) fn cleanup_tmp_files(db_dir: &Path, levels: usize) {
    for level in 0..levels {
        let dir = layout::level_dir(db_dir, level);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue, // level directory not created yet
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_tmp = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with(".tmp"));
            if is_tmp {
                tracing::debug!(path = ?path, "removing leftover tmp file");
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}

/// Discovers every table under the level directories. Returns the per-level
/// lists (sorted by `min_key`) and the highest table id seen.
#[allow(clippy::type_complexity)]
pub(crate) fn load_levels(
    db_dir: &Path,
    opts: &Options,
) -> Result<(Vec<Mutex<Vec<Arc<SsTable>>>>, u64)> {
    let mut levels = Vec::with_capacity(opts.levels);
    let mut max_id = 0u64;

    for level in 0..opts.levels {
        let mut tables: Vec<Arc<SsTable>> = Vec::new();
        let dir = layout::level_dir(db_dir, level);

        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let index_path = entry.path();
                let name = match index_path.file_name().and_then(|n| n.to_str()) {
                    Some(n) => n,
                    None => continue,
                };
                let data_name = match name.strip_suffix(".index") {
                    Some(stripped) if stripped.ends_with(".sst") => stripped.to_string(),
                    _ => continue,
                };
                let data_path = dir.join(data_name);

                match SsTable::load(&data_path, level) {
                    Ok(table) => {
                        max_id = max_id.max(table.id());
                        tables.push(Arc::new(table));
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = ?data_path,
                            error = %e,
                            "skipping table with unreadable index"
                        );
                    }
                }
            }
        }

        tables.sort_by(|a, b| a.min_key().cmp(b.min_key()));
        tracing::debug!(level, tables = tables.len(), "loaded level");
        levels.push(Mutex::new(tables));
    }

    Ok((levels, max_id))
}

/// Replays the WAL into the active memtable, assigning fresh sequence
/// numbers in log order.
///
/// A missing file is a fresh start. A corrupt record stops replay with a
/// warning, keeping everything before it — whatever follows a corruption
/// point cannot be decoded under any reading of the log.
pub(crate) fn replay_wal(path: &Path, active: &mut Memtable, seq: &AtomicU64) -> Result<()> {
    let mut reader = match WalReader::open(path) {
        Ok(reader) => reader,
        Err(WalError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(anyhow::Error::new(e).context("failed to open WAL for replay")),
    };

    let mut replayed = 0u64;
    let result = reader.replay(|record| {
        let next = seq.fetch_add(1, Ordering::Relaxed);
        match record {
            WalRecord::Set { key, value } => active.put(key, value, next),
            WalRecord::Del { key } => active.delete(key, next),
        }
        replayed += 1;
    });

    match result {
        Ok(()) => {
            tracing::debug!(records = replayed, "WAL replay finished");
            Ok(())
        }
        Err(WalError::Corrupt) => {
            tracing::warn!(
                records = replayed,
                "WAL corrupt mid-file; keeping records replayed so far"
            );
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("WAL replay failed")),
    }
}
