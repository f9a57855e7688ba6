use std::time::Duration;

use crate::{L0_MAX_TABLES, LEVELS, LEVEL_SIZE_RATIO, MEMTABLE_MAX};

/// Engine tunables. [`Options::default`] carries the standard constants;
/// tests shrink the memtable threshold and disable the background compactor
/// to make flushes and merges deterministic.
#[derive(Debug, Clone)]
pub struct Options {
    /// Active-memtable byte size that triggers a rollover.
    pub memtable_max_bytes: usize,
    /// Number of levels in the tree.
    pub levels: usize,
    /// Table-count cap for level 0.
    pub level0_max_tables: usize,
    /// Table-count cap for every level >= 1.
    pub level_size_ratio: usize,
    /// Cadence of the background compactor.
    pub compaction_interval: Duration,
    /// Whether to fsync the WAL on every append. Appends always reach the
    /// kernel before a write is acknowledged; this additionally forces them
    /// to stable storage.
    pub wal_fsync: bool,
    /// Whether to spawn the background compactor thread.
    pub background_compaction: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            memtable_max_bytes: MEMTABLE_MAX,
            levels: LEVELS,
            level0_max_tables: L0_MAX_TABLES,
            level_size_ratio: LEVEL_SIZE_RATIO,
            compaction_interval: Duration::from_secs(2),
            wal_fsync: false,
            background_compaction: true,
        }
    }
}
