use crate::{Engine, Options};
use std::path::Path;

mod recovery_tests;
mod write_tests;

/// Deterministic options for tests: tiny memtable threshold, no background
/// compactor, no fsync.
pub(crate) fn test_options(memtable_max_bytes: usize) -> Options {
    Options {
        memtable_max_bytes,
        background_compaction: false,
        wal_fsync: false,
        ..Options::default()
    }
}

pub(crate) fn open_engine(dir: &Path, memtable_max_bytes: usize) -> Engine {
    Engine::open_with_options(dir, test_options(memtable_max_bytes)).unwrap()
}

/// `(min_key, max_key)` per table at `level`, in list order.
pub(crate) fn level_ranges(engine: &Engine, level: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    engine.shared.levels[level]
        .lock()
        .iter()
        .map(|t| (t.min_key().to_vec(), t.max_key().to_vec()))
        .collect()
}

/// Returns true if `level` holds `key` in any of its tables.
pub(crate) fn level_contains_key(engine: &Engine, level: usize, key: &[u8]) -> bool {
    engine.shared.levels[level]
        .lock()
        .iter()
        .any(|t| t.keys().any(|k| k == key))
}
