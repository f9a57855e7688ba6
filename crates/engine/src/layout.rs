//! On-disk directory conventions. There is no manifest file: the layout
//! itself is the manifest. Levels live in `L<n>` subdirectories, table ids
//! are embedded in file names, and recovery rediscovers everything by
//! parsing index files.
//!
//! ```text
//! <db_dir>/wal.log
//! <db_dir>/L0/table_12.sst
//! <db_dir>/L0/table_12.sst.index
//! <db_dir>/L1/table_9.sst
//! ...
//! ```

use sstable::data_file_name;
use std::path::{Path, PathBuf};

/// Name of the write-ahead log within the database directory.
pub(crate) const WAL_FILE: &str = "wal.log";

pub(crate) fn wal_path(db_dir: &Path) -> PathBuf {
    db_dir.join(WAL_FILE)
}

pub(crate) fn level_dir(db_dir: &Path, level: usize) -> PathBuf {
    db_dir.join(format!("L{}", level))
}

/// Full data-file path for a table: `<db_dir>/L<level>/table_<id>.sst`.
pub(crate) fn table_path(db_dir: &Path, level: usize, id: u64) -> PathBuf {
    level_dir(db_dir, level).join(data_file_name(id))
}
