use memtable::Entry;
use std::path::Path;
use std::sync::Arc;

use crate::{SsTable, TableBuilder};


/// Builds and publishes a table from `(key, seq, value)` triples; a `None`
/// value becomes a tombstone. Keys must already be ascending.
pub(crate) fn build_table(
    path: &Path,
    id: u64,
    level: usize,
    rows: &[(&[u8], u64, Option<&[u8]>)],
) -> Arc<SsTable> {
    let mut b = TableBuilder::new(path, id, level, rows.len()).unwrap();
    for (key, seq, value) in rows.iter().copied() {
        let entry = Entry {
            seq,
            value: value.map(|v| v.to_vec()),
        };
        b.add(key, &entry).unwrap();
    }
    Arc::new(b.finish().unwrap())
}
