//! Background compaction: the levelled-merge worker.
//!
//! The worker wakes on a fixed cadence and inspects every level but the
//! last. A level over its table cap (4 for level 0, 10 for deeper levels) is
//! merged into the next: all of its tables plus the overlapping slice of the
//! level below stream through a [`MergeIterator`] into one new table,
//! keeping the highest-sequence version of each key and dropping tombstones
//! that nothing deeper could still shadow.
//!
//! Both level locks are held across the merge so readers never observe a
//! half-swapped level; the input files are unlinked only after the locks are
//! released. On any error the in-memory lists are restored, the partial
//! output is discarded, and the same merge is retried on the next cadence —
//! a partially built table is never published.

use anyhow::{Context, Result};
use sstable::{MergeIterator, SsTable, TableBuilder};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{layout, Shared};

/// Compactor thread body: sleep one interval (in short slices, so shutdown
/// joins promptly), then inspect all levels.
pub(crate) fn run(shared: Arc<Shared>) {
    while shared.running.load(Ordering::Acquire) {
        let deadline = Instant::now() + shared.opts.compaction_interval;
        while Instant::now() < deadline {
            if !shared.running.load(Ordering::Acquire) {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        if let Err(e) = compact_once(&shared) {
            tracing::warn!(error = %e, "compaction cycle failed; inputs kept, retrying next cycle");
        }
    }
}

/// One inspection pass over levels `0..L-1`.
pub(crate) fn compact_once(shared: &Shared) -> Result<()> {
    for level in 0..shared.opts.levels.saturating_sub(1) {
        let over_cap = shared.levels[level].lock().len() > table_cap(shared, level);
        if over_cap {
            compact_level(shared, level)?;
        }
    }
    Ok(())
}

fn table_cap(shared: &Shared, level: usize) -> usize {
    if level == 0 {
        shared.opts.level0_max_tables
    } else {
        shared.opts.level_size_ratio
    }
}

/// Merges all tables of `level` (plus the overlapping tables of `level + 1`)
/// into a single new table at `level + 1`.
pub(crate) fn compact_level(shared: &Shared, level: usize) -> Result<()> {
    if level + 1 >= shared.opts.levels {
        return Ok(());
    }

    // Ascending lock order across levels prevents deadlock with readers.
    let mut cur = shared.levels[level].lock();
    let mut next = shared.levels[level + 1].lock();
    if cur.is_empty() {
        return Ok(());
    }

    let inputs_low: Vec<Arc<SsTable>> = cur.drain(..).collect();

    // Union key span of the source level.
    let span_min = inputs_low
        .iter()
        .map(|t| t.min_key())
        .min()
        .unwrap_or_default()
        .to_vec();
    let span_max = inputs_low
        .iter()
        .map(|t| t.max_key())
        .max()
        .unwrap_or_default()
        .to_vec();

    // Tables of the target level that straddle the span join the merge; the
    // rest stay in place.
    let taken: Vec<Arc<SsTable>> = next.drain(..).collect();
    let (inputs_high, remaining): (Vec<_>, Vec<_>) = taken.into_iter().partition(|t| {
        t.min_key() <= span_max.as_slice() && span_min.as_slice() <= t.max_key()
    });
    *next = remaining;

    // Snapshot of everything deeper, for the conservative tombstone check.
    let deeper: Vec<Arc<SsTable>> = (level + 2..shared.opts.levels)
        .flat_map(|i| shared.levels[i].lock().iter().cloned().collect::<Vec<_>>())
        .collect();

    let inputs: Vec<Arc<SsTable>> = inputs_low
        .iter()
        .chain(inputs_high.iter())
        .cloned()
        .collect();
    let target = level + 1;

    match merge_tables(shared, &inputs, &deeper, target) {
        Ok(Some(table)) => {
            tracing::debug!(
                level,
                inputs = inputs.len(),
                id = table.id(),
                entries = table.len(),
                "compacted level into its successor"
            );
            next.push(Arc::new(table));
        }
        // Every record merged away (all tombstones, nothing shadowed).
        Ok(None) => {}
        Err(e) => {
            // Put both levels back exactly as they were; the input files were
            // never touched.
            *cur = inputs_low;
            next.extend(inputs_high);
            next.sort_by(|a, b| a.min_key().cmp(b.min_key()));
            return Err(e);
        }
    }
    next.sort_by(|a, b| a.min_key().cmp(b.min_key()));

    drop(next);
    drop(cur);

    // Old files go away outside the level locks.
    for table in inputs {
        for path in [table.data_path().to_path_buf(), table.index_path()] {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = ?path, error = %e, "failed to delete compacted table file");
            }
        }
    }
    Ok(())
}

/// Streams the merged record set into one new table at `target`.
///
/// Returns `Ok(None)` when nothing survives the merge. Any failure discards
/// the partial output before propagating.
fn merge_tables(
    shared: &Shared,
    inputs: &[Arc<SsTable>],
    deeper: &[Arc<SsTable>],
    target: usize,
) -> Result<Option<SsTable>> {
    let dir = layout::level_dir(&shared.db_dir, target);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create level directory {}", dir.display()))?;

    let id = shared.next_seq();
    let path = layout::table_path(&shared.db_dir, target, id);
    let expected: usize = inputs.iter().map(|t| t.len()).sum();

    let mut merge = MergeIterator::new(inputs);
    let mut builder = TableBuilder::new(&path, id, target, expected)?;

    match fill_builder(&mut merge, &mut builder, deeper, target) {
        Ok(()) if builder.is_empty() => {
            builder.abandon();
            Ok(None)
        }
        Ok(()) => Ok(Some(builder.finish()?)),
        Err(e) => {
            builder.abandon();
            Err(e)
        }
    }
}

fn fill_builder(
    merge: &mut MergeIterator<'_>,
    builder: &mut TableBuilder,
    deeper: &[Arc<SsTable>],
    target: usize,
) -> Result<()> {
    while let Some((key, entry)) = merge.next_entry()? {
        // A tombstone may be dropped below level 0 only once nothing deeper
        // could still hold an older version of the key. When in doubt
        // (bloom false positive), keep it.
        if entry.is_tombstone() && target > 0 && !shadowed_below(deeper, &key) {
            continue;
        }
        builder.add(&key, &entry)?;
    }
    Ok(())
}

fn shadowed_below(deeper: &[Arc<SsTable>], key: &[u8]) -> bool {
    deeper
        .iter()
        .any(|t| t.contains_range(key) && t.possibly_contains(key))
}
