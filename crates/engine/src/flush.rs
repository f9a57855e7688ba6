//! Flush path: `sync()`, the immutable-memtable flush, and WAL rotation.
//!
//! A flush serialises the immutable memtable into a fresh level-0 table,
//! publishes it, rotates the WAL, and only then clears the slot. The slot is
//! released *after* the table is attached to level 0, so a concurrent reader
//! always sees the data in at least one of the two places (briefly both,
//! resolved by sequence number).

use anyhow::{Context, Result};
use memtable::Memtable;
use sstable::TableBuilder;
use std::sync::Arc;
use wal::WalRecord;

use crate::{layout, Engine, Shared};

impl Engine {
    /// Durability barrier: forces any buffered data into the immutable slot
    /// and drives flushes until both memtable slots are empty and every
    /// resulting table is on disk with its index written.
    pub fn sync(&self) -> Result<()> {
        loop {
            {
                let mut slots = self.shared.mem.lock();
                if slots.active.is_empty() && slots.immutable.is_none() {
                    return Ok(());
                }
                if slots.immutable.is_none() {
                    let full = std::mem::take(&mut slots.active);
                    slots.immutable = Some(Arc::new(full));
                }
            }
            flush_immutable(&self.shared)?;
        }
    }
}

/// Flushes the immutable memtable, if any, into a new level-0 table.
///
/// Serialised by the flush lock: a writer that must "drive the pending
/// flush" simply calls this and waits its turn. No memtable or level lock is
/// held across the table I/O.
pub(crate) fn flush_immutable(shared: &Shared) -> Result<()> {
    let _serialise = shared.flush_lock.lock();

    let imm = match &shared.mem.lock().immutable {
        Some(m) => Arc::clone(m),
        None => return Ok(()),
    };

    if !imm.is_empty() {
        let table = write_level0_table(shared, &imm)?;
        tracing::debug!(
            id = table.id(),
            entries = table.len(),
            "flushed memtable to level 0"
        );
        shared.levels[0].lock().push(Arc::new(table));
    }

    // Rotate while the slot is still occupied. Sealing a new immutable
    // requires an empty slot, so at this point every record is either in the
    // table just published or in the active memtable the rotation rewrites —
    // the truncated log cannot orphan anything.
    rotate_wal(shared)?;

    {
        let mut slots = shared.mem.lock();
        if slots
            .immutable
            .as_ref()
            .map_or(false, |m| Arc::ptr_eq(m, &imm))
        {
            slots.immutable = None;
        }
    }

    Ok(())
}

fn write_level0_table(shared: &Shared, mem: &Memtable) -> Result<sstable::SsTable> {
    let dir = layout::level_dir(&shared.db_dir, 0);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create level directory {}", dir.display()))?;

    let id = shared.next_seq();
    let path = layout::table_path(&shared.db_dir, 0, id);
    let mut builder = TableBuilder::new(&path, id, 0, mem.len())?;

    for (key, entry) in mem.iter() {
        if let Err(e) = builder.add(key, entry) {
            builder.abandon();
            return Err(e);
        }
    }
    builder.finish()
}

/// Rotates the WAL after a successful flush and rewrites whatever is still
/// in the active memtable, preserving durability across the boundary.
///
/// Takes the rotation guard exclusively: no writer can be between its WAL
/// append and its memtable insert while the log is being replaced.
fn rotate_wal(shared: &Shared) -> Result<()> {
    let _epoch = shared.rotation.write();
    let mut wal = shared.wal.lock();

    wal.rotate()?;

    let slots = shared.mem.lock();
    for (key, entry) in slots.active.iter() {
        let record = match &entry.value {
            Some(value) => WalRecord::Set {
                key: key.clone(),
                value: value.clone(),
            },
            None => WalRecord::Del { key: key.clone() },
        };
        wal.append(&record)?;
    }
    Ok(())
}
