//! Write path: `set()`, `del()`, and the memtable rollover.
//!
//! Every mutation appends to the WAL first (flushed to the kernel), then
//! touches the cache, then inserts into the active memtable under a fresh
//! sequence number. The rollover check runs after each write: a full active
//! buffer is sealed into the immutable slot and flushed by a detached
//! thread; if the slot is already occupied, the writer drives that flush to
//! completion first.

use anyhow::{ensure, Result};
use std::sync::Arc;
use wal::WalRecord;

use crate::{flush, Engine};

impl Engine {
    /// Inserts or overwrites a key.
    ///
    /// Returns an error only for an empty key or on I/O failure; overwriting
    /// is not distinguished from inserting.
    pub fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        ensure!(!key.is_empty(), "key must not be empty");

        {
            // Shared rotation guard: this record must not land in a log that
            // is rewritten before the memtable insert below becomes visible.
            let _epoch = self.shared.rotation.read();

            self.shared.wal.lock().append(&WalRecord::Set {
                key: key.clone(),
                value: value.clone(),
            })?;
            self.shared.cache.lock().put(key.clone(), value.clone());

            let seq = self.shared.next_seq();
            self.shared.mem.lock().active.put(key, value, seq);
        }

        self.maybe_rollover()
    }

    /// Deletes a key by writing a tombstone. Succeeds whether or not the key
    /// was present; older versions in deeper levels are shadowed until
    /// compaction drops them.
    pub fn del(&self, key: Vec<u8>) -> Result<()> {
        ensure!(!key.is_empty(), "key must not be empty");

        {
            let _epoch = self.shared.rotation.read();

            self.shared
                .wal
                .lock()
                .append(&WalRecord::Del { key: key.clone() })?;
            self.shared.cache.lock().evict(&key);

            let seq = self.shared.next_seq();
            self.shared.mem.lock().active.delete(key, seq);
        }

        self.maybe_rollover()
    }

    /// Seals the active memtable once it crosses the size threshold.
    ///
    /// If the immutable slot is still occupied by the previous rollover, the
    /// pending flush is driven inline before sealing; otherwise the sealed
    /// buffer is handed to a short-lived detached flusher thread.
    fn maybe_rollover(&self) -> Result<()> {
        loop {
            let mut slots = self.shared.mem.lock();
            if slots.active.size_bytes() < self.shared.opts.memtable_max_bytes {
                return Ok(());
            }

            if slots.immutable.is_some() {
                drop(slots);
                flush::flush_immutable(&self.shared)?;
                continue;
            }

            let full = std::mem::take(&mut slots.active);
            slots.immutable = Some(Arc::new(full));
            drop(slots);

            let shared = Arc::clone(&self.shared);
            std::thread::spawn(move || {
                if let Err(e) = flush::flush_immutable(&shared) {
                    tracing::error!(error = %e, "background flush failed; will retry on next write");
                }
            });
            return Ok(());
        }
    }
}
