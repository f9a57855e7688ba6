//! Read path: `get()`.
//!
//! Lookup order is cache, active memtable, immutable memtable, then every
//! level of tables whose key range brackets the key. The scan does not stop
//! at the first hit: the record with the highest sequence number across all
//! sources wins, and only then is its tombstone flag honoured. The memtable
//! mutex is released before any table I/O, so an in-flight flush may briefly
//! expose the same record in both the immutable memtable and level 0 — the
//! sequence comparison resolves that window correctly.

use anyhow::Result;
use memtable::Entry;

use crate::Engine;

impl Engine {
    /// Looks up the current value for a key, or `None` if it is absent or
    /// deleted.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key.is_empty() {
            return Ok(None);
        }

        if let Some(v) = self.shared.cache.lock().get(key) {
            return Ok(Some(v));
        }

        let mut best: Option<Entry> = None;

        {
            let slots = self.shared.mem.lock();
            if let Some(entry) = slots.active.get(key) {
                consider(&mut best, entry.clone());
            }
            if let Some(imm) = &slots.immutable {
                if let Some(entry) = imm.get(key) {
                    consider(&mut best, entry.clone());
                }
            }
        }

        for level in &self.shared.levels {
            let tables = level.lock();
            // Newest-first is only a heuristic here; correctness comes from
            // the sequence comparison across every hit.
            for table in tables.iter().rev() {
                if !table.contains_range(key) {
                    continue;
                }
                if let Some(entry) = table.get(key)? {
                    consider(&mut best, entry);
                }
            }
        }

        match best {
            Some(Entry {
                value: Some(value), ..
            }) => {
                self.shared.cache.lock().put(key.to_vec(), value.clone());
                Ok(Some(value))
            }
            // Tombstone or nothing found anywhere.
            _ => Ok(None),
        }
    }
}

/// Keeps `candidate` only if it is newer than the current best.
fn consider(best: &mut Option<Entry>, candidate: Entry) {
    match best {
        Some(current) if current.seq >= candidate.seq => {}
        _ => *best = Some(candidate),
    }
}
