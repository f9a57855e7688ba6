//! Merge iterator over multiple [`SsTable`]s.
//!
//! Produces `(key, Entry)` pairs in ascending key order. When the same key
//! appears in several tables, only the entry with the **highest sequence
//! number** is emitted. This is the core primitive for compaction: walk the
//! input tables in sorted order, deduplicate by sequence, and stream the
//! result into a [`crate::TableBuilder`].

use anyhow::Result;
use memtable::Entry;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::SsTable;

/// A pending key from one source table.
///
/// Only the key and the source index live on the heap; the record itself is
/// read from disk when the key reaches the top.
struct HeapEntry {
    key: Vec<u8>,
    /// Index into the `tables` / `key_iters` arrays.
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse the key comparison so the
        // smallest key surfaces first. Ties break on source index for
        // determinism.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges several tables into one sorted, seq-deduplicated record stream.
pub struct MergeIterator<'a> {
    tables: &'a [Arc<SsTable>],
    /// Per-table: keys remaining to be yielded, in ascending order.
    key_iters: Vec<std::vec::IntoIter<Vec<u8>>>,
    heap: BinaryHeap<HeapEntry>,
}

impl<'a> MergeIterator<'a> {
    /// Creates a merge iterator over the given tables. Each table's key list
    /// comes from its in-memory index; the first key of each is seeded onto
    /// the heap.
    #[must_use]
    pub fn new(tables: &'a [Arc<SsTable>]) -> Self {
        let mut key_iters = Vec::with_capacity(tables.len());
        let mut heap = BinaryHeap::new();

        for (i, table) in tables.iter().enumerate() {
            let keys: Vec<Vec<u8>> = table.keys().map(|k| k.to_vec()).collect();
            let mut iter = keys.into_iter();
            if let Some(first) = iter.next() {
                heap.push(HeapEntry {
                    key: first,
                    source: i,
                });
            }
            key_iters.push(iter);
        }

        Self {
            tables,
            key_iters,
            heap,
        }
    }

    /// Returns the next `(key, Entry)` in ascending key order, or `None`
    /// when every source is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Entry)>> {
        let top = match self.heap.pop() {
            Some(e) => e,
            None => return Ok(None),
        };

        let entry = self.tables[top.source].get(&top.key)?;
        self.advance(top.source);

        // The key came from the table's own index; a miss here means the
        // table contradicts itself, which get() reports as an error upstream.
        let mut best = match entry {
            Some(e) => e,
            None => anyhow::bail!("table lost a key it indexed"),
        };
        let best_key = top.key;

        // Drain every other occurrence of this key, keeping the highest seq.
        while let Some(peek) = self.heap.peek() {
            if peek.key != best_key {
                break;
            }
            let dup = self.heap.pop().expect("peeked entry must pop");
            if let Some(dup_entry) = self.tables[dup.source].get(&dup.key)? {
                if dup_entry.seq > best.seq {
                    best = dup_entry;
                }
            }
            self.advance(dup.source);
        }

        Ok(Some((best_key, best)))
    }

    /// Pushes the next key of `source` onto the heap, if any remain.
    fn advance(&mut self, source: usize) {
        if let Some(next_key) = self.key_iters[source].next() {
            self.heap.push(HeapEntry {
                key: next_key,
                source,
            });
        }
    }
}
