//! # Read-through cache
//!
//! A bounded LRU map from key to the most recently observed value. The engine
//! consults it before any memtable or table lookup and refreshes it on every
//! read hit and write. It is purely a performance aid: deletions are decided
//! by the engine, which calls [`LruCache::evict`] on `del`, and an absent key
//! here means nothing.
//!
//! Entries live in an arena of linked slots (`prev`/`next` indices) with a
//! side map from key to slot, giving O(1) `get`/`put`/`evict`. The engine
//! guards the whole structure with its cache mutex, so no locking happens
//! here.

use std::collections::HashMap;

/// Sentinel slot index meaning "no link".
const NIL: usize = usize::MAX;

struct Slot {
    key: Vec<u8>,
    value: Vec<u8>,
    prev: usize,
    next: usize,
}

/// Bounded LRU cache over byte-string keys and values.
pub struct LruCache {
    capacity: usize,
    slots: Vec<Slot>,
    free: Vec<usize>,
    /// Most recently used slot.
    head: usize,
    /// Least recently used slot, evicted first.
    tail: usize,
    map: HashMap<Vec<u8>, usize>,
}

impl LruCache {
    /// Creates a cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            map: HashMap::new(),
        }
    }

    /// Looks up a key, promoting it to most recently used on a hit.
    pub fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        Some(self.slots[idx].value.clone())
    }

    /// Inserts or refreshes a key at the front, evicting from the back when
    /// the capacity is exceeded.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        if let Some(&idx) = self.map.get(&key) {
            self.slots[idx].value = value;
            self.move_to_front(idx);
            return;
        }

        if self.map.len() >= self.capacity {
            self.evict_tail();
        }

        let idx = match self.free.pop() {
            Some(i) => {
                self.slots[i] = Slot {
                    key: key.clone(),
                    value,
                    prev: NIL,
                    next: NIL,
                };
                i
            }
            None => {
                self.slots.push(Slot {
                    key: key.clone(),
                    value,
                    prev: NIL,
                    next: NIL,
                });
                self.slots.len() - 1
            }
        };
        self.map.insert(key, idx);
        self.link_front(idx);
    }

    /// Drops a key outright. Used when the engine processes a delete.
    pub fn evict(&mut self, key: &[u8]) {
        if let Some(idx) = self.map.remove(key) {
            self.unlink(idx);
            self.release(idx);
        }
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // ---- list plumbing ----

    fn move_to_front(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.link_front(idx);
    }

    fn link_front(&mut self, idx: usize) {
        self.slots[idx].prev = NIL;
        self.slots[idx].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.slots[idx].prev = NIL;
        self.slots[idx].next = NIL;
    }

    fn evict_tail(&mut self) {
        let idx = self.tail;
        if idx == NIL {
            return;
        }
        self.unlink(idx);
        let key = std::mem::take(&mut self.slots[idx].key);
        self.map.remove(&key);
        self.release(idx);
    }

    fn release(&mut self, idx: usize) {
        self.slots[idx].key = Vec::new();
        self.slots[idx].value = Vec::new();
        self.free.push(idx);
    }
}

impl std::fmt::Debug for LruCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
