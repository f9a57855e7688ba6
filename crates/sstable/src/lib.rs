//! # SSTable — Sorted String Table
//!
//! Immutable on-disk storage for the engine. When the in-memory
//! [`memtable::Memtable`] fills up, the engine serialises it into a table;
//! compaction merges tables into fresh ones. Tables are *write-once,
//! read-many* — once published they are never modified, only replaced.
//!
//! Each table is a **file pair**:
//!
//! ```text
//! L<level>/table_<id>.sst            data file
//! L<level>/table_<id>.sst.index      index file
//! ```
//!
//! ## Data file layout (little-endian)
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ key_len (u32) | key | val_len (u32) | value                  │
//! │ seq (u64) | tombstone (u8)                                   │
//! │ ... repeated, in ascending key order ...                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Index file layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ count (u64)                                                  │
//! │ min_key_len (u32) | min_key                                  │
//! │ max_key_len (u32) | max_key                                  │
//! │ bloom: num_bits (u64) | num_hashes (u8) | packed bits        │
//! │ count × { key_len (u32) | key | data_offset (u64) }          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The index is small enough to hold in memory; [`SsTable::load`] parses it
//! once at startup and point reads then cost a bloom probe, a map lookup and
//! a single seek into the data file. A table whose index fails to parse is
//! skipped by the engine (the data file is left in place).
//!
//! Construction goes through [`TableBuilder`]: records stream into a `.tmp`
//! sibling, the index follows, and both are renamed into place — data file
//! first — so a visible index always has its data.

mod format;
mod merge;
mod table;
mod writer;

pub use format::{data_file_name, index_path, parse_table_id, DATA_EXT, INDEX_EXT, TMP_EXT};
pub use merge::MergeIterator;
pub use table::SsTable;
pub use writer::TableBuilder;

#[cfg(test)]
mod tests;
