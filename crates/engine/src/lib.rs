//! # Engine — BasaltKV storage engine
//!
//! The central orchestrator tying the [`memtable`], [`wal`], [`sstable`] and
//! [`cache`] crates into a complete LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Caller
//!   |
//!   v
//! ┌─────────────────────────────────────────────────┐
//! │                    ENGINE                       │
//! │                                                 │
//! │ write.rs → WAL append → cache → active memtable │
//! │               |                                 │
//! │               | (4 MiB threshold crossed?)      │
//! │               v          yes                    │
//! │        active → immutable slot                  │
//! │               |                                 │
//! │               v  (detached flusher thread)      │
//! │        flush.rs → new L0 table → WAL rotation   │
//! │                                                 │
//! │ compaction.rs (worker, ~2 s cadence)            │
//! │        L<i> overfull? → merge into L<i+1>       │
//! │                                                 │
//! │ read.rs → cache → active → immutable → L0..L6   │
//! │            (highest sequence number wins)       │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module          | Purpose                                            |
//! |-----------------|----------------------------------------------------|
//! | `lib.rs`        | `Engine` struct, open/shutdown, observers, `Debug` |
//! | [`options`]     | Tunables with standard defaults                    |
//! | [`write`]       | `set()`, `del()`, memtable rollover                |
//! | [`read`]        | `get()` version-resolution fallthrough             |
//! | [`flush`]       | `sync()`, immutable flush, WAL rotation            |
//! | [`compaction`]  | background worker, levelled merge                  |
//! | [`recovery`]    | table discovery, WAL replay, seq seeding           |
//! | [`layout`]      | on-disk directory conventions                      |
//!
//! ## Crash safety
//!
//! Every mutation reaches the WAL (flushed to the kernel) **before** the
//! memtable. The WAL is rotated only **after** a successful flush, and the
//! rotation rewrites whatever still sits in the active memtable. Tables are
//! published by tmp-file + rename, data file before index file, so recovery
//! never sees an index without data.

mod compaction;
mod flush;
mod layout;
mod options;
mod read;
mod recovery;
mod write;

pub use options::Options;

use anyhow::{Context, Result};
use cache::LruCache;
use memtable::Memtable;
use parking_lot::{Mutex, RwLock};
use sstable::SsTable;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use wal::WalWriter;

/// Number of levels in the tree.
pub const LEVELS: usize = 7;
/// Active-memtable byte threshold that triggers a rollover.
pub const MEMTABLE_MAX: usize = 4 * 1024 * 1024;
/// Table-count cap for every level >= 1.
pub const LEVEL_SIZE_RATIO: usize = 10;
/// Table-count cap for level 0.
pub const L0_MAX_TABLES: usize = 4;
/// Read-through cache capacity in entries.
pub const CACHE_SIZE: usize = 1024;

/// The two memtable slots: one writable buffer, and at most one sealed
/// buffer awaiting flush. Once the immutable slot is occupied, the next
/// rollover must wait for (or drive) a flush before sealing again.
pub(crate) struct MemSlots {
    pub(crate) active: Memtable,
    pub(crate) immutable: Option<Arc<Memtable>>,
}

/// Engine state shared with the background compactor and flusher threads.
pub(crate) struct Shared {
    pub(crate) opts: Options,
    pub(crate) db_dir: PathBuf,

    /// Both memtable slots. Held for every memtable read and write, released
    /// before any file I/O.
    pub(crate) mem: Mutex<MemSlots>,
    /// One table list per level, locked in ascending level order.
    pub(crate) levels: Vec<Mutex<Vec<Arc<SsTable>>>>,
    pub(crate) wal: Mutex<WalWriter>,
    pub(crate) cache: Mutex<LruCache>,

    /// Writers hold this shared across WAL-append + memtable-insert so no
    /// record can land in the old log yet miss the rotation's rewrite of the
    /// active memtable. Rotation takes it exclusively.
    pub(crate) rotation: RwLock<()>,
    /// Serialises flushes, so "drive the pending flush" means waiting here.
    pub(crate) flush_lock: Mutex<()>,

    /// Next sequence number to assign. Relaxed ordering: uniqueness is the
    /// requirement, not fencing.
    pub(crate) seq: AtomicU64,
    /// Cleared on shutdown; the compactor checks it every cycle.
    pub(crate) running: AtomicBool,
}

impl Shared {
    /// Allocates the next sequence number (also used as table ids).
    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// An embeddable LSM-tree key-value store.
///
/// # Write path
///
/// 1. Append the record to the WAL and flush it to the kernel.
/// 2. Refresh (or evict, for deletes) the read-through cache.
/// 3. Insert into the active memtable under a fresh sequence number.
/// 4. If the active buffer crossed [`MEMTABLE_MAX`], seal it into the
///    immutable slot and hand it to a detached flusher thread.
///
/// # Read path
///
/// Cache, then both memtable slots, then every level of tables whose key
/// range brackets the key — keeping the record with the highest sequence
/// across *all* hits, then honouring its tombstone flag.
///
/// # Recovery
///
/// [`Engine::open`] discovers tables from the `L<n>` directories, seeds the
/// sequence counter above every loaded table id, replays the WAL into a
/// fresh active memtable, and starts the background compactor.
///
/// All methods take `&self`; the engine is `Send + Sync` and safe to share
/// across threads.
pub struct Engine {
    pub(crate) shared: Arc<Shared>,
    compactor: Option<JoinHandle<()>>,
}

impl Engine {
    /// Opens (creating if necessary) the database at `db_dir` with default
    /// [`Options`].
    pub fn open<P: AsRef<Path>>(db_dir: P) -> Result<Self> {
        Self::open_with_options(db_dir, Options::default())
    }

    /// Opens the database with explicit options, performing full recovery.
    ///
    /// Failure to create or read the database directory is fatal; a table
    /// whose index cannot be parsed is skipped with a warning and its data
    /// file left in place.
    pub fn open_with_options<P: AsRef<Path>>(db_dir: P, opts: Options) -> Result<Self> {
        let db_dir = db_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("failed to create database directory {}", db_dir.display()))?;

        recovery::cleanup_tmp_files(&db_dir, opts.levels);

        let (levels, max_table_id) = recovery::load_levels(&db_dir, &opts)?;
        let seq = AtomicU64::new(max_table_id + 1);

        // Replay before opening the writer so the reader sees a quiescent file.
        let wal_path = layout::wal_path(&db_dir);
        let mut active = Memtable::new();
        recovery::replay_wal(&wal_path, &mut active, &seq)?;
        let wal = WalWriter::open(&wal_path, opts.wal_fsync)?;

        let background = opts.background_compaction;
        let shared = Arc::new(Shared {
            opts,
            db_dir,
            mem: Mutex::new(MemSlots {
                active,
                immutable: None,
            }),
            levels,
            wal: Mutex::new(wal),
            cache: Mutex::new(LruCache::new(CACHE_SIZE)),
            rotation: RwLock::new(()),
            flush_lock: Mutex::new(()),
            seq,
            running: AtomicBool::new(true),
        });

        let compactor = if background {
            let worker = Arc::clone(&shared);
            Some(
                std::thread::Builder::new()
                    .name("basalt-compactor".into())
                    .spawn(move || compaction::run(worker))?,
            )
        } else {
            None
        };

        Ok(Self { shared, compactor })
    }

    /// The highest sequence number assigned so far (0 on a fresh database).
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.shared.seq.load(Ordering::Relaxed).saturating_sub(1)
    }

    /// Accounted byte size of the active memtable.
    #[must_use]
    pub fn memtable_size_bytes(&self) -> usize {
        self.shared.mem.lock().active.size_bytes()
    }

    /// Number of tables currently attached to `level`.
    #[must_use]
    pub fn level_table_count(&self, level: usize) -> usize {
        self.shared
            .levels
            .get(level)
            .map_or(0, |l| l.lock().len())
    }

    /// Runs one compaction inspection pass inline: any level over its table
    /// cap is merged into the next. The background worker does the same on
    /// its cadence.
    pub fn compact(&self) -> Result<()> {
        compaction::compact_once(&self.shared)
    }

    /// Diagnostic dump of the tree shape. No mutation.
    #[must_use]
    pub fn debug_print_tree(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        let _ = writeln!(out, "=== LSM tree ===");
        {
            let slots = self.shared.mem.lock();
            let _ = writeln!(
                out,
                "active memtable: {} keys, {} bytes",
                slots.active.len(),
                slots.active.size_bytes()
            );
            match &slots.immutable {
                Some(imm) => {
                    let _ = writeln!(
                        out,
                        "immutable memtable: {} keys, {} bytes",
                        imm.len(),
                        imm.size_bytes()
                    );
                }
                None => {
                    let _ = writeln!(out, "immutable memtable: none");
                }
            }
        }
        for (i, level) in self.shared.levels.iter().enumerate() {
            let tables = level.lock();
            let _ = writeln!(out, "L{}: {} tables", i, tables.len());
            for table in tables.iter() {
                let _ = writeln!(
                    out,
                    "  table_{}: {} keys, range [{} - {}]",
                    table.id(),
                    table.len(),
                    String::from_utf8_lossy(table.min_key()),
                    String::from_utf8_lossy(table.max_key()),
                );
            }
        }
        out
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.shared.mem.lock();
        f.debug_struct("Engine")
            .field("db_dir", &self.shared.db_dir)
            .field("seq", &self.shared.seq.load(Ordering::Relaxed))
            .field("memtable_bytes", &slots.active.size_bytes())
            .field("immutable_pending", &slots.immutable.is_some())
            .field(
                "tables_per_level",
                &self
                    .shared
                    .levels
                    .iter()
                    .map(|l| l.lock().len())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Orderly shutdown: stop and join the compactor, drain outstanding flushes,
/// then let the WAL close with the last reference.
impl Drop for Engine {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.compactor.take() {
            let _ = handle.join();
        }
        if let Err(e) = self.sync() {
            tracing::error!(error = %e, "final flush on shutdown failed; WAL retains the data");
        }
    }
}

#[cfg(test)]
mod tests;
