//! # WAL — Write-Ahead Log
//!
//! Crash-safe durability for the storage engine. Every mutation (`SET` or
//! `DEL`) is appended here and flushed to the kernel **before** the memtable
//! is updated, so recovery never sees an in-memory state with no log entry.
//! On restart the log is replayed to rebuild the active memtable.
//!
//! ## Binary record format (little-endian)
//!
//! ```text
//! [type: u8][key_len: u32][key]                         type = 2 (DEL)
//! [type: u8][key_len: u32][key][val_len: u32][value]    type = 1 (SET)
//! ```
//!
//! Records carry no sequence number: replay re-inserts them in file order
//! with fresh sequences assigned by the engine.
//!
//! ## Rotation
//!
//! After a memtable flush the log is rotated: closed, unlinked, and reopened
//! truncated. The engine then re-appends whatever is still in the active
//! memtable so durability holds across the rotation boundary.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{WalReader, WalRecord, WalWriter};
//!
//! let mut w = WalWriter::open("wal.log", false).unwrap();
//! w.append(&WalRecord::Set {
//!     key: b"hello".to_vec(),
//!     value: b"world".to_vec(),
//! }).unwrap();
//! drop(w);
//!
//! let mut r = WalReader::open("wal.log").unwrap();
//! r.replay(|rec| println!("{:?}", rec)).unwrap();
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Record type tag for an insert/overwrite.
const OP_SET: u8 = 1;
/// Record type tag for a delete.
const OP_DEL: u8 = 2;

/// Allocation guard while replaying: a length field beyond this is corruption,
/// not data.
const MAX_FIELD_BYTES: u32 = 64 * 1024 * 1024;

/// A single logged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// A key-value insertion or overwrite.
    Set { key: Vec<u8>, value: Vec<u8> },
    /// A key deletion (tombstone).
    Del { key: Vec<u8> },
}

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record with an unknown type tag or an implausible length field.
    #[error("corrupt record")]
    Corrupt,
}

/// Append-only WAL writer.
///
/// Records are serialized into a reusable scratch buffer and written with a
/// single `write_all`, then flushed so the bytes reach the kernel before the
/// caller proceeds. With `fsync` enabled every append is additionally synced
/// to stable storage.
pub struct WalWriter {
    path: PathBuf,
    file: File,
    fsync: bool,
    /// Reusable scratch buffer to avoid allocation on every append.
    buf: Vec<u8>,
}

impl WalWriter {
    /// Opens (or creates) a WAL file in append mode.
    ///
    /// # Arguments
    ///
    /// * `path` - log path, created if it does not exist.
    /// * `fsync` - if true, every `append` is followed by `sync_all`.
    pub fn open<P: AsRef<Path>>(path: P, fsync: bool) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = Self::open_file(&path)?;
        Ok(Self {
            path,
            file,
            fsync,
            buf: Vec::with_capacity(256),
        })
    }

    fn open_file(path: &Path) -> Result<File, WalError> {
        Ok(OpenOptions::new().create(true).append(true).open(path)?)
    }

    /// Serializes `record` and appends it to the log.
    pub fn append(&mut self, record: &WalRecord) -> Result<(), WalError> {
        self.buf.clear();

        match record {
            WalRecord::Set { key, value } => {
                self.buf.write_u8(OP_SET)?;
                self.buf.write_u32::<LittleEndian>(key.len() as u32)?;
                self.buf.extend_from_slice(key);
                self.buf.write_u32::<LittleEndian>(value.len() as u32)?;
                self.buf.extend_from_slice(value);
            }
            WalRecord::Del { key } => {
                self.buf.write_u8(OP_DEL)?;
                self.buf.write_u32::<LittleEndian>(key.len() as u32)?;
                self.buf.extend_from_slice(key);
            }
        }

        // Single write call for the whole record, then push it to the kernel.
        self.file.write_all(&self.buf)?;
        self.file.flush()?;

        if self.fsync {
            self.file.sync_all()?;
        }

        Ok(())
    }

    /// Forces everything written so far onto stable storage.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Rotates the log: close, unlink, reopen truncated.
    ///
    /// The caller owns the follow-up of re-appending any records that must
    /// stay durable (the engine rewrites the active memtable's contents).
    pub fn rotate(&mut self) -> Result<(), WalError> {
        // Replace the handle with a fresh one; the old file is dropped closed.
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(WalError::Io(e)),
        }
        self.file = Self::open_file(&self.path)?;
        Ok(())
    }
}

/// Sequential WAL reader.
///
/// Generic over any `Read` implementor so tests can replay from in-memory
/// buffers. A truncated tail record (crash mid-append) is treated as clean
/// EOF: every complete record before it is still yielded.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL file for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor.
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every record in the log, calling `apply` for each one.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** -> `Ok(())`.
    /// - **Truncated tail** (partial record at end) -> `Ok(())` after
    ///   yielding all complete records before it.
    /// - **Unknown type tag / implausible length** -> `Err(WalError::Corrupt)`.
    /// - **I/O error** -> `Err(WalError::Io(...))`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(WalRecord),
    {
        loop {
            let op = match self.rdr.read_u8() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };
            if op != OP_SET && op != OP_DEL {
                return Err(WalError::Corrupt);
            }

            let key = match self.read_field()? {
                Some(k) => k,
                None => return Ok(()), // truncated tail
            };

            match op {
                OP_SET => {
                    let value = match self.read_field()? {
                        Some(v) => v,
                        None => return Ok(()), // truncated tail
                    };
                    apply(WalRecord::Set { key, value });
                }
                _ => apply(WalRecord::Del { key }),
            }
        }
    }

    /// Reads one length-prefixed field. `Ok(None)` means the record was cut
    /// off mid-write and replay should stop cleanly.
    fn read_field(&mut self) -> Result<Option<Vec<u8>>, WalError> {
        let len = match self.rdr.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(WalError::Io(e)),
        };
        if len > MAX_FIELD_BYTES {
            return Err(WalError::Corrupt);
        }
        let mut field = vec![0u8; len as usize];
        match self.rdr.read_exact(&mut field) {
            Ok(()) => Ok(Some(field)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(WalError::Io(e)),
        }
    }
}
