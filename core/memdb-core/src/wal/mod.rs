//! Redo log for crash recovery.
//!
//! Committed work is appended as length-prefixed `bincode` frames. A whole
//! transaction is one frame, so a crash mid-write loses at most the torn tail
//! and never replays half a transaction.
//!
//! # Example
//!
//! ```rust
//! use memdb_core::wal::{RedoLog, RedoRecord};
//!
//! # fn main() -> memdb_core::MemDbResult<()> {
//! let dir = tempfile::tempdir()?;
//! let log = RedoLog::open(&dir.path().join("redo.log"))?;
//!
//! log.append(&RedoRecord::DropTable { name: "users".to_string() })?;
//! log.sync()?;
//! assert_eq!(log.replay()?.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::error::{MemDbError, MemDbResult};
use crate::storage::value::{Column, Row};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// File name used inside a data directory.
pub const REDO_LOG_FILE: &str = "redo.log";

/// One row-level change inside a committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowChange {
    Insert { table: String, row_id: u64, row: Row },
    Update { table: String, row_id: u64, row: Row },
    Delete { table: String, row_id: u64 },
}

impl RowChange {
    pub fn table(&self) -> &str {
        match self {
            RowChange::Insert { table, .. }
            | RowChange::Update { table, .. }
            | RowChange::Delete { table, .. } => table,
        }
    }
}

/// Redo log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RedoRecord {
    CreateTable { name: String, columns: Vec<Column> },
    DropTable { name: String },
    /// All row changes of one committed transaction, in execution order
    Commit {
        context_id: u64,
        changes: Vec<RowChange>,
    },
}

/// Append-only redo log file.
///
/// Thread-safe; shared between sessions through `Arc`.
pub struct RedoLog {
    log_file: Mutex<File>,
    path: PathBuf,
    /// Records appended since open
    sequence: AtomicU64,
}

impl RedoLog {
    /// Opens or creates the log at `path` in append mode.
    pub fn open(path: &Path) -> MemDbResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            log_file: Mutex::new(file),
            path: path.to_path_buf(),
            sequence: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a record, returning its sequence number since open.
    ///
    /// The write is buffered by the OS until [`RedoLog::sync`].
    pub fn append(&self, record: &RedoRecord) -> MemDbResult<u64> {
        let encoded = bincode::serialize(record)
            .map_err(|e| MemDbError::Wal(format!("serialization failed: {}", e)))?;
        let len = u32::try_from(encoded.len())
            .map_err(|_| MemDbError::Wal(format!("record of {} bytes too large", encoded.len())))?;

        let mut file = self
            .log_file
            .lock()
            .map_err(|e| MemDbError::Wal(format!("lock failed: {}", e)))?;

        // Length prefix and payload in one write so a frame is never interleaved.
        let mut frame = Vec::with_capacity(4 + encoded.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&encoded);
        file.write_all(&frame)?;

        Ok(self.sequence.fetch_add(1, Ordering::SeqCst))
    }

    /// fsync the log.
    pub fn sync(&self) -> MemDbResult<()> {
        let file = self
            .log_file
            .lock()
            .map_err(|e| MemDbError::Wal(format!("lock failed: {}", e)))?;

        file.sync_all()?;
        Ok(())
    }

    /// Read every complete record from the start of the file.
    ///
    /// A truncated final frame (crash during append) ends the replay and is cut
    /// off the file, so later appends start on a frame boundary. A complete
    /// frame that does not decode is an error.
    pub fn replay(&self) -> MemDbResult<Vec<RedoRecord>> {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut valid_len: u64 = 0;

        loop {
            let mut len_buf = [0u8; 4];
            if reader.read_exact(&mut len_buf).is_err() {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut data = vec![0u8; len];
            if reader.read_exact(&mut data).is_err() {
                break;
            }

            let record = bincode::deserialize::<RedoRecord>(&data)
                .map_err(|e| MemDbError::Wal(format!("deserialization failed: {}", e)))?;
            records.push(record);
            valid_len += 4 + len as u64;
        }

        if valid_len < file_len {
            warn!(
                path = ?self.path,
                dropped_bytes = file_len - valid_len,
                "truncating torn redo log tail"
            );
            let file = self
                .log_file
                .lock()
                .map_err(|e| MemDbError::Wal(format!("lock failed: {}", e)))?;
            file.set_len(valid_len)?;
        }

        Ok(records)
    }

    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}
