//! Table locking — timeout-bounded, reentrant read/write locks.
//!
//! # Architecture
//!
//! - **LockLedger**: per-connection counts of held lock names (reentrancy and
//!   self-deadlock detection live here, not in the OS primitive)
//! - **TimedRwLock**: one per table; writer slot + lock-free reader counter
//! - **LockStatistics**: injected collector of acquisition latency and timeouts
//!
//! # Example
//!
//! ```rust
//! use memdb_core::lock::{LockLedger, LockStatistics, TimedRwLock};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> memdb_core::MemDbResult<()> {
//! let stats = Arc::new(LockStatistics::new());
//! let lock = TimedRwLock::new("users", Duration::from_millis(100), stats);
//! let mut ledger = LockLedger::new(1);
//!
//! lock.write_lock(&mut ledger)?;
//! lock.write_lock(&mut ledger)?; // reentrant, never blocks
//! lock.write_unlock(&mut ledger)?;
//! lock.write_unlock(&mut ledger)?;
//! ledger.verify_empty()?;
//! # Ok(())
//! # }
//! ```
//!
//! Only the single-resource read→write upgrade is detected. Two contexts taking
//! two different tables in opposite order can still wait on each other until one
//! of them times out.

pub mod ledger;
pub mod rwlock;
pub mod stats;

pub use ledger::LockLedger;
pub use rwlock::TimedRwLock;
pub use stats::{KindStats, LockStatistics};

use std::fmt;
use std::time::Duration;

/// Process-wide default wait bound for every acquisition.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound accepted by `TimedRwLock::set_timeout`.
pub const MAX_LOCK_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Shared (read) or exclusive (write) access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    Read,
    Write,
}

impl LockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockKind::Read => "read",
            LockKind::Write => "write",
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
