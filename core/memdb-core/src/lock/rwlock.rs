//! Timed Reentrant RW-Lock — one instance per table.
//!
//! Writers and reader *registration* contend for a single-slot handoff (the
//! writer slot). A reader holds the slot only long enough to bump the reader
//! counter, so any number of readers can be inside at once, while a writer keeps
//! the slot for its whole critical section and waits for the counter to drain.
//!
//! Reentrancy is decided by the caller's [`LockLedger`], never by thread
//! identity: every call takes the ledger of the context performing it.
//!
//! ```text
//! write_lock: ledger WRITE>0 ─► reentrant
//!             ledger READ>0  ─► SelfDeadlock
//!             take slot ─► wait readers == 0 ─► ledger += WRITE, READ
//! read_lock:  ledger READ>0  ─► reentrant
//!             take slot ─► readers += 1 ─► give slot back ─► ledger += READ
//! ```

use crate::error::{MemDbError, MemDbResult};
use crate::lock::{LockKind, LockLedger, LockStatistics, MAX_LOCK_TIMEOUT};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Single-slot blocking handoff.
///
/// `occupied == true` means a writer (or a registering reader) owns the slot.
#[derive(Debug, Default)]
struct WriterSlot {
    occupied: Mutex<bool>,
    released: Condvar,
}

impl WriterSlot {
    /// Place our token, waiting no later than `deadline`. Returns false on timeout.
    fn acquire(&self, deadline: Instant) -> bool {
        let mut occupied = self.occupied.lock();
        while *occupied {
            if self.released.wait_until(&mut occupied, deadline).timed_out() && *occupied {
                return false;
            }
        }
        *occupied = true;
        true
    }

    fn release(&self) {
        *self.occupied.lock() = false;
        self.released.notify_one();
    }

    fn is_occupied(&self) -> bool {
        *self.occupied.lock()
    }
}

/// Timeout-bounded, ledger-reentrant read/write lock.
#[derive(Debug)]
pub struct TimedRwLock {
    name: String,
    write_name: String,
    read_name: String,

    slot: WriterSlot,

    /// Registered readers. Changed without holding the slot on release.
    readers: AtomicUsize,
    /// Paired with `drained`; the last departing reader signals under it.
    drain: Mutex<()>,
    drained: Condvar,

    timeout_nanos: AtomicU64,
    stats: Arc<LockStatistics>,
}

impl TimedRwLock {
    /// Create a lock for the resource `name`.
    ///
    /// Ledger entries are `<name>-WRITE` and `<name>-READ`.
    pub fn new(name: impl Into<String>, timeout: Duration, stats: Arc<LockStatistics>) -> Self {
        let name = name.into();
        let lock = Self {
            write_name: format!("{name}-WRITE"),
            read_name: format!("{name}-READ"),
            name,
            slot: WriterSlot::default(),
            readers: AtomicUsize::new(0),
            drain: Mutex::new(()),
            drained: Condvar::new(),
            timeout_nanos: AtomicU64::new(0),
            stats,
        };
        lock.set_timeout(timeout);
        lock
    }

    /// Create a lock using [`crate::lock::DEFAULT_LOCK_TIMEOUT`].
    pub fn with_default_timeout(name: impl Into<String>, stats: Arc<LockStatistics>) -> Self {
        Self::new(name, crate::lock::DEFAULT_LOCK_TIMEOUT, stats)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ledger key recorded while this lock is held for writing.
    pub fn write_name(&self) -> &str {
        &self.write_name
    }

    /// Ledger key recorded while this lock is held for reading.
    pub fn read_name(&self) -> &str {
        &self.read_name
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_nanos(self.timeout_nanos.load(Ordering::Relaxed))
    }

    /// Override the wait bound. Applies to acquisitions that start afterwards.
    /// Values above [`MAX_LOCK_TIMEOUT`] are clamped.
    pub fn set_timeout(&self, timeout: Duration) {
        let timeout = timeout.min(MAX_LOCK_TIMEOUT);
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        self.timeout_nanos.store(nanos, Ordering::Relaxed);
    }

    /// Number of contexts currently registered as readers.
    pub fn active_readers(&self) -> usize {
        self.readers.load(Ordering::Acquire)
    }

    /// True while some context owns the writer slot.
    pub fn is_write_locked(&self) -> bool {
        self.slot.is_occupied()
    }

    // ════════════════════════════════════════════
    // Write side
    // ════════════════════════════════════════════

    /// Acquire exclusive access for the context owning `ledger`.
    pub fn write_lock(&self, ledger: &mut LockLedger) -> MemDbResult<()> {
        if ledger.count(&self.write_name) > 0 {
            ledger.add(&[self.write_name.as_str(), self.read_name.as_str()]);
            return Ok(());
        }

        if ledger.count(&self.read_name) > 0 {
            warn!(
                lock = %self.name,
                context = ledger.context_id(),
                "read→write upgrade rejected"
            );
            return Err(MemDbError::SelfDeadlock {
                lock: self.name.clone(),
            });
        }

        let start = Instant::now();
        let timeout = self.timeout();
        let deadline = start + timeout;

        if !self.slot.acquire(deadline) {
            return Err(self.timed_out(LockKind::Write, ledger, start));
        }

        // We own the slot: no new reader can register and no writer can enter.
        if !self.wait_for_readers(deadline) {
            // Hand the slot back, or every later acquisition would hang on it.
            self.slot.release();
            warn!(
                lock = %self.name,
                context = ledger.context_id(),
                readers = self.active_readers(),
                "readers did not drain in time, writer slot released"
            );
            return Err(self.timed_out(LockKind::Write, ledger, start));
        }

        let latency = start.elapsed();
        self.stats.record_success(LockKind::Write, latency);
        ledger.add(&[self.write_name.as_str(), self.read_name.as_str()]);
        debug!(lock = %self.name, context = ledger.context_id(), ?latency, "write lock acquired");
        Ok(())
    }

    /// Release one level of write ownership.
    ///
    /// The slot is only handed back on the outermost release. Releases are
    /// LIFO: reads taken under the write lock must be released before the
    /// outermost write. Otherwise the call fails with `LedgerInconsistency`
    /// and nothing is released.
    pub fn write_unlock(&self, ledger: &mut LockLedger) -> MemDbResult<()> {
        let outermost = ledger.count(&self.write_name) == 1;
        if outermost && ledger.count(&self.read_name) > 1 {
            error!(
                lock = %self.name,
                context = ledger.context_id(),
                "write unlocked before nested reads"
            );
            return Err(MemDbError::LedgerInconsistency(format!(
                "write lock on '{}' released while {} nested read(s) are still held",
                self.name,
                ledger.count(&self.read_name) - 1
            )));
        }
        ledger
            .remove(&[self.write_name.as_str(), self.read_name.as_str()])
            .inspect_err(|e| error!(lock = %self.name, error = %e, "write unlock failed"))?;
        if outermost {
            self.slot.release();
            debug!(lock = %self.name, context = ledger.context_id(), "write lock released");
        }
        Ok(())
    }

    // ════════════════════════════════════════════
    // Read side
    // ════════════════════════════════════════════

    /// Acquire shared access for the context owning `ledger`.
    pub fn read_lock(&self, ledger: &mut LockLedger) -> MemDbResult<()> {
        if ledger.count(&self.read_name) > 0 {
            ledger.add(&[self.read_name.as_str()]);
            return Ok(());
        }

        let start = Instant::now();
        let deadline = start + self.timeout();

        if !self.slot.acquire(deadline) {
            return Err(self.timed_out(LockKind::Read, ledger, start));
        }
        self.readers.fetch_add(1, Ordering::AcqRel);
        self.slot.release();

        let latency = start.elapsed();
        self.stats.record_success(LockKind::Read, latency);
        ledger.add(&[self.read_name.as_str()]);
        debug!(lock = %self.name, context = ledger.context_id(), ?latency, "read lock acquired");
        Ok(())
    }

    /// Release one level of read ownership.
    pub fn read_unlock(&self, ledger: &mut LockLedger) -> MemDbResult<()> {
        // A read entry seeded by our own write lock never registered as a reader.
        let registered =
            ledger.count(&self.read_name) == 1 && ledger.count(&self.write_name) == 0;
        ledger
            .remove(&[self.read_name.as_str()])
            .inspect_err(|e| error!(lock = %self.name, error = %e, "read unlock failed"))?;
        if registered {
            self.leave_reader()?;
        }
        Ok(())
    }

    // ════════════════════════════════════════════
    // Scoped helpers
    // ════════════════════════════════════════════

    /// Run `f` under the read lock. The lock is released even when `f` fails;
    /// a failed release (fatal) takes precedence over `f`'s result.
    pub fn with_read<T>(
        &self,
        ledger: &mut LockLedger,
        f: impl FnOnce(&mut LockLedger) -> MemDbResult<T>,
    ) -> MemDbResult<T> {
        self.read_lock(ledger)?;
        let result = f(ledger);
        self.read_unlock(ledger)?;
        result
    }

    /// Run `f` under the write lock, with the same release rules as [`Self::with_read`].
    pub fn with_write<T>(
        &self,
        ledger: &mut LockLedger,
        f: impl FnOnce(&mut LockLedger) -> MemDbResult<T>,
    ) -> MemDbResult<T> {
        self.write_lock(ledger)?;
        let result = f(ledger);
        self.write_unlock(ledger)?;
        result
    }

    // ════════════════════════════════════════════
    // Internals
    // ════════════════════════════════════════════

    fn leave_reader(&self) -> MemDbResult<()> {
        let previous = self
            .readers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| {
                error!(lock = %self.name, "reader count underflow");
                MemDbError::LedgerInconsistency(format!(
                    "reader count of '{}' would drop below zero",
                    self.name
                ))
            })?;
        if previous == 1 {
            let _guard = self.drain.lock();
            self.drained.notify_all();
        }
        Ok(())
    }

    /// Block until no reader is registered or `deadline` passes.
    fn wait_for_readers(&self, deadline: Instant) -> bool {
        let mut guard = self.drain.lock();
        while self.readers.load(Ordering::Acquire) > 0 {
            if self.drained.wait_until(&mut guard, deadline).timed_out() {
                return self.readers.load(Ordering::Acquire) == 0;
            }
        }
        true
    }

    fn timed_out(&self, kind: LockKind, ledger: &LockLedger, start: Instant) -> MemDbError {
        self.stats.record_failure(kind);
        let waited = start.elapsed();
        warn!(
            lock = %self.name,
            context = ledger.context_id(),
            %kind,
            ?waited,
            "lock acquisition timed out"
        );
        MemDbError::LockTimeout {
            lock: self.name.clone(),
            kind,
            waited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    fn lock_with(timeout: Duration) -> (TimedRwLock, Arc<LockStatistics>) {
        let stats = Arc::new(LockStatistics::new());
        (TimedRwLock::new("T", timeout, Arc::clone(&stats)), stats)
    }

    #[test]
    fn ledger_names_derive_from_lock_name() {
        let (lock, _) = lock_with(Duration::from_millis(10));
        assert_eq!(lock.write_name(), "T-WRITE");
        assert_eq!(lock.read_name(), "T-READ");
    }

    #[test]
    fn write_reentrancy_balances() {
        let (lock, stats) = lock_with(Duration::from_millis(50));
        let mut ledger = LockLedger::new(1);

        for _ in 0..5 {
            lock.write_lock(&mut ledger).unwrap();
        }
        assert_eq!(ledger.count("T-WRITE"), 5);
        assert!(lock.is_write_locked());

        for _ in 0..4 {
            lock.write_unlock(&mut ledger).unwrap();
            assert!(lock.is_write_locked());
        }
        lock.write_unlock(&mut ledger).unwrap();
        assert!(!lock.is_write_locked());
        ledger.verify_empty().unwrap();

        // Only the first acquisition touched the real lock.
        assert_eq!(stats.snapshot(LockKind::Write).acquired, 1);
    }

    #[test]
    fn read_reentrancy_registers_once() {
        let (lock, _) = lock_with(Duration::from_millis(50));
        let mut ledger = LockLedger::new(1);
        lock.read_lock(&mut ledger).unwrap();
        lock.read_lock(&mut ledger).unwrap();
        assert_eq!(lock.active_readers(), 1);

        lock.read_unlock(&mut ledger).unwrap();
        assert_eq!(lock.active_readers(), 1);
        lock.read_unlock(&mut ledger).unwrap();
        assert_eq!(lock.active_readers(), 0);
        ledger.verify_empty().unwrap();
    }

    #[test]
    fn writer_may_read_its_own_table() {
        let (lock, _) = lock_with(Duration::from_millis(50));
        let mut ledger = LockLedger::new(1);
        lock.write_lock(&mut ledger).unwrap();
        lock.read_lock(&mut ledger).unwrap();
        assert_eq!(lock.active_readers(), 0);
        lock.read_unlock(&mut ledger).unwrap();
        lock.write_unlock(&mut ledger).unwrap();
        assert_eq!(lock.active_readers(), 0);
        assert!(!lock.is_write_locked());
        ledger.verify_empty().unwrap();
    }

    #[test]
    fn upgrade_is_rejected_immediately() {
        // Long timeout: a hang would make the elapsed assertion fail.
        let (lock, _) = lock_with(Duration::from_secs(5));
        let mut ledger = LockLedger::new(1);
        lock.read_lock(&mut ledger).unwrap();

        let start = Instant::now();
        let err = lock.write_lock(&mut ledger).unwrap_err();
        assert!(matches!(err, MemDbError::SelfDeadlock { .. }));
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(!lock.is_write_locked());

        lock.read_unlock(&mut ledger).unwrap();
        ledger.verify_empty().unwrap();
    }

    #[test]
    fn second_writer_times_out_then_succeeds() {
        let (lock, stats) = lock_with(Duration::from_millis(10));
        let mut first = LockLedger::new(1);
        let mut second = LockLedger::new(2);

        lock.write_lock(&mut first).unwrap();

        let start = Instant::now();
        let err = lock.write_lock(&mut second).unwrap_err();
        assert!(matches!(err, MemDbError::LockTimeout { kind: LockKind::Write, .. }));
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert!(second.is_empty());
        assert_eq!(stats.snapshot(LockKind::Write).timeouts, 1);

        lock.write_unlock(&mut first).unwrap();
        lock.write_lock(&mut second).unwrap();
        lock.write_unlock(&mut second).unwrap();
    }

    #[test]
    fn reader_times_out_behind_writer() {
        let (lock, stats) = lock_with(Duration::from_millis(10));
        let mut writer = LockLedger::new(1);
        let mut reader = LockLedger::new(2);

        lock.write_lock(&mut writer).unwrap();
        let err = lock.read_lock(&mut reader).unwrap_err();
        assert!(matches!(err, MemDbError::LockTimeout { kind: LockKind::Read, .. }));
        assert_eq!(lock.active_readers(), 0);
        assert_eq!(stats.snapshot(LockKind::Read).timeouts, 1);
        lock.write_unlock(&mut writer).unwrap();
    }

    #[test]
    fn writer_gives_slot_back_when_readers_do_not_drain() {
        let (lock, _) = lock_with(Duration::from_millis(20));
        let mut reader = LockLedger::new(1);
        let mut writer = LockLedger::new(2);
        let mut late_reader = LockLedger::new(3);

        lock.read_lock(&mut reader).unwrap();
        let err = lock.write_lock(&mut writer).unwrap_err();
        assert!(matches!(err, MemDbError::LockTimeout { .. }));
        assert!(!lock.is_write_locked());

        // A new reader must still get in.
        lock.read_lock(&mut late_reader).unwrap();
        assert_eq!(lock.active_readers(), 2);
        lock.read_unlock(&mut late_reader).unwrap();
        lock.read_unlock(&mut reader).unwrap();
    }

    #[test]
    fn write_released_before_nested_read_is_rejected() {
        let (lock, _) = lock_with(Duration::from_millis(10));
        let mut ledger = LockLedger::new(1);
        lock.write_lock(&mut ledger).unwrap();
        lock.read_lock(&mut ledger).unwrap();

        let err = lock.write_unlock(&mut ledger).unwrap_err();
        assert!(err.is_fatal());
        // Nothing was released.
        assert!(lock.is_write_locked());
        assert_eq!(ledger.count(lock.write_name()), 1);
        assert_eq!(ledger.count(lock.read_name()), 2);

        lock.read_unlock(&mut ledger).unwrap();
        lock.write_unlock(&mut ledger).unwrap();
        assert!(!lock.is_write_locked());
        assert_eq!(lock.active_readers(), 0);
        ledger.verify_empty().unwrap();
    }

    #[test]
    fn unbalanced_unlock_is_fatal() {
        let (lock, _) = lock_with(Duration::from_millis(10));
        let mut ledger = LockLedger::new(1);
        assert!(lock.write_unlock(&mut ledger).unwrap_err().is_fatal());
        assert!(lock.read_unlock(&mut ledger).unwrap_err().is_fatal());
        assert!(!lock.is_write_locked());
    }

    #[test]
    fn with_write_releases_on_error() {
        let (lock, _) = lock_with(Duration::from_millis(10));
        let mut ledger = LockLedger::new(1);
        let result: MemDbResult<()> = lock.with_write(&mut ledger, |_| {
            Err(MemDbError::ConstraintViolation("boom".into()))
        });
        assert!(result.is_err());
        assert!(!lock.is_write_locked());
        ledger.verify_empty().unwrap();
    }

    #[test]
    fn set_timeout_applies_and_clamps() {
        let (lock, _) = lock_with(Duration::from_millis(10));
        lock.set_timeout(Duration::from_millis(25));
        assert_eq!(lock.timeout(), Duration::from_millis(25));
        lock.set_timeout(Duration::MAX);
        assert_eq!(lock.timeout(), MAX_LOCK_TIMEOUT);
    }

    #[test]
    fn readers_proceed_concurrently() {
        let (lock, _) = lock_with(Duration::from_millis(200));
        let lock = Arc::new(lock);
        let n = 8;
        let inside = Arc::new(Barrier::new(n));
        let done = Arc::new(Barrier::new(n + 1));

        let handles: Vec<_> = (0..n)
            .map(|i| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut ledger = LockLedger::new(i as u64 + 1);
                    lock.read_lock(&mut ledger).unwrap();
                    // Every reader must be inside before any leaves.
                    inside.wait();
                    done.wait();
                    lock.read_unlock(&mut ledger).unwrap();
                })
            })
            .collect();

        // Spin until all registered, then let them go.
        let start = Instant::now();
        while lock.active_readers() < n {
            assert!(start.elapsed() < Duration::from_secs(5));
            thread::yield_now();
        }
        assert_eq!(lock.active_readers(), n);
        done.wait();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(lock.active_readers(), 0);
    }
}
