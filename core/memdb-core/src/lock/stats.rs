//! Lock Statistics — acquisition latency and timeout counters.
//!
//! One collector is constructed by the `Database` and handed to every table
//! lock as an `Arc`. Updates take a short internal mutex; callers never block
//! on anything else here.

use crate::lock::LockKind;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::time::Duration;

/// Aggregated numbers for one lock kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindStats {
    /// Successful acquisitions (reentrant ones are not counted)
    pub acquired: u64,
    /// Acquisitions that gave up after the timeout
    pub timeouts: u64,
    pub min: Option<Duration>,
    pub max: Duration,
    pub total: Duration,
}

impl KindStats {
    /// Mean latency over successful acquisitions.
    pub fn average(&self) -> Option<Duration> {
        if self.acquired == 0 {
            return None;
        }
        let nanos = self.total.as_nanos() / u128::from(self.acquired);
        Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }

    fn record(&mut self, latency: Duration) {
        self.acquired += 1;
        self.total = self.total.saturating_add(latency);
        self.max = self.max.max(latency);
        self.min = Some(self.min.map_or(latency, |min| min.min(latency)));
    }
}

/// Process-wide lock statistics collector.
#[derive(Debug, Default)]
pub struct LockStatistics {
    read: Mutex<KindStats>,
    write: Mutex<KindStats>,
}

impl LockStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: LockKind) -> &Mutex<KindStats> {
        match kind {
            LockKind::Read => &self.read,
            LockKind::Write => &self.write,
        }
    }

    pub fn record_success(&self, kind: LockKind, latency: Duration) {
        self.slot(kind).lock().record(latency);
    }

    pub fn record_failure(&self, kind: LockKind) {
        self.slot(kind).lock().timeouts += 1;
    }

    /// Copy of the current numbers for `kind`.
    pub fn snapshot(&self, kind: LockKind) -> KindStats {
        self.slot(kind).lock().clone()
    }

    pub fn reset(&self) {
        *self.read.lock() = KindStats::default();
        *self.write.lock() = KindStats::default();
    }

    /// Human-readable summary, one line per kind. Backs `SHOW LOCK STATS`.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for kind in [LockKind::Read, LockKind::Write] {
            let stats = self.snapshot(kind);
            match (stats.min, stats.average()) {
                (Some(min), Some(avg)) => {
                    let _ = writeln!(
                        out,
                        "{kind} locks: min={min:?} max={max:?} avg={avg:?} acquired={acquired} timeouts={timeouts}",
                        max = stats.max,
                        acquired = stats.acquired,
                        timeouts = stats.timeouts,
                    );
                }
                _ => {
                    let _ = writeln!(
                        out,
                        "{kind} locks: no data yet (timeouts={})",
                        stats.timeouts
                    );
                }
            }
        }
        out
    }
}
