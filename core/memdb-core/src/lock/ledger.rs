//! Lock Ledger — per-connection record of held lock names.
//!
//! A ledger is owned by exactly one connection and is never shared, so it needs
//! no synchronization. Absent names count as zero.

use crate::error::{MemDbError, MemDbResult};
use ahash::AHashMap;

/// How many times one context currently holds each lock name.
#[derive(Debug, Default)]
pub struct LockLedger {
    context_id: u64,
    counts: AHashMap<String, usize>,
}

impl LockLedger {
    /// Create an empty ledger for the given process-unique context id.
    pub fn new(context_id: u64) -> Self {
        Self {
            context_id,
            counts: AHashMap::new(),
        }
    }

    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    /// Current held-count for `name` (0 when never taken).
    pub fn count(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }

    /// Increment every name by one.
    pub fn add(&mut self, names: &[&str]) {
        for name in names {
            *self.counts.entry((*name).to_string()).or_insert(0) += 1;
        }
    }

    /// Decrement every name by one.
    ///
    /// All names are checked before any is touched, so a failed call leaves the
    /// ledger unchanged. Going below zero is a caller defect and is fatal.
    pub fn remove(&mut self, names: &[&str]) -> MemDbResult<()> {
        for (i, name) in names.iter().enumerate() {
            // The same name may appear twice in one call.
            let wanted = names[..=i].iter().filter(|n| *n == name).count();
            if self.count(name) < wanted {
                return Err(MemDbError::LedgerInconsistency(format!(
                    "context {} released '{}' more often than it acquired it",
                    self.context_id, name
                )));
            }
        }

        for name in names {
            if let Some(count) = self.counts.get_mut(*name) {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(*name);
                }
            }
        }
        Ok(())
    }

    /// Assert that nothing is held. Called before a connection takes its next
    /// request; a non-empty ledger there is fatal.
    pub fn verify_empty(&self) -> MemDbResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        let held = self
            .held()
            .into_iter()
            .map(|(name, count)| format!("{name}={count}"))
            .collect::<Vec<_>>()
            .join(", ");
        Err(MemDbError::LedgerInconsistency(format!(
            "context {} still holds locks at a request boundary: {}",
            self.context_id, held
        )))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.values().all(|count| *count == 0)
    }

    /// Held names with their counts, sorted by name (diagnostics only).
    pub fn held(&self) -> Vec<(String, usize)> {
        let mut held: Vec<(String, usize)> = self
            .counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(name, count)| (name.clone(), *count))
            .collect();
        held.sort();
        held
    }
}
