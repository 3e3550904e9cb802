//! Table — the resource owner of one `TimedRwLock`.
//!
//! Every read path runs under the table's read lock and every mutation under its
//! write lock, always with the ledger of the calling context. The inner
//! `parking_lot::RwLock` only provides memory safety: access is already gated
//! by `lock`, so it never contends.

use crate::error::{MemDbError, MemDbResult};
use crate::lock::{LockLedger, LockStatistics, TimedRwLock};
use crate::storage::value::{Column, Row};
use crate::transaction::UndoAction;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Before/after images of one updated row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    pub row_id: u64,
    pub before: Row,
    pub after: Row,
}

/// In-memory table: schema, rows keyed by row id, and its lock.
#[derive(Debug)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    lock: TimedRwLock,
    rows: RwLock<BTreeMap<u64, Row>>,
    next_row_id: AtomicU64,
}

impl Table {
    pub fn new(
        name: impl Into<String>,
        columns: Vec<Column>,
        lock_timeout: Duration,
        stats: Arc<LockStatistics>,
    ) -> Self {
        let name = name.into();
        Self {
            lock: TimedRwLock::new(name.clone(), lock_timeout, stats),
            name,
            columns,
            rows: RwLock::new(BTreeMap::new()),
            next_row_id: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// The table's lock (timeouts, introspection).
    pub fn lock(&self) -> &TimedRwLock {
        &self.lock
    }

    /// Position of `column` (case-insensitive).
    pub fn column_index(&self, column: &str) -> MemDbResult<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
            .ok_or_else(|| MemDbError::ColumnNotFound {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    /// Coerce and constraint-check a full row.
    pub fn validate_row(&self, row: Row) -> MemDbResult<Row> {
        if row.len() != self.columns.len() {
            return Err(MemDbError::ConstraintViolation(format!(
                "table '{}' has {} columns but {} values were supplied",
                self.name,
                self.columns.len(),
                row.len()
            )));
        }
        self.columns
            .iter()
            .zip(row)
            .map(|(column, value)| column.check(value))
            .collect()
    }

    // ════════════════════════════════════════════
    // Read paths
    // ════════════════════════════════════════════

    /// Rows matching `filter`, in row-id order.
    pub fn scan<F>(&self, ledger: &mut LockLedger, filter: F) -> MemDbResult<Vec<(u64, Row)>>
    where
        F: Fn(&Row) -> MemDbResult<bool>,
    {
        self.lock.with_read(ledger, |_| {
            let rows = self.rows.read();
            let mut out = Vec::new();
            for (row_id, row) in rows.iter() {
                if filter(row)? {
                    out.push((*row_id, row.clone()));
                }
            }
            Ok(out)
        })
    }

    pub fn row_count(&self, ledger: &mut LockLedger) -> MemDbResult<usize> {
        self.lock.with_read(ledger, |_| Ok(self.rows.read().len()))
    }

    // ════════════════════════════════════════════
    // Write paths
    // ════════════════════════════════════════════

    /// Insert one row, returning its row id.
    pub fn insert(&self, ledger: &mut LockLedger, row: Row) -> MemDbResult<u64> {
        let row = self.validate_row(row)?;
        self.lock.with_write(ledger, |_| {
            let row_id = self.next_row_id.fetch_add(1, Ordering::SeqCst);
            self.rows.write().insert(row_id, row);
            Ok(row_id)
        })
    }

    /// Rewrite every row matching `filter` with `update`.
    ///
    /// All new images are computed and validated before any row changes, so a
    /// failure leaves the table untouched.
    pub fn update_where<F, U>(
        &self,
        ledger: &mut LockLedger,
        filter: F,
        update: U,
    ) -> MemDbResult<Vec<RowUpdate>>
    where
        F: Fn(&Row) -> MemDbResult<bool>,
        U: Fn(&Row) -> MemDbResult<Row>,
    {
        self.lock.with_write(ledger, |ledger| {
            // Read-locked helper under our own write lock: reentrant.
            let matching = self.scan(ledger, filter)?;
            let mut updates = Vec::with_capacity(matching.len());
            for (row_id, before) in matching {
                let after = self.validate_row(update(&before)?)?;
                updates.push(RowUpdate {
                    row_id,
                    before,
                    after,
                });
            }

            let mut rows = self.rows.write();
            for u in &updates {
                rows.insert(u.row_id, u.after.clone());
            }
            Ok(updates)
        })
    }

    /// Delete every row matching `filter`, returning the removed rows.
    pub fn delete_where<F>(&self, ledger: &mut LockLedger, filter: F) -> MemDbResult<Vec<(u64, Row)>>
    where
        F: Fn(&Row) -> MemDbResult<bool>,
    {
        self.lock.with_write(ledger, |ledger| {
            let matching = self.scan(ledger, filter)?;
            let mut rows = self.rows.write();
            for (row_id, _) in &matching {
                rows.remove(row_id);
            }
            Ok(matching)
        })
    }

    /// Put a row back under a known id (undo and redo replay).
    pub fn restore_row(&self, ledger: &mut LockLedger, row_id: u64, row: Row) -> MemDbResult<()> {
        self.lock.with_write(ledger, |_| {
            self.rows.write().insert(row_id, row);
            // Keep fresh ids above anything restored.
            self.next_row_id.fetch_max(row_id + 1, Ordering::SeqCst);
            Ok(())
        })
    }

    /// Remove a row by id. Returns whether it existed.
    pub fn remove_row(&self, ledger: &mut LockLedger, row_id: u64) -> MemDbResult<bool> {
        self.lock
            .with_write(ledger, |_| Ok(self.rows.write().remove(&row_id).is_some()))
    }

    /// Reverse one recorded change.
    pub fn apply_undo(&self, ledger: &mut LockLedger, undo: &UndoAction) -> MemDbResult<()> {
        match undo {
            UndoAction::Inserted { row_id } => {
                self.remove_row(ledger, *row_id)?;
            }
            UndoAction::Updated { row_id, before } | UndoAction::Deleted { row_id, row: before } => {
                self.restore_row(ledger, *row_id, before.clone())?;
            }
        }
        Ok(())
    }
}
