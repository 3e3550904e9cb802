//! Catalog — the set of live tables.
//!
//! Table names are case-insensitive and stored lower-case. Each table gets its
//! own lock at creation; locks are never shared between tables.

use crate::error::{MemDbError, MemDbResult};
use crate::lock::{LockLedger, LockStatistics};
use crate::storage::table::Table;
use crate::storage::value::Column;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct Catalog {
    tables: DashMap<String, Arc<Table>>,
    stats: Arc<LockStatistics>,
    lock_timeout: Duration,
}

impl Catalog {
    /// `lock_timeout` becomes the timeout of every table created later.
    pub fn new(stats: Arc<LockStatistics>, lock_timeout: Duration) -> Self {
        Self {
            tables: DashMap::new(),
            stats,
            lock_timeout,
        }
    }

    pub fn normalize(name: &str) -> String {
        name.trim().to_lowercase()
    }

    pub fn create_table(&self, name: &str, columns: Vec<Column>) -> MemDbResult<Arc<Table>> {
        let key = Self::normalize(name);
        if columns.is_empty() {
            return Err(MemDbError::ConstraintViolation(format!(
                "table '{key}' needs at least one column"
            )));
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name))
            {
                return Err(MemDbError::ConstraintViolation(format!(
                    "duplicate column '{}' in table '{key}'",
                    column.name
                )));
            }
        }

        match self.tables.entry(key.clone()) {
            Entry::Occupied(_) => Err(MemDbError::TableAlreadyExists(key)),
            Entry::Vacant(slot) => {
                let table = Arc::new(Table::new(
                    key.clone(),
                    columns,
                    self.lock_timeout,
                    Arc::clone(&self.stats),
                ));
                slot.insert(Arc::clone(&table));
                info!(table = %key, "table created");
                Ok(table)
            }
        }
    }

    /// Remove a table once in-flight operations on it have finished.
    ///
    /// The table's write lock is taken with the caller's ledger before the
    /// catalog entry goes away.
    pub fn drop_table(&self, ledger: &mut LockLedger, name: &str) -> MemDbResult<Arc<Table>> {
        let key = Self::normalize(name);
        let table = self.get(&key)?;
        table.lock().with_write(ledger, |_| {
            self.tables
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &table))
                .ok_or_else(|| MemDbError::TableNotFound(key.clone()))
        })?;
        info!(table = %key, "table dropped");
        Ok(table)
    }

    pub fn get(&self, name: &str) -> MemDbResult<Arc<Table>> {
        let key = Self::normalize(name);
        self.tables
            .get(&key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(MemDbError::TableNotFound(key))
    }

    /// True while `table` is still the catalog entry under its name
    /// (not dropped, not replaced by a newer table of the same name).
    pub fn is_live(&self, table: &Arc<Table>) -> bool {
        self.tables
            .get(table.name())
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), table))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(&Self::normalize(name))
    }

    /// Sorted table names.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value::ColumnType;

    fn catalog() -> Catalog {
        Catalog::new(Arc::new(LockStatistics::new()), Duration::from_millis(20))
    }

    fn cols() -> Vec<Column> {
        vec![Column::new("id", ColumnType::Integer)]
    }

    #[test]
    fn create_get_drop() {
        let catalog = catalog();
        catalog.create_table("Users", cols()).unwrap();
        assert!(catalog.contains("USERS"));
        assert_eq!(catalog.get("users").unwrap().name(), "users");
        assert_eq!(catalog.table_names(), vec!["users".to_string()]);

        let mut ledger = LockLedger::new(1);
        catalog.drop_table(&mut ledger, "users").unwrap();
        assert!(catalog.is_empty());
        ledger.verify_empty().unwrap();
    }

    #[test]
    fn duplicate_table_rejected() {
        let catalog = catalog();
        catalog.create_table("t", cols()).unwrap();
        assert!(matches!(
            catalog.create_table("T", cols()),
            Err(MemDbError::TableAlreadyExists(_))
        ));
    }

    #[test]
    fn duplicate_column_rejected() {
        let catalog = catalog();
        let columns = vec![
            Column::new("id", ColumnType::Integer),
            Column::new("ID", ColumnType::Text),
        ];
        assert!(catalog.create_table("t", columns).is_err());
        assert!(catalog.is_empty());
    }

    #[test]
    fn tables_get_the_catalog_timeout() {
        let catalog = catalog();
        let table = catalog.create_table("t", cols()).unwrap();
        assert_eq!(table.lock().timeout(), Duration::from_millis(20));
    }

    #[test]
    fn drop_waits_for_writer_and_times_out() {
        let catalog = catalog();
        let table = catalog.create_table("t", cols()).unwrap();

        let mut writer = LockLedger::new(1);
        table.lock().write_lock(&mut writer).unwrap();

        let mut dropper = LockLedger::new(2);
        let err = catalog.drop_table(&mut dropper, "t").unwrap_err();
        assert!(matches!(err, MemDbError::LockTimeout { .. }));
        assert!(catalog.contains("t"));

        table.lock().write_unlock(&mut writer).unwrap();
        catalog.drop_table(&mut dropper, "t").unwrap();
        assert!(!catalog.contains("t"));
    }

    #[test]
    fn recreated_table_is_not_the_old_one() {
        let catalog = catalog();
        let old = catalog.create_table("t", cols()).unwrap();
        assert!(catalog.is_live(&old));

        let mut ledger = LockLedger::new(1);
        catalog.drop_table(&mut ledger, "t").unwrap();
        assert!(!catalog.is_live(&old));

        let new = catalog.create_table("t", cols()).unwrap();
        assert!(catalog.is_live(&new));
        assert!(!catalog.is_live(&old));
    }

    #[test]
    fn drop_missing_table() {
        let catalog = catalog();
        let mut ledger = LockLedger::new(1);
        assert!(matches!(
            catalog.drop_table(&mut ledger, "nope"),
            Err(MemDbError::TableNotFound(_))
        ));
    }
}
