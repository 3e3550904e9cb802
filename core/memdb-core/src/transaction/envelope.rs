//! Transaction Envelope — auto-commit vs. explicit transaction
//!
//! 트랜잭션은 잠금 상태를 직접 갖지 않습니다. 잠금은 세션의 `LockLedger`에,
//! 되돌리기 정보는 세션의 `TxnLog`에 있으며, 엔벨로프는 둘을 빌려서
//! DDL 허용 여부와 commit/rollback 경계를 결정합니다.

use crate::engine::Database;
use crate::error::{MemDbError, MemDbResult};
use crate::lock::LockLedger;
use crate::storage::table::Table;
use crate::transaction::log::{TxnLog, UndoAction, UndoRecord};
use crate::wal::RowChange;
use std::sync::Arc;
use tracing::{debug, warn};

/// 문장 실행기가 받는 트랜잭션 엔벨로프
pub struct Transaction<'a> {
    db: &'a Database,
    ledger: &'a mut LockLedger,
    log: &'a mut TxnLog,
    auto_commit: bool,
}

impl<'a> Transaction<'a> {
    pub fn new(
        db: &'a Database,
        ledger: &'a mut LockLedger,
        log: &'a mut TxnLog,
        auto_commit: bool,
    ) -> Self {
        Self {
            db,
            ledger,
            log,
            auto_commit,
        }
    }

    /// 단일 문장 모드면 true, BEGIN…COMMIT 블록 안이면 false
    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn database(&self) -> &'a Database {
        self.db
    }

    /// 테이블 연산에 그대로 넘길 세션 ledger
    pub fn ledger(&mut self) -> &mut LockLedger {
        self.ledger
    }

    /// DDL은 트랜잭션 경계를 다른 문장과 공유할 수 없음
    pub fn ensure_ddl_allowed(&self) -> MemDbResult<()> {
        if self.auto_commit {
            Ok(())
        } else {
            Err(MemDbError::DdlInTransaction)
        }
    }

    /// 현재 문장의 시작 지점 기록 (문장 단위 롤백용)
    pub fn begin_statement(&mut self) {
        self.log.mark_statement();
    }

    /// 성공한 행 변경을 undo/redo 양쪽에 기록
    pub fn record_row_change(&mut self, table: &Arc<Table>, undo: UndoAction, redo: RowChange) {
        self.log.push_row_change(
            UndoRecord {
                table: Arc::clone(table),
                action: undo,
            },
            redo,
        );
    }

    /// 커밋: 보류 중인 redo를 로그에 기록하고 undo를 폐기
    ///
    /// auto-commit이면 문장 하나, explicit이면 블록 전체를 확정합니다.
    /// 그 사이 삭제된 테이블에 대한 변경은 기록되지 않습니다.
    pub fn commit(self) -> MemDbResult<()> {
        let context_id = self.ledger.context_id();
        debug!(
            context = context_id,
            changes = self.log.pending_changes(),
            "commit"
        );
        self.db.commit_log(self.log, context_id)
    }

    /// 롤백: undo를 역순으로 테이블에 적용하고 redo를 폐기
    pub fn rollback(self) -> MemDbResult<()> {
        let undo = self.log.take_undo();
        debug!(context = self.ledger.context_id(), undo = undo.len(), "rollback");
        apply_undo(self.ledger, undo)
    }

    /// 실패한 문장만 되돌리고 explicit 블록은 유지
    pub fn rollback_statement(&mut self) -> MemDbResult<()> {
        let undo = self.log.take_statement_undo();
        apply_undo(self.ledger, undo)
    }
}

/// 모든 undo를 시도한 뒤 첫 번째 오류를 반환. 치명적 오류는 즉시 반환.
fn apply_undo(ledger: &mut LockLedger, undo: Vec<UndoRecord>) -> MemDbResult<()> {
    let mut first_error = None;
    for record in undo {
        if let Err(e) = record.table.apply_undo(ledger, &record.action) {
            if e.is_fatal() {
                return Err(e);
            }
            warn!(table = %record.table.name(), error = %e, "undo failed");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value::{Column, ColumnType, Value};

    fn setup() -> (Database, Arc<Table>) {
        let db = Database::open_in_memory().unwrap();
        let table = db
            .catalog()
            .create_table("t", vec![Column::new("v", ColumnType::Integer)])
            .unwrap();
        (db, table)
    }

    fn insert(txn: &mut Transaction<'_>, table: &Arc<Table>, v: i64) {
        let row = vec![Value::Integer(v)];
        let row_id = table.insert(txn.ledger(), row.clone()).unwrap();
        txn.record_row_change(
            table,
            UndoAction::Inserted { row_id },
            RowChange::Insert {
                table: table.name().to_string(),
                row_id,
                row,
            },
        );
    }

    #[test]
    fn ddl_rejected_inside_explicit_transaction() {
        let (db, _) = setup();
        let mut ledger = LockLedger::new(1);
        let mut log = TxnLog::new();

        let txn = Transaction::new(&db, &mut ledger, &mut log, false);
        assert!(!txn.is_auto_commit());
        assert!(matches!(
            txn.ensure_ddl_allowed(),
            Err(MemDbError::DdlInTransaction)
        ));

        let txn = Transaction::new(&db, &mut ledger, &mut log, true);
        assert!(txn.ensure_ddl_allowed().is_ok());
    }

    #[test]
    fn rollback_undoes_in_reverse() {
        let (db, table) = setup();
        let mut ledger = LockLedger::new(1);
        let mut log = TxnLog::new();

        let mut txn = Transaction::new(&db, &mut ledger, &mut log, true);
        insert(&mut txn, &table, 1);
        insert(&mut txn, &table, 2);
        txn.rollback().unwrap();

        assert!(log.is_empty());
        assert_eq!(table.row_count(&mut ledger).unwrap(), 0);
        ledger.verify_empty().unwrap();
    }

    #[test]
    fn commit_clears_the_log() {
        let (db, table) = setup();
        let mut ledger = LockLedger::new(1);
        let mut log = TxnLog::new();

        let mut txn = Transaction::new(&db, &mut ledger, &mut log, true);
        insert(&mut txn, &table, 1);
        txn.commit().unwrap();

        assert!(log.is_empty());
        assert_eq!(table.row_count(&mut ledger).unwrap(), 1);
    }

    #[test]
    fn statement_rollback_keeps_earlier_work() {
        let (db, table) = setup();
        let mut ledger = LockLedger::new(1);
        let mut log = TxnLog::new();

        {
            let mut txn = Transaction::new(&db, &mut ledger, &mut log, false);
            txn.begin_statement();
            insert(&mut txn, &table, 1);
        }
        {
            let mut txn = Transaction::new(&db, &mut ledger, &mut log, false);
            txn.begin_statement();
            insert(&mut txn, &table, 2);
            txn.rollback_statement().unwrap();
        }

        assert_eq!(log.pending_changes(), 1);
        let rows = table.scan(&mut ledger, |_| Ok(true)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, vec![Value::Integer(1)]);
    }
}
