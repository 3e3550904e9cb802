//! Session — one client connection (or batch profile).
//!
//! A session owns its [`LockLedger`], so every lock it takes is counted against
//! its own context. Between statements the ledger must be empty; a non-empty
//! ledger at the start of `execute` means a previous statement leaked a lock.

use crate::engine::Database;
use crate::engine::result::QueryResult;
use crate::error::{MemDbError, MemDbResult};
use crate::lock::LockLedger;
use crate::sql::{AdminCommand, Plan, SqlParser, execute_plan};
use crate::transaction::{Transaction, TxnLog};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct Session {
    db: Arc<Database>,
    ledger: LockLedger,
    log: TxnLog,
    /// BEGIN…COMMIT 블록 안인지 여부
    in_transaction: bool,
    parser: SqlParser,
}

impl Session {
    pub(crate) fn new(db: Arc<Database>, context_id: u64) -> Self {
        Self {
            db,
            ledger: LockLedger::new(context_id),
            log: TxnLog::new(),
            in_transaction: false,
            parser: SqlParser::new(),
        }
    }

    pub fn context_id(&self) -> u64 {
        self.ledger.context_id()
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn ledger(&self) -> &LockLedger {
        &self.ledger
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// SQL 배치를 실행하고 마지막 문장의 결과를 반환
    pub fn execute(&mut self, sql: &str) -> MemDbResult<QueryResult> {
        let mut results = self.execute_batch(sql)?;
        Ok(results
            .pop()
            .unwrap_or_else(|| QueryResult::Message("OK".to_string())))
    }

    /// SQL 배치를 실행하고 문장별 결과를 반환. 첫 오류에서 중단.
    pub fn execute_batch(&mut self, sql: &str) -> MemDbResult<Vec<QueryResult>> {
        self.ledger.verify_empty()?;

        if let Some(command) = AdminCommand::detect(sql) {
            return Ok(vec![self.run_admin(command)]);
        }

        let statements = self.parser.parse(sql)?;
        let mut results = Vec::with_capacity(statements.len());
        for statement in &statements {
            let plan = Plan::from_statement(statement)?;
            results.push(self.run_plan(&plan)?);
        }
        Ok(results)
    }

    fn run_admin(&self, command: AdminCommand) -> QueryResult {
        match command {
            AdminCommand::ShowLockStats => QueryResult::Message(self.db.lock_stats_report()),
        }
    }

    fn run_plan(&mut self, plan: &Plan) -> MemDbResult<QueryResult> {
        match plan {
            Plan::Begin => self.begin(),
            Plan::Commit => self.commit(),
            Plan::Rollback => self.rollback(),
            _ if self.in_transaction => self.run_in_transaction(plan),
            _ => self.run_auto_commit(plan),
        }
    }

    fn begin(&mut self) -> MemDbResult<QueryResult> {
        if self.in_transaction {
            return Err(MemDbError::InvalidOperation {
                message: "a transaction is already in progress".to_string(),
                context: "BEGIN".to_string(),
            });
        }
        self.in_transaction = true;
        debug!(context = self.context_id(), "transaction started");
        Ok(QueryResult::Message("BEGIN".to_string()))
    }

    fn commit(&mut self) -> MemDbResult<QueryResult> {
        if !self.in_transaction {
            return Err(MemDbError::InvalidOperation {
                message: "no transaction in progress".to_string(),
                context: "COMMIT".to_string(),
            });
        }
        self.in_transaction = false;
        Transaction::new(&self.db, &mut self.ledger, &mut self.log, false).commit()?;
        Ok(QueryResult::Message("COMMIT".to_string()))
    }

    fn rollback(&mut self) -> MemDbResult<QueryResult> {
        if !self.in_transaction {
            return Err(MemDbError::InvalidOperation {
                message: "no transaction in progress".to_string(),
                context: "ROLLBACK".to_string(),
            });
        }
        self.in_transaction = false;
        Transaction::new(&self.db, &mut self.ledger, &mut self.log, false).rollback()?;
        Ok(QueryResult::Message("ROLLBACK".to_string()))
    }

    /// 단일 문장 트랜잭션: 성공 시 커밋, 실패 시 롤백
    fn run_auto_commit(&mut self, plan: &Plan) -> MemDbResult<QueryResult> {
        let mut txn = Transaction::new(&self.db, &mut self.ledger, &mut self.log, true);
        match execute_plan(plan, &mut txn) {
            Ok(result) => {
                txn.commit()?;
                Ok(result)
            }
            Err(e) => {
                if let Err(undo_error) = txn.rollback() {
                    error!(error = %undo_error, "auto-commit rollback failed");
                    if undo_error.is_fatal() {
                        return Err(undo_error);
                    }
                }
                Err(e)
            }
        }
    }

    /// explicit 트랜잭션 안의 문장: 실패하면 그 문장만 되돌림
    fn run_in_transaction(&mut self, plan: &Plan) -> MemDbResult<QueryResult> {
        let mut txn = Transaction::new(&self.db, &mut self.ledger, &mut self.log, false);
        txn.begin_statement();
        match execute_plan(plan, &mut txn) {
            Ok(result) => Ok(result),
            Err(e) => {
                if let Err(undo_error) = txn.rollback_statement() {
                    error!(error = %undo_error, "statement rollback failed");
                    if undo_error.is_fatal() {
                        return Err(undo_error);
                    }
                }
                Err(e)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.in_transaction {
            warn!(
                context = self.context_id(),
                "session closed with an open transaction; rolling back"
            );
            self.in_transaction = false;
            let txn = Transaction::new(&self.db, &mut self.ledger, &mut self.log, false);
            if let Err(e) = txn.rollback() {
                error!(error = %e, "rollback on close failed");
            }
        }
        if !self.ledger.is_empty() {
            error!(
                context = self.context_id(),
                held = ?self.ledger.held(),
                "session closed while holding locks"
            );
        }
    }
}
