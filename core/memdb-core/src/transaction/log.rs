//! 트랜잭션 로그 — undo 기록과 커밋 대기 중인 redo 변경분
//!
//! 세션이 소유하며, explicit 트랜잭션에서는 여러 문장에 걸쳐 유지됩니다.

use crate::storage::table::Table;
use crate::storage::value::Row;
use crate::wal::{RedoRecord, RowChange};
use std::sync::Arc;

/// 행 단위 변경을 되돌리는 방법
#[derive(Debug, Clone, PartialEq)]
pub enum UndoAction {
    /// 삽입된 행 → 삭제로 되돌림
    Inserted { row_id: u64 },
    /// 갱신된 행 → 이전 이미지 복원
    Updated { row_id: u64, before: Row },
    /// 삭제된 행 → 다시 삽입
    Deleted { row_id: u64, row: Row },
}

/// 되돌릴 테이블과 방법
#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub table: Arc<Table>,
    pub action: UndoAction,
}

/// undo/redo 누적 버퍼
#[derive(Debug, Default)]
pub struct TxnLog {
    undo: Vec<UndoRecord>,
    /// `undo[i]`와 `changes[i]`는 같은 행 변경
    changes: Vec<RowChange>,
    /// 현재 문장 시작 시점의 (undo, changes) 길이
    statement_mark: (usize, usize),
}

impl TxnLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty() && self.changes.is_empty()
    }

    /// 보류 중인 행 변경 개수
    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }

    pub(crate) fn mark_statement(&mut self) {
        self.statement_mark = (self.undo.len(), self.changes.len());
    }

    pub(crate) fn push_row_change(&mut self, undo: UndoRecord, redo: RowChange) {
        self.undo.push(undo);
        self.changes.push(redo);
    }

    /// `is_live`가 false인 테이블(커밋 전에 삭제/재생성됨)의 변경을 버림.
    /// 버린 개수를 반환.
    pub(crate) fn discard_stale_changes<F>(&mut self, is_live: F) -> usize
    where
        F: Fn(&Arc<Table>) -> bool,
    {
        let live: Vec<bool> = self.undo.iter().map(|u| is_live(&u.table)).collect();
        let stale = live.iter().filter(|l| !**l).count();
        if stale == 0 {
            return 0;
        }

        let mut mask = live.iter();
        self.changes.retain(|_| mask.next().copied().unwrap_or(true));
        let mut mask = live.iter();
        self.undo.retain(|_| mask.next().copied().unwrap_or(true));
        self.statement_mark = (0, 0);
        stale
    }

    /// 커밋할 redo 레코드를 꺼내고 로그를 비움
    pub(crate) fn take_redo(&mut self, context_id: u64) -> Vec<RedoRecord> {
        let changes = std::mem::take(&mut self.changes);
        self.undo.clear();
        self.statement_mark = (0, 0);
        if changes.is_empty() {
            Vec::new()
        } else {
            vec![RedoRecord::Commit {
                context_id,
                changes,
            }]
        }
    }

    /// 전체 undo를 역순으로 꺼냄 (redo는 폐기)
    pub(crate) fn take_undo(&mut self) -> Vec<UndoRecord> {
        self.changes.clear();
        self.statement_mark = (0, 0);
        let mut undo = std::mem::take(&mut self.undo);
        undo.reverse();
        undo
    }

    /// 현재 문장의 undo만 역순으로 꺼냄
    pub(crate) fn take_statement_undo(&mut self) -> Vec<UndoRecord> {
        let (undo_mark, change_mark) = self.statement_mark;
        self.changes.truncate(change_mark);
        let mut undo = self.undo.split_off(undo_mark.min(self.undo.len()));
        undo.reverse();
        undo
    }
}
