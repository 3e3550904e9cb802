//! Database struct definition — the top-level context

use crate::config::DurabilityLevel;
use crate::engine::session::Session;
use crate::engine::types::BackgroundJob;
use crate::error::{MemDbError, MemDbResult};
use crate::lock::{LockLedger, LockStatistics};
use crate::storage::catalog::Catalog;
use crate::storage::table::Table;
use crate::storage::value::Column;
use crate::transaction::TxnLog;
use crate::wal::{RedoLog, RedoRecord};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::time::Duration;
use tracing::{debug, warn};

/// memdb 데이터베이스 엔진
///
/// 테이블 카탈로그, 프로세스 전체의 잠금 통계 수집기, redo log를 소유합니다.
/// 클라이언트는 [`Database::connect`]로 세션을 얻어 SQL을 실행합니다.
///
/// # 예제
///
/// ```rust
/// use memdb_core::Database;
/// use std::sync::Arc;
///
/// # fn main() -> memdb_core::MemDbResult<()> {
/// let db = Arc::new(Database::open_in_memory()?);
/// let mut session = db.connect();
/// session.execute("CREATE TABLE users (id INT, name TEXT)")?;
/// session.execute("INSERT INTO users VALUES (1, 'Alice')")?;
/// assert_eq!(db.table_names(), vec!["users".to_string()]);
/// # Ok(())
/// # }
/// ```
pub struct Database {
    /// 살아 있는 테이블 집합
    pub(crate) catalog: Catalog,

    /// 모든 테이블 잠금이 공유하는 통계 수집기
    pub(crate) stats: Arc<LockStatistics>,

    /// 새 테이블 잠금의 기본 타임아웃
    pub(crate) lock_timeout: Duration,

    /// Redo log (None = 메모리 전용)
    pub(crate) redo: Option<Arc<RedoLog>>,

    pub(crate) durability: DurabilityLevel,

    /// redo log 기록 순서를 카탈로그 변경 순서와 맞추는 게이트.
    /// 커밋의 생존 테이블 검사와 기록, CREATE TABLE의 등록과 기록이 이 안에서 일어남.
    pub(crate) commit_gate: Mutex<()>,

    /// Lazy 모드 fsync 워커 채널
    pub(crate) job_sender: Option<Sender<BackgroundJob>>,

    /// 세션 컨텍스트 ID 할당기 (0은 복구용)
    pub(crate) next_context_id: AtomicU64,
}

impl Database {
    /// 새 세션 생성. 세션마다 고유한 컨텍스트 ID와 ledger
    pub fn connect(self: &Arc<Self>) -> Session {
        let context_id = self.next_context_id.fetch_add(1, Ordering::SeqCst);
        debug!(context = context_id, "session opened");
        Session::new(Arc::clone(self), context_id)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn lock_stats(&self) -> &Arc<LockStatistics> {
        &self.stats
    }

    /// 운영자용 잠금 통계 보고서
    pub fn lock_stats_report(&self) -> String {
        self.stats.report()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.catalog.table_names()
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn durability(&self) -> DurabilityLevel {
        self.durability
    }

    pub fn redo_path(&self) -> Option<&Path> {
        self.redo.as_ref().map(|log| log.path())
    }

    /// 특정 테이블 잠금의 타임아웃 변경
    pub fn set_table_lock_timeout(&self, table: &str, timeout: Duration) -> MemDbResult<()> {
        self.catalog.get(table)?.lock().set_timeout(timeout);
        Ok(())
    }

    /// 트랜잭션 커밋: 보류 중인 행 변경을 하나의 Commit 레코드로 기록
    ///
    /// 커밋 전에 삭제되거나 재생성된 테이블의 변경은 메모리에서도 이미 사라졌으므로
    /// 기록하지 않습니다.
    pub(crate) fn commit_log(&self, log: &mut TxnLog, context_id: u64) -> MemDbResult<()> {
        let gate = self.commit_gate.lock();
        let stale = log.discard_stale_changes(|table| self.catalog.is_live(table));
        if stale > 0 {
            warn!(
                context = context_id,
                changes = stale,
                "discarding changes to tables dropped before commit"
            );
        }
        let records = log.take_redo(context_id);

        let Some(redo) = &self.redo else {
            return Ok(());
        };
        if records.is_empty() {
            return Ok(());
        }
        for record in &records {
            redo.append(record)?;
        }
        drop(gate);
        self.sync_redo(redo)
    }

    /// 테이블 생성과 CreateTable 기록
    ///
    /// 등록과 기록이 같은 게이트 안에서 일어나므로, 새 테이블을 건드린 커밋은
    /// 항상 CreateTable 뒤에 기록됩니다.
    pub(crate) fn create_table_logged(
        &self,
        name: &str,
        columns: Vec<Column>,
    ) -> MemDbResult<Arc<Table>> {
        let gate = self.commit_gate.lock();
        let table = self.catalog.create_table(name, columns.clone())?;
        let Some(redo) = &self.redo else {
            return Ok(table);
        };
        redo.append(&RedoRecord::CreateTable {
            name: table.name().to_string(),
            columns,
        })?;
        drop(gate);
        self.sync_redo(redo)?;
        Ok(table)
    }

    /// 테이블 삭제와 DropTable 기록
    ///
    /// 삭제는 문장이 나중에 실패해도 되돌려지지 않으므로 즉시 기록합니다.
    /// 쓰기 잠금은 게이트 밖에서 기다리고, 카탈로그 제거와 기록은 게이트 안에서
    /// 함께 일어납니다. 같은 이름의 CreateTable이 DropTable보다 앞서 기록될 수 없습니다.
    pub(crate) fn drop_table_logged(&self, ledger: &mut LockLedger, name: &str) -> MemDbResult<()> {
        let table = self.catalog.get(name)?;
        table.lock().with_write(ledger, |ledger| {
            let _gate = self.commit_gate.lock();
            if !self.catalog.is_live(&table) {
                return Err(MemDbError::TableNotFound(table.name().to_string()));
            }
            // 이미 쥔 쓰기 잠금에 재진입
            self.catalog.drop_table(ledger, table.name())?;
            if let Some(redo) = &self.redo {
                redo.append(&RedoRecord::DropTable {
                    name: table.name().to_string(),
                })?;
            }
            Ok(())
        })?;
        match &self.redo {
            Some(redo) => self.sync_redo(redo),
            None => Ok(()),
        }
    }

    fn sync_redo(&self, redo: &RedoLog) -> MemDbResult<()> {
        match self.durability {
            DurabilityLevel::Full => redo.sync()?,
            DurabilityLevel::Lazy => {
                if let Some(tx) = &self.job_sender {
                    let _ = tx.send(BackgroundJob::RedoSync);
                } else {
                    redo.sync()?;
                }
            }
            DurabilityLevel::None => {}
        }
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Some(redo) = &self.redo {
            if let Err(e) = redo.sync() {
                warn!(error = %e, "final redo log sync failed");
            }
        }
    }
}
