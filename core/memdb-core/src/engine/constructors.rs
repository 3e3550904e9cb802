//! Database Constructors — factory methods and crash recovery

use crate::config::{DurabilityLevel, ServerConfig};
use crate::engine::Database;
use crate::engine::types::BackgroundJob;
use crate::error::{MemDbError, MemDbResult};
use crate::lock::{DEFAULT_LOCK_TIMEOUT, LockLedger, LockStatistics};
use crate::storage::catalog::Catalog;
use crate::wal::{REDO_LOG_FILE, RedoLog, RedoRecord, RowChange};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// 복구 전용 컨텍스트 ID
const RECOVERY_CONTEXT_ID: u64 = 0;

impl Database {
    /// 인메모리 데이터베이스를 생성합니다. Redo log 없음.
    ///
    /// # 예제
    ///
    /// ```rust
    /// use memdb_core::Database;
    ///
    /// # fn main() -> memdb_core::MemDbResult<()> {
    /// let db = Database::open_in_memory()?;
    /// assert!(db.table_names().is_empty());
    /// # Ok(())
    /// # }
    /// ```
    #[instrument]
    pub fn open_in_memory() -> MemDbResult<Self> {
        info!("Opening in-memory database");
        Ok(Self::assemble(DEFAULT_LOCK_TIMEOUT, None, DurabilityLevel::None))
    }

    /// 데이터 디렉토리의 데이터베이스를 열거나 생성합니다.
    ///
    /// `<dir>/redo.log`를 재생한 뒤 반환하며, 이후 커밋마다 fsync합니다.
    #[instrument(skip(dir))]
    pub fn open(dir: &Path) -> MemDbResult<Self> {
        let config = ServerConfig {
            data_dir: Some(dir.to_path_buf()),
            ..ServerConfig::default()
        };
        Self::with_config(&config)
    }

    /// 설정으로부터 데이터베이스를 생성합니다.
    #[instrument(skip(config), fields(durability = config.durability.as_str()))]
    pub fn with_config(config: &ServerConfig) -> MemDbResult<Self> {
        config.validate()?;
        let lock_timeout = config.lock_timeout();

        let Some(dir) = config.data_dir.as_deref() else {
            info!("Opening in-memory database");
            return Ok(Self::assemble(lock_timeout, None, DurabilityLevel::None));
        };
        if config.durability == DurabilityLevel::None {
            warn!(dir = ?dir, "durability is none; data directory is ignored");
            return Ok(Self::assemble(lock_timeout, None, DurabilityLevel::None));
        }

        info!("Opening database at {:?}", dir);
        std::fs::create_dir_all(dir)?;
        let redo = Arc::new(RedoLog::open(&dir.join(REDO_LOG_FILE))?);
        let db = Self::assemble(lock_timeout, Some(Arc::clone(&redo)), config.durability);

        // Perform crash recovery
        let records = redo.replay()?;
        let count = records.len();
        db.recover(records)?;
        info!(
            "Recovered {} redo records, {} tables",
            count,
            db.catalog.len()
        );
        Ok(db)
    }

    fn assemble(
        lock_timeout: Duration,
        redo: Option<Arc<RedoLog>>,
        durability: DurabilityLevel,
    ) -> Self {
        let stats = Arc::new(LockStatistics::new());

        let job_sender = match (&redo, durability) {
            (Some(redo), DurabilityLevel::Lazy) => {
                let (tx, rx) = std::sync::mpsc::channel::<BackgroundJob>();
                let redo_for_worker = Arc::clone(redo);
                std::thread::spawn(move || {
                    while let Ok(job) = rx.recv() {
                        match job {
                            BackgroundJob::RedoSync => {
                                if let Err(e) = redo_for_worker.sync() {
                                    warn!(error = %e, "background redo sync failed");
                                }
                            }
                        }
                    }
                });
                Some(tx)
            }
            _ => None,
        };

        Self {
            catalog: Catalog::new(Arc::clone(&stats), lock_timeout),
            stats,
            lock_timeout,
            redo,
            commit_gate: Mutex::new(()),
            durability,
            job_sender,
            next_context_id: AtomicU64::new(RECOVERY_CONTEXT_ID + 1),
        }
    }

    /// Redo 레코드를 순서대로 적용 (SQL 계층을 거치지 않음)
    fn recover(&self, records: Vec<RedoRecord>) -> MemDbResult<()> {
        let mut ledger = LockLedger::new(RECOVERY_CONTEXT_ID);
        for record in records {
            self.apply_redo(&mut ledger, record)
                .map_err(|e| MemDbError::RecoveryFailed(e.to_string()))?;
        }
        ledger.verify_empty()
    }

    fn apply_redo(&self, ledger: &mut LockLedger, record: RedoRecord) -> MemDbResult<()> {
        match record {
            RedoRecord::CreateTable { name, columns } => {
                self.catalog.create_table(&name, columns)?;
            }
            RedoRecord::DropTable { name } => {
                if self.catalog.contains(&name) {
                    self.catalog.drop_table(ledger, &name)?;
                } else {
                    warn!(table = %name, "redo drops a missing table, skipped");
                }
            }
            RedoRecord::Commit { context_id, changes } => {
                for change in changes {
                    let table = match self.catalog.get(change.table()) {
                        Ok(table) => table,
                        Err(MemDbError::TableNotFound(name)) => {
                            warn!(
                                table = %name,
                                context = context_id,
                                "redo change for a missing table, skipped"
                            );
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    match change {
                        RowChange::Insert { row_id, row, .. }
                        | RowChange::Update { row_id, row, .. } => {
                            table.restore_row(ledger, row_id, row)?;
                        }
                        RowChange::Delete { row_id, .. } => {
                            table.remove_row(ledger, row_id)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
