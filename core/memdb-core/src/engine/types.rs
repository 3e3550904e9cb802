//! Engine-internal types

/// 백그라운드에서 처리할 작업 정의
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BackgroundJob {
    /// Redo log 동기화 (fsync)
    RedoSync,
}
