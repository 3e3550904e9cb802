//! # memdb — In-Memory SQL Database with Timed Table Locks
//!
//! memdb는 테이블 단위 잠금으로 동시성을 제어하는 인메모리 SQL 데이터베이스입니다.
//! 모든 잠금 획득은 타임아웃으로 제한되며, 연결마다 가진 Lock Ledger로
//! 재진입과 read→write 자기 교착을 판별합니다.
//!
//! ## 주요 특징
//!
//! - **Timed RW-Lock**: 테이블마다 하나, 타임아웃이 있는 재진입 잠금
//! - **Lock Ledger**: 연결별 잠금 카운트, 문장 사이에는 항상 비어 있음
//! - **Lock Statistics**: 획득 지연과 타임아웃 집계 (`SHOW LOCK STATS`)
//! - **Transaction Envelope**: auto-commit / explicit, 트랜잭션 안 DDL 금지
//! - **Redo Log**: 커밋 단위 bincode 프레임, 재시작 시 재생
//!
//! ## 빠른 시작
//!
//! ```rust
//! use memdb_core::{Database, QueryResult};
//! use std::sync::Arc;
//!
//! # fn main() -> memdb_core::MemDbResult<()> {
//! let db = Arc::new(Database::open_in_memory()?);
//! let mut session = db.connect();
//!
//! session.execute("CREATE TABLE users (id INT NOT NULL, name TEXT)")?;
//! session.execute("BEGIN; INSERT INTO users VALUES (1, 'Alice'); COMMIT")?;
//!
//! let result = session.execute("SELECT name FROM users WHERE id = 1")?;
//! assert_eq!(result.row_count(), 1);
//!
//! // 트랜잭션 안에서는 DDL 불가
//! session.execute("BEGIN")?;
//! assert!(session.execute("DROP TABLE users").is_err());
//! session.execute("ROLLBACK")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## 모듈 구조
//!
//! - [`lock`] — Lock Ledger, Timed RW-Lock, Lock Statistics
//! - [`transaction`] — 트랜잭션 엔벨로프와 undo/redo 로그
//! - [`storage`] — 테이블과 카탈로그
//! - [`sql`] — SQL 파서, 플래너, 실행기
//! - [`engine`] — 데이터베이스 엔진 ([`Database`], [`Session`])
//! - [`wal`] — Redo Log
//! - [`config`] — 서버 설정

pub mod config;
pub mod engine;
pub mod error;
pub mod lock;
pub mod sql;
pub mod storage;
pub mod transaction;
pub mod wal;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use config::{DurabilityLevel, ServerConfig};
pub use engine::{Database, QueryResult, Session};
pub use error::{MemDbError, MemDbResult};
