// Redo log 복구 테스트: 커밋된 작업만 재생되는지 확인

use memdb_core::lock::LockLedger;
use memdb_core::storage::Value;
use memdb_core::wal::REDO_LOG_FILE;
use memdb_core::{Database, DurabilityLevel, MemDbError, MemDbResult, QueryResult, ServerConfig};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn select(db: &Arc<Database>, sql: &str) -> Vec<Vec<Value>> {
    match db.connect().execute(sql).unwrap() {
        QueryResult::Rows { rows, .. } => rows,
        other => panic!("expected rows, got {other:?}"),
    }
}

#[test]
fn test_committed_work_survives_restart() -> MemDbResult<()> {
    let dir = tempdir()?;
    {
        let db = Arc::new(Database::open(dir.path())?);
        let mut s = db.connect();
        s.execute("CREATE TABLE users (id INT NOT NULL, name TEXT)")?;
        s.execute("INSERT INTO users VALUES (1, 'alice'), (2, 'bob'), (3, 'carol')")?;
        s.execute("UPDATE users SET name = 'robert' WHERE id = 2")?;
        s.execute("DELETE FROM users WHERE id = 3")?;
        s.execute("BEGIN; INSERT INTO users VALUES (4, 'dave'); COMMIT")?;
        s.execute("BEGIN; INSERT INTO users VALUES (5, 'eve'); ROLLBACK")?;
        s.execute("CREATE TABLE scratch (a INT)")?;
        s.execute("DROP TABLE scratch")?;
    }

    let db = Arc::new(Database::open(dir.path())?);
    assert_eq!(db.table_names(), vec!["users".to_string()]);
    assert_eq!(
        select(&db, "SELECT id, name FROM users"),
        vec![
            vec![Value::Integer(1), Value::Text("alice".into())],
            vec![Value::Integer(2), Value::Text("robert".into())],
            vec![Value::Integer(4), Value::Text("dave".into())],
        ]
    );
    Ok(())
}

#[test]
fn test_open_transaction_is_not_replayed() -> MemDbResult<()> {
    let dir = tempdir()?;
    {
        let db = Arc::new(Database::open(dir.path())?);
        let mut committed = db.connect();
        committed.execute("CREATE TABLE t (a INT)")?;
        committed.execute("INSERT INTO t VALUES (1)")?;

        // 커밋 전 "크래시": 세션을 정리하지 않고 버림
        let mut open = db.connect();
        open.execute("BEGIN; INSERT INTO t VALUES (2)")?;
        std::mem::forget(open);
    }

    let db = Arc::new(Database::open(dir.path())?);
    assert_eq!(select(&db, "SELECT a FROM t"), vec![vec![Value::Integer(1)]]);
    Ok(())
}

#[test]
fn test_torn_tail_is_ignored() -> MemDbResult<()> {
    let dir = tempdir()?;
    {
        let db = Arc::new(Database::open(dir.path())?);
        let mut s = db.connect();
        s.execute("CREATE TABLE t (a INT)")?;
        s.execute("INSERT INTO t VALUES (1)")?;
    }
    {
        // 기록 도중 중단된 프레임
        let mut raw = OpenOptions::new()
            .append(true)
            .open(dir.path().join(REDO_LOG_FILE))?;
        raw.write_all(&64u32.to_le_bytes())?;
        raw.write_all(&[0xAB; 10])?;
    }

    {
        let db = Arc::new(Database::open(dir.path())?);
        assert_eq!(select(&db, "SELECT a FROM t"), vec![vec![Value::Integer(1)]]);
        db.connect().execute("INSERT INTO t VALUES (2)")?;
    }

    // 잘린 꼬리 뒤에 기록된 커밋도 다시 읽힘
    let db = Arc::new(Database::open(dir.path())?);
    assert_eq!(select(&db, "SELECT a FROM t").len(), 2);
    Ok(())
}

#[test]
fn test_lazy_durability_recovers() -> MemDbResult<()> {
    let dir = tempdir()?;
    let config = ServerConfig {
        data_dir: Some(dir.path().to_path_buf()),
        durability: DurabilityLevel::Lazy,
        ..ServerConfig::default()
    };
    {
        let db = Arc::new(Database::with_config(&config)?);
        let mut s = db.connect();
        s.execute("CREATE TABLE t (a INT)")?;
        for i in 0..20 {
            s.execute(&format!("INSERT INTO t VALUES ({i})"))?;
        }
    }

    let db = Arc::new(Database::with_config(&config)?);
    assert_eq!(db.durability(), DurabilityLevel::Lazy);
    assert_eq!(select(&db, "SELECT * FROM t").len(), 20);
    Ok(())
}

#[test]
fn test_row_ids_continue_after_restart() -> MemDbResult<()> {
    let dir = tempdir()?;
    {
        let db = Arc::new(Database::open(dir.path())?);
        let mut s = db.connect();
        s.execute("CREATE TABLE t (a INT)")?;
        s.execute("INSERT INTO t VALUES (1), (2)")?;
    }
    {
        let db = Arc::new(Database::open(dir.path())?);
        db.connect().execute("INSERT INTO t VALUES (3)")?;
    }
    // 재시작 후 새 행이 기존 행 ID를 덮어쓰지 않음
    let db = Arc::new(Database::open(dir.path())?);
    assert_eq!(select(&db, "SELECT * FROM t").len(), 3);
    Ok(())
}

#[test]
fn test_durability_none_keeps_nothing() -> MemDbResult<()> {
    let dir = tempdir()?;
    let config = ServerConfig {
        data_dir: Some(dir.path().to_path_buf()),
        durability: DurabilityLevel::None,
        ..ServerConfig::default()
    };
    {
        let db = Arc::new(Database::with_config(&config)?);
        assert!(db.redo_path().is_none());
        db.connect().execute("CREATE TABLE t (a INT)")?;
    }
    let db = Arc::new(Database::with_config(&config)?);
    assert!(db.table_names().is_empty());
    Ok(())
}

#[test]
fn test_commit_after_concurrent_drop_reopens() -> MemDbResult<()> {
    let dir = tempdir()?;
    {
        let db = Arc::new(Database::open(dir.path())?);
        let mut a = db.connect();
        let mut b = db.connect();
        a.execute("CREATE TABLE t (a INT)")?;
        a.execute("CREATE TABLE keep (a INT)")?;

        a.execute("BEGIN; INSERT INTO t VALUES (1); INSERT INTO keep VALUES (2)")?;
        b.execute("DROP TABLE t")?;
        a.execute("COMMIT")?;
    }

    // t 변경은 커밋 기록에서 빠지고 keep 변경만 남음
    let db = Arc::new(Database::open(dir.path())?);
    assert_eq!(db.table_names(), vec!["keep".to_string()]);
    assert_eq!(select(&db, "SELECT a FROM keep"), vec![vec![Value::Integer(2)]]);
    Ok(())
}

#[test]
fn test_commit_after_drop_and_recreate_keeps_new_shape() -> MemDbResult<()> {
    let dir = tempdir()?;
    {
        let db = Arc::new(Database::open(dir.path())?);
        let mut a = db.connect();
        let mut b = db.connect();
        a.execute("CREATE TABLE t (a INT)")?;

        a.execute("BEGIN; INSERT INTO t VALUES (1)")?;
        b.execute("DROP TABLE t")?;
        b.execute("CREATE TABLE t (x TEXT, y TEXT)")?;
        a.execute("COMMIT")?;

        assert!(select(&db, "SELECT * FROM t").is_empty());
    }

    let db = Arc::new(Database::open(dir.path())?);
    assert!(select(&db, "SELECT * FROM t").is_empty());
    db.connect().execute("INSERT INTO t VALUES ('x', 'y')")?;
    Ok(())
}

#[test]
fn test_failed_multi_drop_keeps_tables_after_restart() -> MemDbResult<()> {
    let dir = tempdir()?;
    {
        let db = Arc::new(Database::open(dir.path())?);
        let mut s = db.connect();
        s.execute("CREATE TABLE a (v INT)")?;
        s.execute("INSERT INTO a VALUES (1)")?;

        assert!(matches!(
            s.execute("DROP TABLE a, missing"),
            Err(MemDbError::TableNotFound(_))
        ));
        assert_eq!(db.table_names(), vec!["a".to_string()]);
    }

    let db = Arc::new(Database::open(dir.path())?);
    assert_eq!(db.table_names(), vec!["a".to_string()]);
    assert_eq!(select(&db, "SELECT v FROM a"), vec![vec![Value::Integer(1)]]);
    Ok(())
}

#[test]
fn test_partial_multi_drop_is_durable() -> MemDbResult<()> {
    let dir = tempdir()?;
    {
        let db = Arc::new(Database::open(dir.path())?);
        let mut s = db.connect();
        s.execute("CREATE TABLE a (v INT)")?;
        s.execute("CREATE TABLE b (v INT)")?;
        db.set_table_lock_timeout("b", Duration::from_millis(20))?;

        let table = db.catalog().get("b")?;
        let mut holder = LockLedger::new(u64::MAX);
        table.lock().write_lock(&mut holder)?;

        // a는 삭제되고 b에서 시간 초과
        assert!(matches!(
            s.execute("DROP TABLE a, b"),
            Err(MemDbError::LockTimeout { .. })
        ));
        assert_eq!(db.table_names(), vec!["b".to_string()]);

        table.lock().write_unlock(&mut holder)?;
    }

    // 메모리와 같은 상태로 복구
    let db = Arc::new(Database::open(dir.path())?);
    assert_eq!(db.table_names(), vec!["b".to_string()]);
    Ok(())
}
