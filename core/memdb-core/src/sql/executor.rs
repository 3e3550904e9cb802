//! Plan execution inside a [`Transaction`].
//!
//! Every table access goes through the table's own locking with the
//! transaction's ledger; every successful row mutation is recorded on the
//! transaction for rollback and redo.

use crate::engine::QueryResult;
use crate::error::{MemDbError, MemDbResult};
use crate::sql::expr::Expr;
use crate::sql::planner::{Plan, Projection};
use crate::storage::catalog::Catalog;
use crate::storage::value::{Column, Row, Value};
use crate::transaction::{Transaction, UndoAction};
use crate::wal::RowChange;
use tracing::debug;

/// 트랜잭션 제어를 제외한 Plan 실행
pub fn execute_plan(plan: &Plan, txn: &mut Transaction<'_>) -> MemDbResult<QueryResult> {
    match plan {
        Plan::CreateTable {
            name,
            columns,
            if_not_exists,
        } => create_table(txn, name, columns, *if_not_exists),
        Plan::DropTable { names, if_exists } => drop_tables(txn, names, *if_exists),
        Plan::Insert {
            table,
            columns,
            rows,
        } => insert(txn, table, columns.as_deref(), rows),
        Plan::Select {
            table,
            projection,
            filter,
            limit,
        } => select(txn, table.as_deref(), projection, filter.as_ref(), *limit),
        Plan::Update {
            table,
            assignments,
            filter,
        } => update(txn, table, assignments, filter.as_ref()),
        Plan::Delete { table, filter } => delete(txn, table, filter.as_ref()),
        Plan::Begin | Plan::Commit | Plan::Rollback => Err(MemDbError::InvalidOperation {
            message: "transaction control is handled by the session".to_string(),
            context: "execute_plan".to_string(),
        }),
    }
}

// ════════════════════════════════════════════
// DDL
// ════════════════════════════════════════════

fn create_table(
    txn: &mut Transaction<'_>,
    name: &str,
    columns: &[Column],
    if_not_exists: bool,
) -> MemDbResult<QueryResult> {
    txn.ensure_ddl_allowed()?;
    let catalog = txn.database().catalog();
    let key = Catalog::normalize(name);
    if if_not_exists && catalog.contains(&key) {
        return Ok(QueryResult::Message(format!(
            "table '{key}' already exists, skipped"
        )));
    }
    txn.database().create_table_logged(&key, columns.to_vec())?;
    Ok(QueryResult::Message(format!("table '{key}' created")))
}

fn drop_tables(
    txn: &mut Transaction<'_>,
    names: &[String],
    if_exists: bool,
) -> MemDbResult<QueryResult> {
    txn.ensure_ddl_allowed()?;
    let db = txn.database();

    // Every name is resolved before anything is dropped.
    let mut dropped: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let key = Catalog::normalize(name);
        if dropped.contains(&key) {
            continue;
        }
        if db.catalog().contains(&key) {
            dropped.push(key);
        } else if !if_exists {
            return Err(MemDbError::TableNotFound(key));
        }
    }

    // Drops are not undone by rollback; each one is logged as it happens.
    for key in &dropped {
        db.drop_table_logged(txn.ledger(), key)?;
    }
    Ok(QueryResult::Message(if dropped.is_empty() {
        "no tables dropped".to_string()
    } else {
        format!("dropped {}", dropped.join(", "))
    }))
}

// ════════════════════════════════════════════
// DML
// ════════════════════════════════════════════

fn insert(
    txn: &mut Transaction<'_>,
    table_name: &str,
    columns: Option<&[String]>,
    rows: &[Vec<Expr>],
) -> MemDbResult<QueryResult> {
    let table = txn.database().catalog().get(table_name)?;
    let width = table.columns().len();

    // 지정된 컬럼 → 테이블 내 위치
    let positions: Vec<usize> = match columns {
        Some(names) => {
            let mut positions = Vec::with_capacity(names.len());
            for name in names {
                let idx = table.column_index(name)?;
                if positions.contains(&idx) {
                    return Err(MemDbError::ConstraintViolation(format!(
                        "column '{name}' specified more than once"
                    )));
                }
                positions.push(idx);
            }
            positions
        }
        None => (0..width).collect(),
    };

    let empty: Row = Vec::new();
    let mut inserted = 0usize;
    for exprs in rows {
        if exprs.len() != positions.len() {
            return Err(MemDbError::ConstraintViolation(format!(
                "expected {} values, got {}",
                positions.len(),
                exprs.len()
            )));
        }
        let mut row = vec![Value::Null; width];
        for (idx, expr) in positions.iter().zip(exprs) {
            row[*idx] = expr.eval(&empty)?;
        }
        let row = table.validate_row(row)?;
        let row_id = table.insert(txn.ledger(), row.clone())?;
        txn.record_row_change(
            &table,
            UndoAction::Inserted { row_id },
            RowChange::Insert {
                table: table.name().to_string(),
                row_id,
                row,
            },
        );
        inserted += 1;
    }
    debug!(table = %table.name(), rows = inserted, "insert");
    Ok(QueryResult::Affected(inserted))
}

fn select(
    txn: &mut Transaction<'_>,
    table_name: Option<&str>,
    projection: &[Projection],
    filter: Option<&Expr>,
    limit: Option<usize>,
) -> MemDbResult<QueryResult> {
    let Some(table_name) = table_name else {
        return select_constant(projection, filter);
    };
    let table = txn.database().catalog().get(table_name)?;

    let filter = filter.map(|f| f.bind(&table)).transpose()?;
    let mut columns = Vec::new();
    let mut outputs = Vec::new();
    for item in projection {
        match item {
            Projection::Wildcard => {
                for (idx, column) in table.columns().iter().enumerate() {
                    columns.push(column.name.clone());
                    outputs.push(Expr::ColumnIndex(idx));
                }
            }
            Projection::Expr { expr, alias } => {
                columns.push(output_name(expr, alias.as_deref()));
                outputs.push(expr.bind(&table)?);
            }
        }
    }

    let matching = table.scan(txn.ledger(), |row| match &filter {
        Some(f) => f.matches(row),
        None => Ok(true),
    })?;

    let rows = matching
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(_, row)| outputs.iter().map(|e| e.eval(&row)).collect())
        .collect::<MemDbResult<Vec<Row>>>()?;
    Ok(QueryResult::Rows { columns, rows })
}

/// FROM 없는 SELECT: 한 행을 계산
fn select_constant(projection: &[Projection], filter: Option<&Expr>) -> MemDbResult<QueryResult> {
    let empty: Row = Vec::new();
    let mut columns = Vec::new();
    let mut row = Vec::new();
    for item in projection {
        match item {
            Projection::Wildcard => {
                return Err(MemDbError::InvalidOperation {
                    message: "SELECT * requires a FROM clause".to_string(),
                    context: "select".to_string(),
                });
            }
            Projection::Expr { expr, alias } => {
                columns.push(output_name(expr, alias.as_deref()));
                row.push(expr.eval(&empty)?);
            }
        }
    }
    let keep = match filter {
        Some(f) => f.matches(&empty)?,
        None => true,
    };
    let rows = if keep { vec![row] } else { Vec::new() };
    Ok(QueryResult::Rows { columns, rows })
}

fn output_name(expr: &Expr, alias: Option<&str>) -> String {
    match (alias, expr) {
        (Some(alias), _) => alias.to_string(),
        (None, Expr::Column(name)) => name.clone(),
        _ => "?column?".to_string(),
    }
}

fn update(
    txn: &mut Transaction<'_>,
    table_name: &str,
    assignments: &[(String, Expr)],
    filter: Option<&Expr>,
) -> MemDbResult<QueryResult> {
    let table = txn.database().catalog().get(table_name)?;
    let filter = filter.map(|f| f.bind(&table)).transpose()?;
    let assignments = assignments
        .iter()
        .map(|(column, expr)| Ok((table.column_index(column)?, expr.bind(&table)?)))
        .collect::<MemDbResult<Vec<_>>>()?;

    let updates = table.update_where(
        txn.ledger(),
        |row| match &filter {
            Some(f) => f.matches(row),
            None => Ok(true),
        },
        |row| {
            // 모든 우변은 변경 전 행 기준으로 평가
            let mut new_row = row.clone();
            for (idx, expr) in &assignments {
                new_row[*idx] = expr.eval(row)?;
            }
            Ok(new_row)
        },
    )?;

    let affected = updates.len();
    for u in updates {
        txn.record_row_change(
            &table,
            UndoAction::Updated {
                row_id: u.row_id,
                before: u.before,
            },
            RowChange::Update {
                table: table.name().to_string(),
                row_id: u.row_id,
                row: u.after,
            },
        );
    }
    debug!(table = %table.name(), rows = affected, "update");
    Ok(QueryResult::Affected(affected))
}

fn delete(
    txn: &mut Transaction<'_>,
    table_name: &str,
    filter: Option<&Expr>,
) -> MemDbResult<QueryResult> {
    let table = txn.database().catalog().get(table_name)?;
    let filter = filter.map(|f| f.bind(&table)).transpose()?;

    let removed = table.delete_where(txn.ledger(), |row| match &filter {
        Some(f) => f.matches(row),
        None => Ok(true),
    })?;

    let affected = removed.len();
    for (row_id, row) in removed {
        txn.record_row_change(
            &table,
            UndoAction::Deleted { row_id, row },
            RowChange::Delete {
                table: table.name().to_string(),
                row_id,
            },
        );
    }
    debug!(table = %table.name(), rows = affected, "delete");
    Ok(QueryResult::Affected(affected))
}
