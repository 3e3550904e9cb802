//! Statement planner — sqlparser AST → [`Plan`]

use crate::error::{MemDbError, MemDbResult};
use crate::sql::expr::Expr;
use crate::storage::value::{Column, ColumnType};
use sqlparser::ast::{
    ColumnOption, FromTable, GroupByExpr, ObjectType, Query, SelectItem, SetExpr, Statement,
    TableFactor,
};

/// SELECT 출력 항목
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `*`
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

/// 실행 가능한 문장
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    CreateTable {
        name: String,
        columns: Vec<Column>,
        if_not_exists: bool,
    },
    DropTable {
        names: Vec<String>,
        if_exists: bool,
    },
    Insert {
        table: String,
        /// 지정하지 않으면 테이블 컬럼 순서
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Expr>>,
    },
    Select {
        /// FROM이 없으면 None (상수 SELECT)
        table: Option<String>,
        projection: Vec<Projection>,
        filter: Option<Expr>,
        limit: Option<usize>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        filter: Option<Expr>,
    },
    Delete {
        table: String,
        filter: Option<Expr>,
    },
    Begin,
    Commit,
    Rollback,
}

impl Plan {
    /// 스키마를 바꾸는 문장 (트랜잭션 안에서 금지)
    pub fn is_ddl(&self) -> bool {
        matches!(self, Plan::CreateTable { .. } | Plan::DropTable { .. })
    }

    /// 트랜잭션 제어 문장
    pub fn is_transaction_control(&self) -> bool {
        matches!(self, Plan::Begin | Plan::Commit | Plan::Rollback)
    }

    /// SQL Statement → Plan 변환
    pub fn from_statement(statement: &Statement) -> MemDbResult<Plan> {
        match statement {
            Statement::CreateTable(create_table) => {
                let columns = create_table
                    .columns
                    .iter()
                    .map(|col| {
                        let column_type = ColumnType::from_sql(&col.data_type.to_string())?;
                        let not_null = col.options.iter().any(|opt| {
                            matches!(
                                opt.option,
                                ColumnOption::NotNull
                                    | ColumnOption::Unique {
                                        is_primary: true,
                                        ..
                                    }
                            )
                        });
                        let column = Column::new(col.name.value.clone(), column_type);
                        Ok(if not_null { column.not_null() } else { column })
                    })
                    .collect::<MemDbResult<Vec<_>>>()?;
                Ok(Plan::CreateTable {
                    name: create_table.name.to_string(),
                    columns,
                    if_not_exists: create_table.if_not_exists,
                })
            }
            Statement::Drop {
                names,
                object_type,
                if_exists,
                ..
            } => match object_type {
                ObjectType::Table => Ok(Plan::DropTable {
                    names: names.iter().map(|n| n.to_string()).collect(),
                    if_exists: *if_exists,
                }),
                _ => Err(MemDbError::SqlNotSupported {
                    feature: format!("DROP {object_type}"),
                    hint: "Only DROP TABLE is supported".to_string(),
                }),
            },
            Statement::Insert(insert) => {
                let table = insert.table_name.to_string();
                let columns = if insert.columns.is_empty() {
                    None
                } else {
                    Some(insert.columns.iter().map(|c| c.value.clone()).collect())
                };
                let source = insert.source.as_ref().ok_or_else(|| MemDbError::SqlNotSupported {
                    feature: "INSERT without VALUES".to_string(),
                    hint: "Use INSERT INTO t VALUES (...)".to_string(),
                })?;
                let rows = match source.body.as_ref() {
                    SetExpr::Values(values) => values
                        .rows
                        .iter()
                        .map(|row| row.iter().map(Expr::from_sql).collect())
                        .collect::<MemDbResult<Vec<Vec<Expr>>>>()?,
                    _ => {
                        return Err(MemDbError::SqlNotSupported {
                            feature: "INSERT ... SELECT".to_string(),
                            hint: "Use INSERT INTO t VALUES (...)".to_string(),
                        });
                    }
                };
                Ok(Plan::Insert {
                    table,
                    columns,
                    rows,
                })
            }
            Statement::Query(query) => Self::plan_query(query),
            Statement::Update {
                table,
                assignments,
                selection,
                from,
                ..
            } => {
                if from.is_some() || !table.joins.is_empty() {
                    return Err(MemDbError::SqlNotSupported {
                        feature: "UPDATE with joins".to_string(),
                        hint: "Update a single table".to_string(),
                    });
                }
                let assignments = assignments
                    .iter()
                    .map(|a| Ok((a.target.to_string(), Expr::from_sql(&a.value)?)))
                    .collect::<MemDbResult<Vec<_>>>()?;
                Ok(Plan::Update {
                    table: table.relation.to_string(),
                    assignments,
                    filter: selection.as_ref().map(Expr::from_sql).transpose()?,
                })
            }
            Statement::Delete(delete) => {
                let tables = match &delete.from {
                    FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
                };
                let [from] = tables.as_slice() else {
                    return Err(MemDbError::SqlNotSupported {
                        feature: "multi-table DELETE".to_string(),
                        hint: "Delete from a single table".to_string(),
                    });
                };
                Ok(Plan::Delete {
                    table: from.relation.to_string(),
                    filter: delete.selection.as_ref().map(Expr::from_sql).transpose()?,
                })
            }
            Statement::StartTransaction { .. } => Ok(Plan::Begin),
            Statement::Commit { .. } => Ok(Plan::Commit),
            Statement::Rollback { savepoint: None, .. } => Ok(Plan::Rollback),
            _ => Err(MemDbError::SqlNotSupported {
                feature: statement_kind(statement),
                hint: "Supported: CREATE/DROP TABLE, INSERT, SELECT, UPDATE, DELETE, BEGIN, COMMIT, ROLLBACK".to_string(),
            }),
        }
    }

    fn plan_query(query: &Query) -> MemDbResult<Plan> {
        if query.order_by.is_some() || query.offset.is_some() || query.with.is_some() {
            return Err(MemDbError::SqlNotSupported {
                feature: "ORDER BY / OFFSET / WITH".to_string(),
                hint: "Use SELECT ... FROM t [WHERE ...] [LIMIT n]".to_string(),
            });
        }
        let SetExpr::Select(select) = query.body.as_ref() else {
            return Err(MemDbError::SqlNotSupported {
                feature: "set operations".to_string(),
                hint: "Use a single SELECT".to_string(),
            });
        };
        let grouped = match &select.group_by {
            GroupByExpr::Expressions(exprs, _) => !exprs.is_empty(),
            GroupByExpr::All(_) => true,
        };
        if grouped || select.having.is_some() || select.distinct.is_some() {
            return Err(MemDbError::SqlNotSupported {
                feature: "GROUP BY / HAVING / DISTINCT".to_string(),
                hint: "Aggregation is not supported".to_string(),
            });
        }

        let table = match select.from.as_slice() {
            [] => None,
            [from] if from.joins.is_empty() => match &from.relation {
                TableFactor::Table { name, .. } => Some(name.to_string()),
                other => {
                    return Err(MemDbError::SqlNotSupported {
                        feature: format!("FROM {other}"),
                        hint: "Select from a table".to_string(),
                    });
                }
            },
            _ => {
                return Err(MemDbError::SqlNotSupported {
                    feature: "joins".to_string(),
                    hint: "Select from a single table".to_string(),
                });
            }
        };

        let projection = select
            .projection
            .iter()
            .map(|item| match item {
                SelectItem::Wildcard(_) => Ok(Projection::Wildcard),
                SelectItem::UnnamedExpr(expr) => Ok(Projection::Expr {
                    expr: Expr::from_sql(expr)?,
                    alias: None,
                }),
                SelectItem::ExprWithAlias { expr, alias } => Ok(Projection::Expr {
                    expr: Expr::from_sql(expr)?,
                    alias: Some(alias.value.clone()),
                }),
                other => Err(MemDbError::SqlNotSupported {
                    feature: format!("projection {other}"),
                    hint: "Use * or expressions".to_string(),
                }),
            })
            .collect::<MemDbResult<Vec<_>>>()?;

        let limit = query.limit.as_ref().map(extract_usize).transpose()?;

        Ok(Plan::Select {
            table,
            projection,
            filter: select.selection.as_ref().map(Expr::from_sql).transpose()?,
            limit,
        })
    }
}

/// LIMIT 리터럴 → usize
fn extract_usize(expr: &sqlparser::ast::Expr) -> MemDbResult<usize> {
    match expr {
        sqlparser::ast::Expr::Value(sqlparser::ast::Value::Number(n, _)) => {
            n.parse::<usize>().map_err(|_| MemDbError::TypeMismatch {
                expected: "non-negative integer LIMIT".to_string(),
                actual: n.clone(),
            })
        }
        _ => Err(MemDbError::SqlNotSupported {
            feature: format!("LIMIT {expr}"),
            hint: "LIMIT must be an integer literal".to_string(),
        }),
    }
}

/// 에러 메시지용 문장 종류 (첫 단어 두 개)
fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlParser;
    use crate::storage::value::Value;

    fn plan(sql: &str) -> MemDbResult<Plan> {
        let statements = SqlParser::new().parse(sql)?;
        Plan::from_statement(&statements[0])
    }

    #[test]
    fn test_plan_create_table() {
        let p = plan("CREATE TABLE IF NOT EXISTS users (id INT PRIMARY KEY, name VARCHAR(20) NOT NULL, score FLOAT)").unwrap();
        match p {
            Plan::CreateTable {
                name,
                columns,
                if_not_exists,
            } => {
                assert_eq!(name, "users");
                assert!(if_not_exists);
                assert_eq!(columns.len(), 3);
                assert!(!columns[0].nullable);
                assert_eq!(columns[1].column_type, ColumnType::Text);
                assert!(!columns[1].nullable);
                assert!(columns[2].nullable);
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn test_plan_insert_multi_row() {
        let p = plan("INSERT INTO users (id, name) VALUES (1, 'a'), (2, 'b')").unwrap();
        match p {
            Plan::Insert {
                table,
                columns,
                rows,
            } => {
                assert_eq!(table, "users");
                assert_eq!(columns, Some(vec!["id".to_string(), "name".to_string()]));
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[1][0], Expr::Literal(Value::Integer(2)));
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn test_plan_select() {
        let p = plan("SELECT id, name AS n FROM users WHERE id > 1 LIMIT 5").unwrap();
        match p {
            Plan::Select {
                table,
                projection,
                filter,
                limit,
            } => {
                assert_eq!(table.as_deref(), Some("users"));
                assert_eq!(projection.len(), 2);
                assert!(matches!(
                    &projection[1],
                    Projection::Expr { alias: Some(a), .. } if a == "n"
                ));
                assert!(filter.is_some());
                assert_eq!(limit, Some(5));
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn test_plan_update_delete() {
        assert!(matches!(
            plan("UPDATE users SET name = 'x', id = id + 1 WHERE id = 1").unwrap(),
            Plan::Update { ref assignments, filter: Some(_), .. } if assignments.len() == 2
        ));
        assert!(matches!(
            plan("DELETE FROM users").unwrap(),
            Plan::Delete { filter: None, .. }
        ));
    }

    #[test]
    fn test_plan_transaction_control() {
        assert_eq!(plan("BEGIN").unwrap(), Plan::Begin);
        assert_eq!(plan("START TRANSACTION").unwrap(), Plan::Begin);
        assert_eq!(plan("COMMIT").unwrap(), Plan::Commit);
        assert_eq!(plan("ROLLBACK").unwrap(), Plan::Rollback);
        assert!(Plan::Begin.is_transaction_control());
    }

    #[test]
    fn test_ddl_classification() {
        assert!(plan("DROP TABLE IF EXISTS a, b").unwrap().is_ddl());
        assert!(!plan("DELETE FROM a").unwrap().is_ddl());
    }

    #[test]
    fn test_unsupported() {
        assert!(matches!(
            plan("SELECT * FROM a ORDER BY x"),
            Err(MemDbError::SqlNotSupported { .. })
        ));
        assert!(matches!(
            plan("SELECT * FROM a JOIN b ON a.x = b.x"),
            Err(MemDbError::SqlNotSupported { .. })
        ));
        assert!(matches!(
            plan("CREATE TABLE t (d DATE)"),
            Err(MemDbError::SqlNotSupported { .. })
        ));
    }
}
