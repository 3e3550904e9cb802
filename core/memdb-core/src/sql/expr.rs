//! Row expressions — conversion from the sqlparser AST, column binding and
//! evaluation with SQL three-valued logic.

use crate::error::{MemDbError, MemDbResult};
use crate::storage::table::Table;
use crate::storage::value::{Row, Value};
use sqlparser::ast::{
    BinaryOperator as SqlBinaryOp, Expr as SqlExpr, UnaryOperator as SqlUnaryOp,
    Value as SqlValue,
};
use std::cmp::Ordering;

/// 이항 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // 산술
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    // 비교
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // 논리
    And,
    Or,
}

/// 단항 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
}

/// 표현식 (컬럼, 리터럴, 연산자)
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// 이름으로 참조한 컬럼 (바인딩 전)
    Column(String),
    /// 바인딩된 컬럼 위치
    ColumnIndex(usize),
    Literal(Value),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
}

pub fn convert_binary_op(op: &SqlBinaryOp) -> MemDbResult<BinaryOp> {
    match op {
        SqlBinaryOp::Plus => Ok(BinaryOp::Plus),
        SqlBinaryOp::Minus => Ok(BinaryOp::Minus),
        SqlBinaryOp::Multiply => Ok(BinaryOp::Multiply),
        SqlBinaryOp::Divide => Ok(BinaryOp::Divide),
        SqlBinaryOp::Modulo => Ok(BinaryOp::Modulo),
        SqlBinaryOp::Eq => Ok(BinaryOp::Eq),
        SqlBinaryOp::NotEq => Ok(BinaryOp::NotEq),
        SqlBinaryOp::Lt => Ok(BinaryOp::Lt),
        SqlBinaryOp::LtEq => Ok(BinaryOp::LtEq),
        SqlBinaryOp::Gt => Ok(BinaryOp::Gt),
        SqlBinaryOp::GtEq => Ok(BinaryOp::GtEq),
        SqlBinaryOp::And => Ok(BinaryOp::And),
        SqlBinaryOp::Or => Ok(BinaryOp::Or),
        _ => Err(MemDbError::SqlNotSupported {
            feature: format!("binary operator {op}"),
            hint: "Use arithmetic, comparison, AND or OR".to_string(),
        }),
    }
}

pub fn convert_value(value: &SqlValue) -> MemDbResult<Value> {
    match value {
        SqlValue::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::Integer(i))
            } else if let Ok(f) = n.parse::<f64>() {
                Ok(Value::Float(f))
            } else {
                Err(MemDbError::TypeMismatch {
                    expected: "number".to_string(),
                    actual: n.clone(),
                })
            }
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
            Ok(Value::Text(s.clone()))
        }
        SqlValue::Boolean(b) => Ok(Value::Boolean(*b)),
        SqlValue::Null => Ok(Value::Null),
        _ => Err(MemDbError::SqlNotSupported {
            feature: format!("literal {value}"),
            hint: "Use numbers, quoted strings, TRUE/FALSE or NULL".to_string(),
        }),
    }
}

impl Expr {
    /// sqlparser AST → Expr
    pub fn from_sql(expr: &SqlExpr) -> MemDbResult<Expr> {
        match expr {
            SqlExpr::Identifier(ident) => Ok(Expr::Column(ident.value.clone())),
            SqlExpr::CompoundIdentifier(idents) => {
                // table.column → just use the column name
                let name = idents.last().map(|i| i.value.clone()).unwrap_or_default();
                Ok(Expr::Column(name))
            }
            SqlExpr::Value(value) => Ok(Expr::Literal(convert_value(value)?)),
            SqlExpr::BinaryOp { left, op, right } => Ok(Expr::BinaryOp {
                left: Box::new(Self::from_sql(left)?),
                op: convert_binary_op(op)?,
                right: Box::new(Self::from_sql(right)?),
            }),
            SqlExpr::UnaryOp { op, expr } => {
                let op = match op {
                    SqlUnaryOp::Not => UnaryOp::Not,
                    SqlUnaryOp::Minus => UnaryOp::Minus,
                    SqlUnaryOp::Plus => UnaryOp::Plus,
                    other => {
                        return Err(MemDbError::SqlNotSupported {
                            feature: format!("unary operator {other}"),
                            hint: "Use NOT or unary minus".to_string(),
                        });
                    }
                };
                Ok(Expr::UnaryOp {
                    op,
                    expr: Box::new(Self::from_sql(expr)?),
                })
            }
            SqlExpr::IsNull(expr) => Ok(Expr::IsNull(Box::new(Self::from_sql(expr)?))),
            SqlExpr::IsNotNull(expr) => Ok(Expr::IsNotNull(Box::new(Self::from_sql(expr)?))),
            SqlExpr::Nested(expr) => Self::from_sql(expr),
            _ => Err(MemDbError::SqlNotSupported {
                feature: format!("expression {expr}"),
                hint: "Only literals, columns and basic operators are supported".to_string(),
            }),
        }
    }

    /// 컬럼 이름을 테이블 내 위치로 치환
    pub fn bind(&self, table: &Table) -> MemDbResult<Expr> {
        Ok(match self {
            Expr::Column(name) => Expr::ColumnIndex(table.column_index(name)?),
            Expr::ColumnIndex(_) | Expr::Literal(_) => self.clone(),
            Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
                left: Box::new(left.bind(table)?),
                op: *op,
                right: Box::new(right.bind(table)?),
            },
            Expr::UnaryOp { op, expr } => Expr::UnaryOp {
                op: *op,
                expr: Box::new(expr.bind(table)?),
            },
            Expr::IsNull(expr) => Expr::IsNull(Box::new(expr.bind(table)?)),
            Expr::IsNotNull(expr) => Expr::IsNotNull(Box::new(expr.bind(table)?)),
        })
    }

    /// 행 하나에 대해 평가
    pub fn eval(&self, row: &Row) -> MemDbResult<Value> {
        match self {
            Expr::Column(name) => Err(MemDbError::InvalidOperation {
                message: format!("column '{name}' was not bound"),
                context: "Expr::eval".to_string(),
            }),
            Expr::ColumnIndex(idx) => row.get(*idx).cloned().ok_or_else(|| {
                MemDbError::InvalidOperation {
                    message: format!("column index {idx} out of range ({})", row.len()),
                    context: "Expr::eval".to_string(),
                }
            }),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::BinaryOp { left, op, right } => {
                let l = left.eval(row)?;
                let r = right.eval(row)?;
                eval_binary(&l, *op, &r)
            }
            Expr::UnaryOp { op, expr } => eval_unary(*op, expr.eval(row)?),
            Expr::IsNull(expr) => Ok(Value::Boolean(expr.eval(row)?.is_null())),
            Expr::IsNotNull(expr) => Ok(Value::Boolean(!expr.eval(row)?.is_null())),
        }
    }

    /// WHERE 조건 평가. NULL은 매칭되지 않음
    pub fn matches(&self, row: &Row) -> MemDbResult<bool> {
        match self.eval(row)? {
            Value::Boolean(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(MemDbError::TypeMismatch {
                expected: "BOOLEAN".to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }
}

fn eval_binary(l: &Value, op: BinaryOp, r: &Value) -> MemDbResult<Value> {
    match op {
        BinaryOp::And | BinaryOp::Or => eval_logical(l, op, r),
        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Lt
        | BinaryOp::LtEq
        | BinaryOp::Gt
        | BinaryOp::GtEq => eval_comparison(l, op, r),
        _ => eval_arithmetic(l, op, r),
    }
}

fn as_truth(value: &Value) -> MemDbResult<Option<bool>> {
    match value {
        Value::Boolean(b) => Ok(Some(*b)),
        Value::Null => Ok(None),
        other => Err(MemDbError::TypeMismatch {
            expected: "BOOLEAN".to_string(),
            actual: other.type_name().to_string(),
        }),
    }
}

fn truth_value(t: Option<bool>) -> Value {
    t.map(Value::Boolean).unwrap_or(Value::Null)
}

fn eval_logical(l: &Value, op: BinaryOp, r: &Value) -> MemDbResult<Value> {
    let (l, r) = (as_truth(l)?, as_truth(r)?);
    let result = match op {
        BinaryOp::And => match (l, r) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        _ => match (l, r) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
    };
    Ok(truth_value(result))
}

fn eval_comparison(l: &Value, op: BinaryOp, r: &Value) -> MemDbResult<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    let ordering = l.compare(r).ok_or_else(|| MemDbError::TypeMismatch {
        expected: l.type_name().to_string(),
        actual: r.type_name().to_string(),
    })?;
    let result = match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::NotEq => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(Value::Boolean(result))
}

fn eval_arithmetic(l: &Value, op: BinaryOp, r: &Value) -> MemDbResult<Value> {
    match (l, r) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(a), Value::Integer(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOp::Plus => a.checked_add(b),
                BinaryOp::Minus => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::Divide | BinaryOp::Modulo if b == 0 => {
                    return Err(division_by_zero());
                }
                BinaryOp::Divide => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            result.map(Value::Integer).ok_or_else(|| MemDbError::InvalidOperation {
                message: format!("integer overflow in {a} {op:?} {b}"),
                context: "arithmetic".to_string(),
            })
        }
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            let a = as_f64(l);
            let b = as_f64(r);
            let result = match op {
                BinaryOp::Plus => a + b,
                BinaryOp::Minus => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide | BinaryOp::Modulo if b == 0.0 => {
                    return Err(division_by_zero());
                }
                BinaryOp::Divide => a / b,
                _ => a % b,
            };
            Ok(Value::Float(result))
        }
        _ => Err(MemDbError::TypeMismatch {
            expected: "numeric operands".to_string(),
            actual: format!("{} and {}", l.type_name(), r.type_name()),
        }),
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn division_by_zero() -> MemDbError {
    MemDbError::InvalidOperation {
        message: "division by zero".to_string(),
        context: "arithmetic".to_string(),
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> MemDbResult<Value> {
    match (op, value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Not, v) => Ok(truth_value(as_truth(&v)?.map(|b| !b))),
        (UnaryOp::Minus, Value::Integer(i)) => {
            i.checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| MemDbError::InvalidOperation {
                    message: format!("integer overflow in -{i}"),
                    context: "arithmetic".to_string(),
                })
        }
        (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Plus, v @ (Value::Integer(_) | Value::Float(_))) => Ok(v),
        (_, other) => Err(MemDbError::TypeMismatch {
            expected: "numeric operand".to_string(),
            actual: other.type_name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlParser;
    use sqlparser::ast::{SetExpr, Statement};

    /// "SELECT <expr>"의 첫 번째 프로젝션을 Expr로 변환
    fn parse(expr: &str) -> Expr {
        let statements = SqlParser::new().parse(&format!("SELECT {expr}")).unwrap();
        let Statement::Query(query) = &statements[0] else {
            panic!("Expected Query");
        };
        let SetExpr::Select(select) = query.body.as_ref() else {
            panic!("Expected Select");
        };
        match &select.projection[0] {
            sqlparser::ast::SelectItem::UnnamedExpr(e) => Expr::from_sql(e).unwrap(),
            other => panic!("unexpected projection {other:?}"),
        }
    }

    fn eval(expr: &str) -> Value {
        parse(expr).eval(&vec![]).unwrap()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Value::Integer(7));
        assert_eq!(eval("(1 + 2) * 3"), Value::Integer(9));
        assert_eq!(eval("7 % 3"), Value::Integer(1));
        assert_eq!(eval("1 + 0.5"), Value::Float(1.5));
        assert_eq!(eval("-5 + 2"), Value::Integer(-3));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(parse("1 / 0").eval(&vec![]).is_err());
        assert!(parse("1.0 % 0").eval(&vec![]).is_err());
    }

    #[test]
    fn test_null_propagation() {
        assert_eq!(eval("NULL + 1"), Value::Null);
        assert_eq!(eval("NULL = NULL"), Value::Null);
        assert_eq!(eval("NOT NULL"), Value::Null);
        assert_eq!(eval("NULL IS NULL"), Value::Boolean(true));
    }

    #[test]
    fn test_three_valued_logic() {
        assert_eq!(eval("NULL AND FALSE"), Value::Boolean(false));
        assert_eq!(eval("NULL AND TRUE"), Value::Null);
        assert_eq!(eval("NULL OR TRUE"), Value::Boolean(true));
        assert_eq!(eval("NULL OR FALSE"), Value::Null);
        assert_eq!(eval("NOT (1 < 2)"), Value::Boolean(false));
    }

    #[test]
    fn test_null_condition_does_not_match() {
        assert!(!parse("NULL = 1").matches(&vec![]).unwrap());
        assert!(parse("1 = 1").matches(&vec![]).unwrap());
        assert!(parse("1 + 1").matches(&vec![]).is_err());
    }

    #[test]
    fn test_comparison_type_mismatch() {
        assert!(matches!(
            parse("'a' < 1").eval(&vec![]),
            Err(MemDbError::TypeMismatch { .. })
        ));
        assert_eq!(eval("'a' < 'b'"), Value::Boolean(true));
        assert_eq!(eval("2 >= 1.5"), Value::Boolean(true));
    }

    #[test]
    fn test_column_binding() {
        use crate::lock::LockStatistics;
        use crate::storage::value::{Column, ColumnType};
        use std::sync::Arc;
        use std::time::Duration;

        let table = Table::new(
            "t",
            vec![
                Column::new("a", ColumnType::Integer),
                Column::new("b", ColumnType::Text),
            ],
            Duration::from_millis(10),
            Arc::new(LockStatistics::new()),
        );
        let bound = parse("A * 2 > 5 AND b IS NOT NULL").bind(&table).unwrap();
        let row = vec![Value::Integer(3), Value::Text("x".into())];
        assert!(bound.matches(&row).unwrap());
        let row = vec![Value::Integer(3), Value::Null];
        assert!(!bound.matches(&row).unwrap());

        assert!(matches!(
            parse("missing = 1").bind(&table),
            Err(MemDbError::ColumnNotFound { .. })
        ));
        // 바인딩하지 않은 컬럼은 평가 불가
        assert!(parse("a").eval(&vec![Value::Integer(1)]).is_err());
    }
}
