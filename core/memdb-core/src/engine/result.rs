//! Statement results and their plain-text rendering.

use crate::storage::value::Row;
use std::fmt;

/// 문장 하나의 실행 결과
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// SELECT 결과
    Rows { columns: Vec<String>, rows: Vec<Row> },
    /// INSERT/UPDATE/DELETE 영향 행 수
    Affected(usize),
    /// DDL, 트랜잭션 제어, 관리 명령
    Message(String),
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        match self {
            QueryResult::Rows { rows, .. } => rows.len(),
            QueryResult::Affected(n) => *n,
            QueryResult::Message(_) => 0,
        }
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Rows { columns, rows } => {
                let cells: Vec<Vec<String>> = rows
                    .iter()
                    .map(|row| row.iter().map(|v| v.to_string()).collect())
                    .collect();
                let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
                for row in &cells {
                    for (w, cell) in widths.iter_mut().zip(row) {
                        *w = (*w).max(cell.chars().count());
                    }
                }

                let line = |f: &mut fmt::Formatter<'_>, values: &[String]| -> fmt::Result {
                    let padded: Vec<String> = values
                        .iter()
                        .zip(&widths)
                        .map(|(v, &w)| format!("{v:<w$}"))
                        .collect();
                    writeln!(f, "{}", padded.join(" | ").trim_end())
                };

                line(f, columns)?;
                let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
                writeln!(f, "{}", rule.join("-+-"))?;
                for row in &cells {
                    line(f, row)?;
                }
                let n = rows.len();
                write!(f, "({n} {})", if n == 1 { "row" } else { "rows" })
            }
            QueryResult::Affected(n) => {
                write!(f, "{n} {} affected", if *n == 1 { "row" } else { "rows" })
            }
            QueryResult::Message(text) => f.write_str(text),
        }
    }
}
