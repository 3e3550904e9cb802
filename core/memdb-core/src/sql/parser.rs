use crate::error::{MemDbError, MemDbResult};
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// sqlparser-rs 기반 SQL 파서
pub struct SqlParser {
    dialect: GenericDialect,
}

impl SqlParser {
    /// 새 SQL 파서 생성
    pub fn new() -> Self {
        Self {
            dialect: GenericDialect {},
        }
    }

    /// SQL 문자열을 AST로 파싱 (세미콜론으로 구분된 여러 문장 허용)
    pub fn parse(&self, sql: &str) -> MemDbResult<Vec<Statement>> {
        Parser::parse_sql(&self.dialect, sql).map_err(|e| MemDbError::SqlParse {
            message: e.to_string(),
            sql: sql.to_string(),
        })
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// 파싱 전에 가로채는 관리 명령
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// SHOW LOCK STATS
    ShowLockStats,
}

impl AdminCommand {
    /// 공백/대소문자/끝의 세미콜론을 무시하고 매칭
    pub fn detect(sql: &str) -> Option<Self> {
        let trimmed = sql.trim().trim_end_matches(';');
        let words: Vec<&str> = trimmed.split_whitespace().collect();
        match words.as_slice() {
            [a, b, c]
                if a.eq_ignore_ascii_case("SHOW")
                    && b.eq_ignore_ascii_case("LOCK")
                    && c.eq_ignore_ascii_case("STATS") =>
            {
                Some(AdminCommand::ShowLockStats)
            }
            _ => None,
        }
    }
}
