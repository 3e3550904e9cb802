// SQL 모듈 진입점
pub mod executor;
pub mod expr;
pub mod parser;
pub mod planner;

pub use executor::execute_plan;
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use parser::{AdminCommand, SqlParser};
pub use planner::{Plan, Projection};
