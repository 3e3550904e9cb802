//! Storage module — in-memory tables and the catalog.
//!
//! Tables are the resource owners of the lock core: each holds exactly one
//! [`crate::lock::TimedRwLock`] and brackets every read and mutation with it.

pub mod catalog;
pub mod table;
pub mod value;

pub use catalog::Catalog;
pub use table::{RowUpdate, Table};
pub use value::{Column, ColumnType, Row, Value};
