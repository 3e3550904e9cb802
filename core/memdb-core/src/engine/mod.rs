//! Database Engine Module

pub mod constructors;
pub mod database;
pub mod result;
pub mod session;
pub(crate) mod types;

pub use database::Database;
pub use result::QueryResult;
pub use session::Session;
