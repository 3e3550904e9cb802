pub mod envelope;
pub mod log;

// Public exports
pub use envelope::Transaction;
pub use log::{TxnLog, UndoAction, UndoRecord};
