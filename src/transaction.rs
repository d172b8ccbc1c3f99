mod lock_manager;
mod tx;
mod wait_for_graph;

pub use lock_manager::{Lock, LockManager, LockRecord, Permission};
pub use tx::{Transaction, TransactionID};
pub(crate) use wait_for_graph::WaitForGraph;
