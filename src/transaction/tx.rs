use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{storage::buffer_pool::BufferPool, types::DbResult};

pub type TransactionID = u64;

static TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Eq, PartialEq, Clone)]
pub struct Transaction {
    // increase monotonically by 1
    id: TransactionID,
}

impl Transaction {
    pub fn new() -> Self {
        let id = TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        Self { id }
    }

    /// Flush every page the transaction touched, then release its locks.
    pub fn commit(&self, buffer_pool: &BufferPool) -> DbResult {
        buffer_pool.transaction_complete(self, true)
    }

    /// Undo the changes of the transaction through the before-images, then
    /// release its locks.
    pub fn abort(&self, buffer_pool: &BufferPool) -> DbResult {
        buffer_pool.transaction_complete(self, false)
    }

    pub fn get_id(&self) -> TransactionID {
        self.id
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl std::hash::Hash for Transaction {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.id)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        return write!(f, "{}", self);
    }
}
