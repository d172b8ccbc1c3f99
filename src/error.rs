use std::{error::Error, fmt, io};

use backtrace::Backtrace;
use log::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A lock request closed a cycle in the wait-for graph, or ran out of
    /// retries. The transaction has to be aborted by its caller.
    Deadlock,

    /// Every resident page is dirty, so there is no eviction victim.
    ResourceExhausted,

    Io,

    NotFound,

    /// The page or tuple doesn't allow the requested operation (no free
    /// slot, empty slot, missing record id).
    Storage,
}

#[derive(Debug)]
pub struct DbError {
    kind: ErrorKind,
    details: String,
}

impl DbError {
    pub fn new(kind: ErrorKind, msg: &str) -> DbError {
        DbError {
            kind,
            details: msg.to_string(),
        }
    }

    pub fn deadlock(msg: &str) -> DbError {
        Self::new(ErrorKind::Deadlock, msg)
    }

    pub fn resource_exhausted(msg: &str) -> DbError {
        Self::new(ErrorKind::ResourceExhausted, msg)
    }

    pub fn not_found(msg: &str) -> DbError {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn storage(msg: &str) -> DbError {
        Self::new(ErrorKind::Storage, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether the caller is expected to abort the whole transaction.
    pub fn is_transaction_aborted(&self) -> bool {
        self.kind == ErrorKind::Deadlock
    }

    pub fn show_backtrace(&self) {
        let bt = Backtrace::new();
        error!("msg: [{}], backtrace: {:?}", self, bt);
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.details)
    }
}

impl Error for DbError {
    fn description(&self) -> &str {
        &self.details
    }
}

impl From<io::Error> for DbError {
    fn from(e: io::Error) -> Self {
        DbError::new(ErrorKind::Io, &e.to_string())
    }
}
