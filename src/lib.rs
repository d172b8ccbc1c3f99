pub mod config;
pub mod error;
pub mod storage;
pub mod transaction;
pub mod types;
pub mod utils;

pub use config::{Config, LockConfig};
pub use error::{DbError, ErrorKind};
pub use storage::{
    buffer_pool::BufferPool,
    file::DbFile,
    heap_file::HeapFile,
    page::Page,
    page_cache::PageCache,
    page_id::PageId,
    tuple::{RecordId, Schema, Tuple},
};
pub use transaction::{Lock, LockManager, Permission, Transaction};
