use std::sync::Arc;

use pagelock_db::{
    types::DbResult, utils::init_log, BufferPool, Config, DbFile, HeapFile, LockConfig, Schema,
    Transaction, Tuple,
};
use tempfile::TempDir;

/// # Conduct the initialization
///
/// - Setting up log configurations.
pub fn setup() {
    init_log();
}

/// A buffer pool with a short lock retry budget, so that a broken test
/// fails quickly instead of hanging.
pub fn new_buffer_pool(capacity: usize) -> BufferPool {
    let config = Config {
        pool_capacity: capacity,
        lock: LockConfig {
            max_retries: 200,
            ..LockConfig::default()
        },
    };
    BufferPool::new(&config)
}

/// Create an empty heap table in a fresh temporary directory and register
/// it in the buffer pool. Keep the directory alive as long as the table is
/// used.
pub fn new_heap_table(buffer_pool: &BufferPool, columns: usize) -> (Arc<HeapFile>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let table = open_heap_table(buffer_pool, &dir, "table.db", columns);
    (table, dir)
}

pub fn open_heap_table(
    buffer_pool: &BufferPool,
    dir: &TempDir,
    name: &str,
    columns: usize,
) -> Arc<HeapFile> {
    let table = Arc::new(HeapFile::new(dir.path().join(name), &Schema::new(columns)).unwrap());
    buffer_pool.add_table(table.clone()).unwrap();
    table
}

pub fn insert_row(buffer_pool: &BufferPool, table: &HeapFile, tx: &Transaction, key: i32) {
    try_insert_row(buffer_pool, table, tx, key).unwrap();
}

pub fn try_insert_row(
    buffer_pool: &BufferPool,
    table: &HeapFile,
    tx: &Transaction,
    key: i32,
) -> DbResult {
    let mut tuple = Tuple::new_int_tuples(key, table.get_schema().fields_count());
    buffer_pool.insert_tuple(tx, table.get_id(), &mut tuple)
}

/// Count the tuples whose first field equals `key`.
pub fn search_key(buffer_pool: &BufferPool, table: &HeapFile, tx: &Transaction, key: i32) -> usize {
    table
        .tuples(buffer_pool, tx)
        .unwrap()
        .iter()
        .filter(|t| t.get_cell(0) == key)
        .count()
}

/// Count the tuples in a new transaction.
pub fn tuples_count(buffer_pool: &BufferPool, table: &HeapFile) -> usize {
    let tx = Transaction::new();
    let count = table.tuples(buffer_pool, &tx).unwrap().len();
    tx.commit(buffer_pool).unwrap();
    count
}
