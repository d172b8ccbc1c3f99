mod test_utils;

use std::{sync::Arc, thread, time::Duration};

use crossbeam::channel;
use pagelock_db::{
    utils::HandyRwLock, BufferPool, DbFile, ErrorKind, Lock, Page, Permission, Transaction, Tuple,
};
use test_utils::{new_buffer_pool, setup, MemoryFile};

fn new_memory_table(buffer_pool: &BufferPool, pages_count: usize) -> Arc<MemoryFile> {
    let table = Arc::new(MemoryFile::new(7, pages_count));
    buffer_pool.add_table(table.clone()).unwrap();
    table
}

/// Stamp the first byte of the page on behalf of the transaction.
fn write_byte(buffer_pool: &BufferPool, tx: &Transaction, table: &MemoryFile, index: u32, v: u8) {
    let page_pod = buffer_pool
        .get_page(tx, &table.pid(index), Permission::ReadWrite)
        .unwrap();
    page_pod.wl().data_mut(tx)[0] = v;
}

fn read_byte(buffer_pool: &BufferPool, tx: &Transaction, table: &MemoryFile, index: u32) -> u8 {
    let page_pod = buffer_pool
        .get_page(tx, &table.pid(index), Permission::ReadOnly)
        .unwrap();
    let v = page_pod.rl().get_page_data()[0];
    v
}

#[test]
fn test_cache_hit_and_lru_reload() {
    setup();
    let buffer_pool = new_buffer_pool(2);
    assert_eq!(buffer_pool.capacity(), 2);
    let table = new_memory_table(&buffer_pool, 3);
    let tx = Transaction::new();

    assert_eq!(read_byte(&buffer_pool, &tx, &table, 0), 0);
    assert_eq!(read_byte(&buffer_pool, &tx, &table, 1), 1);
    assert_eq!(table.reads(), 2);

    // hit
    assert_eq!(read_byte(&buffer_pool, &tx, &table, 1), 1);
    assert_eq!(table.reads(), 2);

    // page 0 is the least recently used one
    assert_eq!(read_byte(&buffer_pool, &tx, &table, 2), 2);
    assert_eq!(table.reads(), 3);
    assert!(!buffer_pool.is_cached(&table.pid(0)));
    assert_eq!(buffer_pool.cached_pages(), vec![table.pid(2), table.pid(1)]);

    // the evicted page comes from storage again
    assert_eq!(read_byte(&buffer_pool, &tx, &table, 0), 0);
    assert_eq!(table.reads(), 4);
    assert_eq!(buffer_pool.cached_pages().len(), 2);

    tx.commit(&buffer_pool).unwrap();
    assert_eq!(table.writes(), 0);
}

#[test]
fn test_dirty_pages_are_not_evicted() {
    setup();
    let buffer_pool = new_buffer_pool(2);
    let table = new_memory_table(&buffer_pool, 3);
    let tx = Transaction::new();

    write_byte(&buffer_pool, &tx, &table, 0, 100);
    write_byte(&buffer_pool, &tx, &table, 1, 101);

    let err = buffer_pool
        .get_page(&tx, &table.pid(2), Permission::ReadOnly)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert!(buffer_pool.is_cached(&table.pid(0)));
    assert!(buffer_pool.is_cached(&table.pid(1)));
    assert_eq!(buffer_pool.cached_pages().len(), 2);

    // after the commit both pages are clean and may go
    tx.commit(&buffer_pool).unwrap();
    let tx = Transaction::new();
    assert_eq!(read_byte(&buffer_pool, &tx, &table, 2), 2);
    tx.commit(&buffer_pool).unwrap();
}

/// A page handed out for writing stays resident until its transaction
/// completes, even before the first byte changes.
#[test]
fn test_exclusive_page_survives_eviction() {
    setup();
    let buffer_pool = new_buffer_pool(2);
    let table = new_memory_table(&buffer_pool, 3);
    let t1 = Transaction::new();
    let t2 = Transaction::new();

    let page_pod = buffer_pool
        .get_page(&t1, &table.pid(0), Permission::ReadWrite)
        .unwrap();

    // page 0 is the oldest and still clean
    read_byte(&buffer_pool, &t2, &table, 1);
    read_byte(&buffer_pool, &t2, &table, 2);
    assert!(buffer_pool.is_cached(&table.pid(0)));
    assert!(!buffer_pool.is_cached(&table.pid(1)));

    page_pod.wl().data_mut(&t1)[0] = 200;
    assert_eq!(read_byte(&buffer_pool, &t1, &table, 0), 200);
    t1.commit(&buffer_pool).unwrap();
    assert_eq!(table.stored_page(0)[0], 200);
    t2.commit(&buffer_pool).unwrap();
}

#[test]
fn test_exclusive_pages_exhaust_cache() {
    setup();
    let buffer_pool = new_buffer_pool(2);
    let table = new_memory_table(&buffer_pool, 3);
    let t1 = Transaction::new();
    let t2 = Transaction::new();

    for i in 0..2 {
        buffer_pool
            .get_page(&t1, &table.pid(i), Permission::ReadWrite)
            .unwrap();
    }
    let err = buffer_pool
        .get_page(&t2, &table.pid(2), Permission::ReadOnly)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);

    t1.commit(&buffer_pool).unwrap();
    assert_eq!(read_byte(&buffer_pool, &t2, &table, 2), 2);
    t2.commit(&buffer_pool).unwrap();
}

#[test]
fn test_commit_flushes_dirty_pages() {
    setup();
    let buffer_pool = new_buffer_pool(10);
    let table = new_memory_table(&buffer_pool, 3);
    let tx = Transaction::new();

    write_byte(&buffer_pool, &tx, &table, 0, 100);
    write_byte(&buffer_pool, &tx, &table, 2, 102);
    read_byte(&buffer_pool, &tx, &table, 1);
    assert_eq!(table.writes(), 0);

    tx.commit(&buffer_pool).unwrap();

    // only the dirty pages are written
    assert_eq!(table.writes(), 2);
    assert_eq!(table.stored_page(0)[0], 100);
    assert_eq!(table.stored_page(1)[0], 1);
    assert_eq!(table.stored_page(2)[0], 102);

    for i in 0..3 {
        let pid = table.pid(i);
        assert!(!buffer_pool.holds_lock(&tx, &pid));
        assert!(buffer_pool.lock_manager().records(&pid).is_empty());
    }
    assert!(buffer_pool.lock_manager().related_pages(&tx).is_empty());

    // committed pages stay resident and clean
    let tx = Transaction::new();
    let page_pod = buffer_pool
        .get_page(&tx, &table.pid(0), Permission::ReadOnly)
        .unwrap();
    assert!(page_pod.rl().is_dirty().is_none());
    assert!(page_pod.rl().get_before_image().is_none());
    assert_eq!(page_pod.rl().get_page_data()[0], 100);
    assert_eq!(table.reads(), 3);
}

#[test]
fn test_abort_restores_before_image() {
    setup();
    let buffer_pool = new_buffer_pool(10);
    let table = new_memory_table(&buffer_pool, 2);
    let original = table.stored_page(1);

    let tx = Transaction::new();
    write_byte(&buffer_pool, &tx, &table, 1, 99);
    write_byte(&buffer_pool, &tx, &table, 1, 98);
    tx.abort(&buffer_pool).unwrap();

    assert_eq!(table.writes(), 0);
    assert!(buffer_pool.lock_manager().related_pages(&tx).is_empty());

    let tx = Transaction::new();
    let page_pod = buffer_pool
        .get_page(&tx, &table.pid(1), Permission::ReadOnly)
        .unwrap();
    {
        let page = page_pod.rl();
        assert_eq!(page.get_page_data(), &original[..]);
        assert!(page.is_dirty().is_none());
        assert!(page.get_before_image().is_none());
    }
    tx.commit(&buffer_pool).unwrap();
    assert_eq!(table.stored_page(1), original);
}

/// A page written to storage before its transaction aborts gets its
/// committed bytes back in storage as well.
#[test]
fn test_abort_after_flush() {
    setup();
    let buffer_pool = new_buffer_pool(10);
    let table = new_memory_table(&buffer_pool, 2);
    let original = table.stored_page(0);

    let tx = Transaction::new();
    write_byte(&buffer_pool, &tx, &table, 0, 77);
    buffer_pool.flush_all_pages().unwrap();
    assert_eq!(table.stored_page(0)[0], 77);
    assert_eq!(table.writes(), 1);

    tx.abort(&buffer_pool).unwrap();
    assert_eq!(table.stored_page(0), original);
    assert_eq!(table.writes(), 2);
}

#[test]
fn test_flush_pages_keeps_locks() {
    setup();
    let buffer_pool = new_buffer_pool(10);
    let table = new_memory_table(&buffer_pool, 2);
    let tx = Transaction::new();

    write_byte(&buffer_pool, &tx, &table, 0, 55);
    buffer_pool.flush_pages(&tx).unwrap();

    assert_eq!(table.stored_page(0)[0], 55);
    assert_eq!(
        buffer_pool.lock_manager().lock_mode(&tx, &table.pid(0)),
        Some(Lock::XLock)
    );

    // nothing left to write
    tx.commit(&buffer_pool).unwrap();
    assert_eq!(table.writes(), 1);
}

/// A page marked dirty without a before-image can't be restored, abort
/// drops it so the next access reads the committed bytes.
#[test]
fn test_abort_discards_page_without_before_image() {
    setup();
    let buffer_pool = new_buffer_pool(10);
    let table = new_memory_table(&buffer_pool, 1);

    let tx = Transaction::new();
    let page_pod = buffer_pool
        .get_page(&tx, &table.pid(0), Permission::ReadWrite)
        .unwrap();
    page_pod.wl().mark_dirty(true, &tx);
    tx.abort(&buffer_pool).unwrap();

    assert!(!buffer_pool.is_cached(&table.pid(0)));
    let tx = Transaction::new();
    read_byte(&buffer_pool, &tx, &table, 0);
    assert_eq!(table.reads(), 2);
    tx.commit(&buffer_pool).unwrap();
}

#[test]
fn test_discard_page() {
    setup();
    let buffer_pool = new_buffer_pool(10);
    let table = new_memory_table(&buffer_pool, 1);
    let tx = Transaction::new();

    read_byte(&buffer_pool, &tx, &table, 0);
    buffer_pool.discard_page(&table.pid(0));
    assert!(!buffer_pool.is_cached(&table.pid(0)));
    // discarding doesn't release locks
    assert!(buffer_pool.holds_lock(&tx, &table.pid(0)));

    read_byte(&buffer_pool, &tx, &table, 0);
    assert_eq!(table.reads(), 2);
    tx.commit(&buffer_pool).unwrap();
}

#[test]
fn test_duplicate_table_id() {
    setup();
    let buffer_pool = new_buffer_pool(10);
    let table = new_memory_table(&buffer_pool, 1);

    let err = buffer_pool
        .add_table(Arc::new(MemoryFile::new(7, 5)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    // the first registration is kept
    let registered = buffer_pool.get_table(7).unwrap();
    assert_eq!(registered.num_pages().unwrap(), 1);
    assert_eq!(table.num_pages().unwrap(), 1);
}

#[test]
fn test_missing_table() {
    setup();
    let buffer_pool = new_buffer_pool(10);
    let tx = Transaction::new();

    let err = buffer_pool
        .get_page(&tx, &pagelock_db::PageId::new(404, 0), Permission::ReadOnly)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(buffer_pool.get_table(404).is_err());
}

#[test]
fn test_insert_marks_page_dirty() {
    setup();
    let buffer_pool = new_buffer_pool(10);
    let table = new_memory_table(&buffer_pool, 1);
    let tx = Transaction::new();

    buffer_pool
        .insert_tuple(&tx, 7, &mut Tuple::new(vec![42]))
        .unwrap();

    let page_pod = buffer_pool
        .get_page(&tx, &table.pid(0), Permission::ReadOnly)
        .unwrap();
    assert_eq!(page_pod.rl().is_dirty(), Some(tx.get_id()));
    assert_eq!(page_pod.rl().get_page_data()[0], 42);

    tx.commit(&buffer_pool).unwrap();
    assert_eq!(table.stored_page(0)[0], 42);
}

#[test]
#[should_panic]
fn test_modification_without_exclusive_lock() {
    setup();
    let buffer_pool = new_buffer_pool(10);
    buffer_pool
        .add_table(Arc::new(MemoryFile::new_sloppy(8, 1)))
        .unwrap();
    let tx = Transaction::new();

    let _ = buffer_pool.insert_tuple(&tx, 8, &mut Tuple::new(vec![1]));
}

/// S, S, then X from one of the readers: the upgrade waits until the other
/// reader is done.
#[test]
fn test_upgrade_waits_for_reader() {
    setup();
    let buffer_pool = Arc::new(new_buffer_pool(10));
    let table = new_memory_table(&buffer_pool, 1);
    let t1 = Transaction::new();
    let t2 = Transaction::new();

    read_byte(&buffer_pool, &t1, &table, 0);
    read_byte(&buffer_pool, &t2, &table, 0);

    let (sender, receiver) = channel::unbounded();
    {
        let buffer_pool = buffer_pool.clone();
        let table = table.clone();
        let t1 = t1.clone();
        thread::spawn(move || {
            write_byte(&buffer_pool, &t1, &table, 0, 9);
            sender.send(()).unwrap();
        });
    }

    assert!(receiver.recv_timeout(Duration::from_millis(200)).is_err());
    t2.commit(&buffer_pool).unwrap();
    receiver.recv_timeout(Duration::from_secs(2)).unwrap();

    t1.commit(&buffer_pool).unwrap();
    assert_eq!(table.stored_page(0)[0], 9);
}

#[test]
fn test_release_page() {
    setup();
    let buffer_pool = new_buffer_pool(10);
    let table = new_memory_table(&buffer_pool, 1);
    let t1 = Transaction::new();
    let t2 = Transaction::new();

    read_byte(&buffer_pool, &t1, &table, 0);
    buffer_pool.release_page(&t1, &table.pid(0));
    assert!(!buffer_pool.holds_lock(&t1, &table.pid(0)));

    // t2 doesn't have to wait
    write_byte(&buffer_pool, &t2, &table, 0, 3);
    t2.commit(&buffer_pool).unwrap();
    t1.commit(&buffer_pool).unwrap();
}

#[test]
fn test_page_size() {
    setup();
    assert_eq!(Page::empty_page_data().len(), pagelock_db::config::page_size());
}
