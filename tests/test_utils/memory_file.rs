use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use pagelock_db::{
    config::page_size, error::DbError, types::DbResult, types::Pod, utils::HandyRwLock,
    BufferPool, DbFile, Page, PageId, Permission, Transaction, Tuple,
};

/// A table kept in memory, it counts the page reads and writes that reach
/// it.
///
/// Its tuples are raw byte stamps: inserting tuple `t` writes the first
/// cell of `t` into the first byte of page 0.
pub struct MemoryFile {
    id: u32,
    pages: Mutex<Vec<Vec<u8>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,

    // the lock taken by `insert_tuple`, anything but ReadWrite breaks the
    // locking protocol
    insert_permission: Permission,
}

impl MemoryFile {
    /// A table with `pages_count` pages, byte 0 of page `i` holds `i`.
    pub fn new(id: u32, pages_count: usize) -> Self {
        let pages = (0..pages_count)
            .map(|i| {
                let mut data = Page::empty_page_data();
                data[0] = i as u8;
                data
            })
            .collect();

        Self {
            id,
            pages: Mutex::new(pages),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            insert_permission: Permission::ReadWrite,
        }
    }

    /// A table that modifies pages it only holds a shared lock on.
    pub fn new_sloppy(id: u32, pages_count: usize) -> Self {
        Self {
            insert_permission: Permission::ReadOnly,
            ..Self::new(id, pages_count)
        }
    }

    pub fn pid(&self, page_index: u32) -> PageId {
        PageId::new(self.id, page_index)
    }

    /// The bytes currently in storage.
    pub fn stored_page(&self, page_index: u32) -> Vec<u8> {
        self.pages.lock().unwrap()[page_index as usize].clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl DbFile for MemoryFile {
    fn get_id(&self) -> u32 {
        self.id
    }

    fn read_page(&self, pid: &PageId) -> DbResult<Page> {
        let pages = self.pages.lock().unwrap();
        match pages.get(pid.get_page_index() as usize) {
            Some(data) => {
                self.reads.fetch_add(1, Ordering::SeqCst);
                Ok(Page::new(pid, data.clone()))
            }
            None => Err(DbError::not_found(&format!("{} doesn't exist", pid))),
        }
    }

    fn write_page(&self, page: &Page) -> DbResult {
        let mut pages = self.pages.lock().unwrap();
        let index = page.get_pid().get_page_index() as usize;
        assert_eq!(page.get_page_data().len(), page_size());
        pages[index] = page.get_page_data().to_vec();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn num_pages(&self) -> DbResult<usize> {
        Ok(self.pages.lock().unwrap().len())
    }

    fn insert_tuple(
        &self,
        buffer_pool: &BufferPool,
        tx: &Transaction,
        tuple: &mut Tuple,
    ) -> DbResult<Vec<Pod<Page>>> {
        let page_pod = buffer_pool.get_page(tx, &self.pid(0), self.insert_permission)?;
        page_pod.wl().data_mut(tx)[0] = tuple.get_cell(0) as u8;
        Ok(vec![page_pod])
    }

    fn delete_tuple(
        &self,
        buffer_pool: &BufferPool,
        tx: &Transaction,
        _tuple: &Tuple,
    ) -> DbResult<Vec<Pod<Page>>> {
        let page_pod = buffer_pool.get_page(tx, &self.pid(0), Permission::ReadWrite)?;
        page_pod.wl().data_mut(tx)[0] = 0;
        Ok(vec![page_pod])
    }
}
