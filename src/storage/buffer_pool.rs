use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use log::{debug, info};

use super::{
    file::DbFile,
    page::Page,
    page_cache::PageCache,
    page_id::PageId,
    tuple::Tuple,
};
use crate::{
    config::Config,
    error::DbError,
    transaction::{Lock, LockManager, Permission, Transaction},
    types::{DbResult, Pod, ResultPod},
    utils::HandyRwLock,
};

/// The page cache shared by all transactions.
///
/// Every page access goes through `get_page`, which takes the page lock
/// for the transaction before the page is looked up, and loads the page from
/// its table on a cache miss. Locks are held until the transaction completes
/// (strict two-phase locking); at that point the pages of the transaction are
/// either written to storage (commit) or restored from their before-images
/// (abort).
pub struct BufferPool {
    page_cache: Mutex<PageCache>,
    lock_manager: LockManager,
    tables: RwLock<HashMap<u32, Arc<dyn DbFile>>>,
}

impl BufferPool {
    pub fn new(config: &Config) -> Self {
        Self {
            page_cache: Mutex::new(PageCache::new(config.pool_capacity)),
            lock_manager: LockManager::new(config.lock.clone()),
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(&Config::with_capacity(capacity))
    }

    fn cache(&self) -> MutexGuard<'_, PageCache> {
        self.page_cache.lock().unwrap()
    }

    pub fn capacity(&self) -> usize {
        self.cache().capacity()
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    /// Register a table. Fails if another table already uses its id.
    pub fn add_table(&self, file: Arc<dyn DbFile>) -> DbResult {
        let table_id = file.get_id();
        let mut tables = self.tables.wl();
        if tables.contains_key(&table_id) {
            return Err(DbError::storage(&format!(
                "table id {} is already registered",
                table_id
            )));
        }
        tables.insert(table_id, file);
        debug!("table {} registered", table_id);
        Ok(())
    }

    pub fn get_table(&self, table_id: u32) -> DbResult<Arc<dyn DbFile>> {
        match self.tables.rl().get(&table_id) {
            Some(file) => Ok(file.clone()),
            None => Err(DbError::not_found(&format!("table {} not found", table_id))),
        }
    }

    /// Retrieve the specified page with the associated permissions.
    /// Will acquire a lock and may block if that lock is held by
    /// another transaction.
    ///
    /// The retrieved page should be looked up in the buffer pool.  If
    /// it is present, it should be returned.  If it is not
    /// present, it should be added to the buffer pool and
    /// returned.  If there is insufficient space in the buffer
    /// pool, a page should be evicted and the new page
    /// should be added in its place.
    pub fn get_page(&self, tx: &Transaction, pid: &PageId, perm: Permission) -> ResultPod<Page> {
        self.lock_manager.acquire(tx, pid, perm)?;

        if let Some(page) = self.cache().get(pid) {
            return Ok(page);
        }

        // the cache is not locked during the read
        let table = self.get_table(pid.get_table_id())?;
        let page = table.read_page(pid)?;
        debug!("{} loaded {} from storage", tx, pid);

        let mut cache = self.cache();
        // another reader may have loaded it in the meantime
        if let Some(page) = cache.get(pid) {
            return Ok(page);
        }

        let page_pod = Arc::new(RwLock::new(page));
        cache.put(pid, page_pod.clone(), |p| self.is_pinned(p))?;
        Ok(page_pod)
    }

    // An X-Locked page may be written through a handle its holder already
    // has, so it stays resident until the transaction completes.
    fn is_pinned(&self, pid: &PageId) -> bool {
        self.lock_manager.is_exclusively_locked(pid)
    }

    pub fn is_cached(&self, pid: &PageId) -> bool {
        self.cache().contains(pid)
    }

    /// Resident page ids, most recently used first.
    pub fn cached_pages(&self) -> Vec<PageId> {
        self.cache().keys()
    }

    /// Add a tuple to the table on behalf of the transaction. The pages
    /// touched by the insertion are marked dirty and stay in the cache until
    /// the transaction completes.
    pub fn insert_tuple(&self, tx: &Transaction, table_id: u32, tuple: &mut Tuple) -> DbResult {
        let table = self.get_table(table_id)?;
        let pages = table.insert_tuple(self, tx, tuple)?;
        self.hold_dirty_pages(tx, pages)
    }

    /// Remove the tuple from its table, the tuple is located by its record
    /// id.
    pub fn delete_tuple(&self, tx: &Transaction, tuple: &Tuple) -> DbResult {
        let rid = match tuple.get_record_id() {
            Some(rid) => rid,
            None => return Err(DbError::storage(&format!("tuple {:?} has no record id", tuple))),
        };

        let table = self.get_table(rid.pid.get_table_id())?;
        let pages = table.delete_tuple(self, tx, tuple)?;
        self.hold_dirty_pages(tx, pages)
    }

    // Mark the modified pages dirty and make sure they are resident (one of
    // them may have been evicted while it was still clean).
    fn hold_dirty_pages(&self, tx: &Transaction, pages: Vec<Pod<Page>>) -> DbResult {
        for page_pod in pages {
            let pid = {
                let mut page = page_pod.wl();
                let pid = page.get_pid();
                if self.lock_manager.lock_mode(tx, &pid) != Some(Lock::XLock) {
                    panic!("{} modified {} without holding its X-Lock", tx, pid);
                }
                page.mark_dirty(true, tx);
                pid
            };
            self.cache().put(&pid, page_pod, |p| self.is_pinned(p))?;
        }
        Ok(())
    }

    /// Write the content of a specific page to storage, if it is dirty.
    pub fn flush_page(&self, pid: &PageId) -> DbResult {
        let page_pod = match self.cache().peek(pid) {
            Some(page_pod) => page_pod,
            None => return Ok(()),
        };

        let mut page = page_pod.wl();
        if page.is_dirty().is_none() {
            return Ok(());
        }

        let table = self.get_table(pid.get_table_id())?;
        table.write_page(&page)?;
        page.mark_flushed();
        debug!("flushed page {}", pid);
        Ok(())
    }

    /// Write all pages of the specified transaction to storage. Locks are
    /// kept.
    pub fn flush_pages(&self, tx: &Transaction) -> DbResult {
        for pid in self.lock_manager.related_pages(tx) {
            self.flush_page(&pid)?;
        }
        Ok(())
    }

    /// Flush all dirty pages to storage.
    ///
    /// Pages of running transactions are written too, an abort writes their
    /// before-images back afterwards.
    pub fn flush_all_pages(&self) -> DbResult {
        let keys = self.cache().keys();
        for pid in keys {
            self.flush_page(&pid)?;
        }
        Ok(())
    }

    /// Remove the specific page id from the buffer pool without writing it
    /// to storage. The next access reads it from storage again.
    pub fn discard_page(&self, pid: &PageId) {
        if self.cache().remove(pid).is_some() {
            debug!("discarded page {}", pid);
        }
    }

    /// Release the lock the transaction holds on the page before it
    /// completes. Only safe for pages the transaction hasn't modified.
    pub fn release_page(&self, tx: &Transaction, pid: &PageId) {
        self.lock_manager.release(tx, pid);
    }

    pub fn holds_lock(&self, tx: &Transaction, pid: &PageId) -> bool {
        self.lock_manager.holds_lock(tx, pid)
    }

    /// Commit or abort the transaction, then release all of its locks.
    ///
    /// Commit writes every dirty page of the transaction to storage. Abort
    /// puts the before-image back into every page the transaction modified,
    /// or drops the page from the cache when there is no before-image.
    pub fn transaction_complete(&self, tx: &Transaction, commit: bool) -> DbResult {
        let pages = self.lock_manager.related_pages(tx);

        if commit {
            for pid in &pages {
                self.commit_page(pid)?;
            }
        } else {
            for pid in &pages {
                self.rollback_page(tx, pid)?;
            }
        }

        self.lock_manager.complete_transaction(tx);

        if commit {
            info!("{} committed, {} pages", tx, pages.len());
        } else {
            info!("{} aborted, {} pages", tx, pages.len());
        }
        Ok(())
    }

    fn commit_page(&self, pid: &PageId) -> DbResult {
        self.flush_page(pid)?;

        // the committed bytes are the base of the next transaction
        let page_pod = self.cache().peek(pid);
        if let Some(page_pod) = page_pod {
            page_pod.wl().clear_before_image();
        }
        Ok(())
    }

    fn rollback_page(&self, tx: &Transaction, pid: &PageId) -> DbResult {
        let page_pod = match self.cache().peek(pid) {
            Some(page_pod) => page_pod,
            None => return Ok(()),
        };

        let mut page = page_pod.wl();
        if let Some(dirty_tx) = page.is_dirty() {
            if dirty_tx != tx.get_id() {
                // not our change to undo
                return Ok(());
            }
        }

        let stolen = page.is_stolen();
        if page.restore_before_image() {
            if stolen {
                // storage holds the uncommitted bytes
                let table = self.get_table(pid.get_table_id())?;
                table.write_page(&page)?;
            }
            page.clear_before_image();
            debug!("{} restored {} from its before-image", tx, pid);
        } else if page.is_dirty().is_some() {
            drop(page);
            self.discard_page(pid);
        }
        Ok(())
    }
}
