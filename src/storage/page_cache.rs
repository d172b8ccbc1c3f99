use linked_hash_map::LinkedHashMap;
use log::{debug, error};

use super::{page::Page, page_id::PageId};
use crate::{error::DbError, types::{DbResult, Pod}, utils::lock_state};

type Key = PageId;

/// A fixed capacity map from page id to page, with least-recently-used
/// eviction that never picks a dirty page.
///
/// The map keeps its entries in recency order, the front is the least
/// recently used one.
pub struct PageCache {
    capacity: usize,
    buffer: LinkedHashMap<Key, Pod<Page>>,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "page cache capacity must be positive");

        Self {
            capacity,
            buffer: LinkedHashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Return the cached page and mark it as most recently used. Doesn't
    /// touch storage.
    pub fn get(&mut self, pid: &Key) -> Option<Pod<Page>> {
        self.buffer.get_refresh(pid).map(|page| page.clone())
    }

    /// Like `get`, but leaves the recency order alone.
    pub fn peek(&self, pid: &Key) -> Option<Pod<Page>> {
        self.buffer.get(pid).cloned()
    }

    pub fn contains(&self, pid: &Key) -> bool {
        self.buffer.contains_key(pid)
    }

    /// Insert or replace the page and mark it as most recently used.
    ///
    /// When a new page doesn't fit, a victim is evicted before the
    /// insertion and returned. Pages for which `pinned` returns true are
    /// never chosen. Fails if every resident page is dirty or pinned.
    pub fn put<F>(
        &mut self,
        pid: &Key,
        page: Pod<Page>,
        pinned: F,
    ) -> DbResult<Option<(Key, Pod<Page>)>>
    where
        F: Fn(&Key) -> bool,
    {
        let mut evicted = None;
        if !self.buffer.contains_key(pid) && self.buffer.len() >= self.capacity {
            evicted = Some(self.evict(pinned)?);
        }

        // insert moves an existing key to the back as well
        self.buffer.insert(*pid, page);
        Ok(evicted)
    }

    /// Detach the page from the cache.
    pub fn remove(&mut self, pid: &Key) -> Option<Pod<Page>> {
        self.buffer.remove(pid)
    }

    /// The least recently used clean page.
    ///
    /// A page whose lock is held for writing is being mutated by its
    /// exclusive holder, it is skipped like a dirty one. So is a page that
    /// went to storage with uncommitted bytes, its before-image is still
    /// needed by an abort.
    fn next_victim<F: Fn(&Key) -> bool>(&self, pinned: F) -> Option<Key> {
        for (pid, page_pod) in self.buffer.iter() {
            if pinned(pid) {
                continue;
            }
            match page_pod.try_read() {
                Ok(page) => {
                    if page.is_dirty().is_none() && !page.is_stolen() {
                        return Some(*pid);
                    }
                }
                Err(_) => {
                    debug!("skip busy page {}, state: {}", pid, lock_state(page_pod.as_ref()));
                }
            }
        }
        None
    }

    fn evict<F: Fn(&Key) -> bool>(&mut self, pinned: F) -> DbResult<(Key, Pod<Page>)> {
        if let Some(pid) = self.next_victim(pinned) {
            if let Some(page) = self.buffer.remove(&pid) {
                debug!("evict page {}", pid);
                return Ok((pid, page));
            }
        }

        let err = DbError::resource_exhausted(&format!(
            "all {} pages are dirty or pinned, no one to evict",
            self.buffer.len()
        ));
        error!("{}", err);
        Err(err)
    }

    /// Resident entries, most recently used first (the oldest comes last).
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Pod<Page>)> {
        self.buffer.iter().rev()
    }

    /// Resident page ids, most recently used first.
    pub fn keys(&self) -> Vec<Key> {
        self.iter().map(|(pid, _)| *pid).collect()
    }
}
