use std::{
    collections::hash_map::DefaultHasher,
    fs::{File, OpenOptions},
    hash::{Hash, Hasher},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    sync::{Mutex, MutexGuard},
};

use log::debug;

use super::{
    buffer_pool::BufferPool,
    file::DbFile,
    heap_page::HeapPageLayout,
    page::Page,
    page_id::PageId,
    tuple::{Schema, Tuple},
};
use crate::{
    config::page_size,
    error::DbError,
    transaction::{Permission, Transaction},
    types::{DbResult, Pod},
    utils::HandyRwLock,
};

/// A table stored as an unordered sequence of heap pages in one file.
pub struct HeapFile {
    id: u32,
    schema: Schema,
    layout: HeapPageLayout,

    // also serializes the allocation of new pages
    file: Mutex<File>,
}

impl HeapFile {
    /// Open (or create) the file at `path`. The table id is derived from
    /// the path.
    pub fn new<P: AsRef<Path>>(path: P, schema: &Schema) -> DbResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        let id = hasher.finish() as u32;

        debug!("open heap file {:?} as table {}", path, id);
        Ok(Self {
            id,
            schema: *schema,
            layout: HeapPageLayout::new(schema),
            file: Mutex::new(file),
        })
    }

    pub fn get_schema(&self) -> &Schema {
        &self.schema
    }

    pub fn get_layout(&self) -> &HeapPageLayout {
        &self.layout
    }

    fn get_file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap()
    }

    fn pages_count(file: &File) -> DbResult<usize> {
        Ok(file.metadata()?.len() as usize / page_size())
    }

    fn write_at(file: &mut File, page_index: u32, data: &[u8]) -> DbResult {
        let start_pos = page_index as u64 * page_size() as u64;
        file.seek(SeekFrom::Start(start_pos))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    /// Append an empty page to the file and return its id.
    fn allocate_page(&self) -> DbResult<PageId> {
        let mut file = self.get_file();
        let page_index = Self::pages_count(&file)? as u32;
        Self::write_at(&mut file, page_index, &Page::empty_page_data())?;

        let pid = PageId::new(self.id, page_index);
        debug!("allocated {}", pid);
        Ok(pid)
    }

    /// Read every tuple of the table under shared locks.
    pub fn tuples(&self, buffer_pool: &BufferPool, tx: &Transaction) -> DbResult<Vec<Tuple>> {
        let mut tuples = Vec::new();
        for page_index in 0..self.num_pages()? {
            let pid = PageId::new(self.id, page_index as u32);
            let page_pod = buffer_pool.get_page(tx, &pid, Permission::ReadOnly)?;
            tuples.append(&mut self.layout.tuples(&page_pod.rl()));
        }
        Ok(tuples)
    }
}

impl DbFile for HeapFile {
    fn get_id(&self) -> u32 {
        self.id
    }

    fn read_page(&self, pid: &PageId) -> DbResult<Page> {
        let mut file = self.get_file();
        if pid.get_page_index() as usize >= Self::pages_count(&file)? {
            return Err(DbError::not_found(&format!(
                "{} is beyond the end of table {}",
                pid, self.id
            )));
        }

        let start_pos = pid.get_page_index() as u64 * page_size() as u64;
        file.seek(SeekFrom::Start(start_pos))?;

        let mut buf: Vec<u8> = vec![0; page_size()];
        file.read_exact(&mut buf)?;
        Ok(Page::new(pid, buf))
    }

    fn write_page(&self, page: &Page) -> DbResult {
        let pid = page.get_pid();
        Self::write_at(&mut self.get_file(), pid.get_page_index(), page.get_page_data())
    }

    fn num_pages(&self) -> DbResult<usize> {
        Self::pages_count(&self.get_file())
    }

    fn insert_tuple(
        &self,
        buffer_pool: &BufferPool,
        tx: &Transaction,
        tuple: &mut Tuple,
    ) -> DbResult<Vec<Pod<Page>>> {
        // look for a page with an empty slot, inspecting pages under S-Lock
        for page_index in 0..self.num_pages()? {
            let pid = PageId::new(self.id, page_index as u32);
            let held_before = buffer_pool.holds_lock(tx, &pid);

            let page_pod = buffer_pool.get_page(tx, &pid, Permission::ReadOnly)?;
            let has_room = self.layout.empty_slots_count(&page_pod.rl()) > 0;
            if !has_room {
                if !held_before {
                    buffer_pool.release_page(tx, &pid);
                }
                continue;
            }

            // the S-Lock kept since the check stops anyone else from filling
            // the page before the upgrade
            let page_pod = buffer_pool.get_page(tx, &pid, Permission::ReadWrite)?;
            self.layout.insert_tuple(&mut page_pod.wl(), tx, tuple)?;
            return Ok(vec![page_pod]);
        }

        // all pages are full, append a new one
        let pid = self.allocate_page()?;
        let page_pod = buffer_pool.get_page(tx, &pid, Permission::ReadWrite)?;
        self.layout.insert_tuple(&mut page_pod.wl(), tx, tuple)?;
        Ok(vec![page_pod])
    }

    fn delete_tuple(
        &self,
        buffer_pool: &BufferPool,
        tx: &Transaction,
        tuple: &Tuple,
    ) -> DbResult<Vec<Pod<Page>>> {
        let rid = match tuple.get_record_id() {
            Some(rid) => rid,
            None => return Err(DbError::storage(&format!("tuple {:?} has no record id", tuple))),
        };

        if rid.pid.get_table_id() != self.id {
            return Err(DbError::storage(&format!(
                "tuple {:?} is not a member of table {}",
                tuple, self.id
            )));
        }

        let page_pod = buffer_pool.get_page(tx, &rid.pid, Permission::ReadWrite)?;
        self.layout.delete_tuple(&mut page_pod.wl(), tx, tuple)?;
        Ok(vec![page_pod])
    }
}
