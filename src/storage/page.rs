use std::fmt;

use super::page_id::PageId;
use crate::{
    config::page_size,
    transaction::{Transaction, TransactionID},
};

/// A fixed-size page of bytes, as it is held by the buffer pool.
///
/// The page remembers which transaction dirtied it, and a snapshot of its
/// bytes taken right before that transaction wrote it for the first time (the
/// before-image). The before-image is what an abort restores.
pub struct Page {
    pid: PageId,
    data: Vec<u8>,

    dirty: Option<TransactionID>,
    before_image: Option<Vec<u8>>,

    // the page went to storage while it still carried uncommitted bytes
    stolen: bool,
}

impl Page {
    pub fn new(pid: &PageId, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            page_size(),
            "page {} has {} bytes, page size is {}",
            pid,
            data.len(),
            page_size(),
        );

        Self {
            pid: *pid,
            data,
            dirty: None,
            before_image: None,
            stolen: false,
        }
    }

    pub fn empty_page_data() -> Vec<u8> {
        vec![0; page_size()]
    }

    pub fn get_pid(&self) -> PageId {
        self.pid
    }

    pub fn get_page_data(&self) -> &[u8] {
        &self.data
    }

    /// Writable view of the bytes on behalf of `tx`.
    ///
    /// The first write of a transaction takes the before-image, every write
    /// marks the page dirty.
    pub fn data_mut(&mut self, tx: &Transaction) -> &mut [u8] {
        self.set_before_image();
        self.mark_dirty(true, tx);
        &mut self.data
    }

    /// Return the transaction that dirtied the page, None if the page is
    /// clean.
    pub fn is_dirty(&self) -> Option<TransactionID> {
        self.dirty
    }

    pub fn mark_dirty(&mut self, dirty: bool, tx: &Transaction) {
        if dirty {
            self.dirty = Some(tx.get_id());
        } else {
            self.dirty = None;
        }
    }

    pub fn get_before_image(&self) -> Option<&[u8]> {
        self.before_image.as_deref()
    }

    /// Snapshot the current bytes, at most once until the image is consumed
    /// or cleared.
    pub(crate) fn set_before_image(&mut self) {
        if self.before_image.is_none() {
            self.before_image = Some(self.data.clone());
        }
    }

    pub(crate) fn clear_before_image(&mut self) {
        self.before_image = None;
        self.stolen = false;
    }

    /// Put the before-image back in place and make the page clean.
    ///
    /// Return false if there was no before-image to restore.
    pub(crate) fn restore_before_image(&mut self) -> bool {
        match self.before_image.take() {
            Some(image) => {
                self.data = image;
                self.dirty = None;
                true
            }
            None => false,
        }
    }

    /// The bytes have been written to storage.
    pub(crate) fn mark_flushed(&mut self) {
        self.dirty = None;
        if self.before_image.is_some() {
            self.stolen = true;
        }
    }

    pub(crate) fn is_stolen(&self) -> bool {
        self.stolen
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let head = &self.data[..self.data.len().min(16)];
        write!(
            f,
            "Page {{ pid: {}, dirty: {:?}, has_before_image: {}, head: {} }}",
            self.pid,
            self.dirty,
            self.before_image.is_some(),
            hex::encode(head),
        )
    }
}
