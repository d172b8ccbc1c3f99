use bit_vec::BitVec;

use super::{
    page::Page,
    tuple::{RecordId, Schema, Tuple},
};
use crate::{config::page_size, error::DbError, transaction::Transaction, types::DbResult};

/// Slotted layout of a heap page.
///
/// A page starts with a header bitmap, one bit per slot (true means
/// occupied), followed by the fixed-size tuple slots.
#[derive(Debug, Clone)]
pub struct HeapPageLayout {
    schema: Schema,
    slot_count: usize,
    header_size: usize,
}

impl HeapPageLayout {
    pub fn new(schema: &Schema) -> Self {
        // each tuple takes its own bytes plus one header bit
        let bits_per_tuple_including_header = schema.get_size() * 8 + 1;
        let slot_count = page_size() * 8 / bits_per_tuple_including_header;
        let header_size = (slot_count + 7) / 8;

        Self {
            schema: *schema,
            slot_count,
            header_size,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    fn header(&self, page: &Page) -> BitVec {
        BitVec::from_bytes(&page.get_page_data()[..self.header_size])
    }

    fn slot_offset(&self, slot: usize) -> usize {
        self.header_size + slot * self.schema.get_size()
    }

    pub fn is_slot_used(&self, page: &Page, slot: usize) -> bool {
        slot < self.slot_count && self.header(page)[slot]
    }

    pub fn empty_slots_count(&self, page: &Page) -> usize {
        let header = self.header(page);
        (0..self.slot_count).filter(|&i| !header[i]).count()
    }

    /// All tuples stored in the page, with their record ids.
    pub fn tuples(&self, page: &Page) -> Vec<Tuple> {
        let header = self.header(page);
        let data = page.get_page_data();

        (0..self.slot_count)
            .filter(|&i| header[i])
            .map(|i| {
                let start = self.slot_offset(i);
                let mut t = Tuple::from_bytes(&self.schema, &data[start..start + self.schema.get_size()]);
                t.set_record_id(Some(RecordId::new(page.get_pid(), i)));
                t
            })
            .collect()
    }

    /// Put the tuple into the first empty slot, and set its record id.
    pub fn insert_tuple(&self, page: &mut Page, tx: &Transaction, tuple: &mut Tuple) -> DbResult {
        if tuple.width() != self.schema.fields_count() {
            return Err(DbError::storage(&format!(
                "tuple {:?} doesn't match schema {:?}",
                tuple, self.schema
            )));
        }

        let mut header = self.header(page);
        let slot = match (0..self.slot_count).find(|&i| !header[i]) {
            Some(slot) => slot,
            None => {
                return Err(DbError::storage(&format!(
                    "no empty slot in page {}",
                    page.get_pid()
                )))
            }
        };

        header.set(slot, true);
        let start = self.slot_offset(slot);
        let pid = page.get_pid();

        let data = page.data_mut(tx);
        data[..self.header_size].copy_from_slice(&header.to_bytes());
        data[start..start + self.schema.get_size()].copy_from_slice(&tuple.to_bytes());

        tuple.set_record_id(Some(RecordId::new(pid, slot)));
        Ok(())
    }

    /// Mark the slot of the tuple as empty.
    pub fn delete_tuple(&self, page: &mut Page, tx: &Transaction, tuple: &Tuple) -> DbResult {
        let rid = match tuple.get_record_id() {
            Some(rid) => rid,
            None => return Err(DbError::storage(&format!("tuple {:?} has no record id", tuple))),
        };

        if rid.pid != page.get_pid() {
            return Err(DbError::storage(&format!(
                "tuple {:?} is not on page {}",
                tuple,
                page.get_pid()
            )));
        }

        if !self.is_slot_used(page, rid.slot) {
            return Err(DbError::storage(&format!(
                "slot {} of page {} is already empty",
                rid.slot, rid.pid
            )));
        }

        let mut header = self.header(page);
        header.set(rid.slot, false);
        page.data_mut(tx)[..self.header_size].copy_from_slice(&header.to_bytes());
        Ok(())
    }
}
