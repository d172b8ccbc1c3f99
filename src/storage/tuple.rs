use std::{convert::TryInto, fmt};

use itertools::Itertools;

use super::page_id::PageId;

const INT_SIZE: usize = 4;

/// Layout of the tuples of a table. Every field is a 32-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    fields: usize,
}

impl Schema {
    pub fn new(fields: usize) -> Self {
        assert!(fields > 0, "a schema needs at least one field");
        Self { fields }
    }

    pub fn fields_count(&self) -> usize {
        self.fields
    }

    /// Size of a tuple in bytes.
    pub fn get_size(&self) -> usize {
        self.fields * INT_SIZE
    }
}

/// Location of a tuple: the page and the slot inside the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub pid: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(pid: PageId, slot: usize) -> Self {
        Self { pid, slot }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Tuple {
    cells: Vec<i32>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(cells: Vec<i32>) -> Self {
        Self {
            cells,
            record_id: None,
        }
    }

    /// A tuple with `width` fields, all of them set to `value`.
    pub fn new_int_tuples(value: i32, width: usize) -> Self {
        Self::new(vec![value; width])
    }

    pub fn from_bytes(schema: &Schema, bytes: &[u8]) -> Self {
        let cells = bytes[..schema.get_size()]
            .chunks_exact(INT_SIZE)
            .map(|chunk| i32::from_le_bytes(chunk.try_into().unwrap()))
            .collect();
        Self::new(cells)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.cells.iter().flat_map(|c| c.to_le_bytes().to_vec()).collect()
    }

    pub fn get_cell(&self, i: usize) -> i32 {
        self.cells[i]
    }

    pub fn get_cells(&self) -> &[i32] {
        &self.cells
    }

    pub fn width(&self) -> usize {
        self.cells.len()
    }

    pub fn get_record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.cells.iter().join(" "))
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.record_id {
            Some(rid) => write!(f, "<{}> @ {}#{}", self, rid.pid, rid.slot),
            None => write!(f, "<{}>", self),
        }
    }
}
