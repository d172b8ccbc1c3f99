use std::fmt;

/// PageId identifies a unique page: the table it belongs to and its
/// position in the table's file.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table_id: u32,

    /// page_index represents the position of the page in
    /// the table, start from 0
    pub page_index: u32,
}

impl PageId {
    pub fn new(table_id: u32, page_index: u32) -> Self {
        Self {
            table_id,
            page_index,
        }
    }

    pub fn get_table_id(&self) -> u32 {
        self.table_id
    }

    pub fn get_page_index(&self) -> u32 {
        self.page_index
    }

    pub fn get_short_repr(&self) -> String {
        format!("{}_{}", self.table_id, self.page_index)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "page_{}_{}", self.table_id, self.page_index)
    }
}

impl fmt::Debug for PageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
