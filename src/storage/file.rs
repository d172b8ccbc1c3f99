use super::{buffer_pool::BufferPool, page::Page, page_id::PageId, tuple::Tuple};
use crate::{
    transaction::Transaction,
    types::{DbResult, Pod},
};

/// The storage side of a table, as seen by the buffer pool.
///
/// `read_page` and `write_page` go straight to storage, caching is the
/// business of the buffer pool. The tuple operations fetch their pages
/// through the buffer pool (so they are locked for the transaction) and
/// return the pages they modified.
pub trait DbFile: Send + Sync {
    fn get_id(&self) -> u32;

    fn read_page(&self, pid: &PageId) -> DbResult<Page>;

    fn write_page(&self, page: &Page) -> DbResult;

    fn num_pages(&self) -> DbResult<usize>;

    fn insert_tuple(
        &self,
        buffer_pool: &BufferPool,
        tx: &Transaction,
        tuple: &mut Tuple,
    ) -> DbResult<Vec<Pod<Page>>>;

    fn delete_tuple(
        &self,
        buffer_pool: &BufferPool,
        tx: &Transaction,
        tuple: &Tuple,
    ) -> DbResult<Vec<Pod<Page>>>;
}
