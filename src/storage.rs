pub mod buffer_pool;
pub mod file;
pub mod heap_file;
pub mod heap_page;
pub mod page;
pub mod page_cache;
pub mod page_id;
pub mod tuple;
