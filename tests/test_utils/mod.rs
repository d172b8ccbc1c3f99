mod memory_file;
mod setup;

pub use memory_file::*;
pub use setup::*;
