mod file;
mod memory;
mod store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::RandomAccessStore;
pub(crate) use store::round_up_even;
