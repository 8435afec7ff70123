//! In-memory driver / 内存存储驱动

mod driver;
mod factory;

pub use driver::{MemoryDriver, DEFAULT_PAGE_SIZE};
pub use factory::MemoryDriverFactory;
