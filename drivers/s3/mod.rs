//! S3 compatible object storage driver / S3对象存储驱动

mod config;
mod driver;
mod factory;

pub use config::{S3Config, MAX_PAGE_SIZE};
pub use driver::S3Driver;
pub use factory::S3DriverFactory;
