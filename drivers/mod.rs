// Driver package / 驱动包
pub mod local;
pub mod memory;
pub mod s3;

use crate::storage::DriverRegistry;

/// Register all drivers to the registry / 注册所有驱动
pub fn register_all(registry: &DriverRegistry) {
    // Register local driver (using LocalDriverFactory from storage module) / 注册本地驱动
    registry.register_factory(Box::new(crate::storage::LocalDriverFactory));
    // Register in-memory driver / 注册内存驱动
    registry.register_factory(Box::new(memory::MemoryDriverFactory));
    // Register S3 driver / 注册S3对象存储驱动
    registry.register_factory(Box::new(s3::S3DriverFactory));
}
