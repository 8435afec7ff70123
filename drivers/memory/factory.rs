use crate::config::ConfigMap;
use crate::error::{Error, Result};
use crate::storage::{ConfigItem, DriverConfig, DriverFactory, StorageDriver};

use super::driver::MemoryDriver;

/// 内存驱动工厂
pub struct MemoryDriverFactory;

impl DriverFactory for MemoryDriverFactory {
    fn driver_type(&self) -> &'static str {
        "memory"
    }

    fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            name: "Memory".to_string(),
            strict_keys: false,
            default_root: Some("/".to_string()),
        }
    }

    fn additional_items(&self) -> Vec<ConfigItem> {
        vec![ConfigItem::new("page_size", "number")
            .default("1000")
            .help("Entries returned per list page")]
    }

    fn create_driver(&self, config: &ConfigMap) -> Result<Box<dyn StorageDriver>> {
        let page_size = config.get_usize("page_size")?.unwrap_or(super::DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(Error::Config("page_size must be greater than 0".to_string()));
        }
        Ok(Box::new(MemoryDriver::with_page_size(page_size)))
    }
}
