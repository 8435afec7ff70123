use std::path::PathBuf;

use super::{ConfigItem, DriverConfig, DriverFactory, StorageDriver};
use crate::config::ConfigMap;
use crate::drivers::local;
use crate::error::{Error, Result};

pub struct LocalDriverFactory;

impl DriverFactory for LocalDriverFactory {
    fn driver_type(&self) -> &'static str {
        "local"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["fs"]
    }

    fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            name: "Local".to_string(),
            strict_keys: false,
            default_root: None,
        }
    }

    fn additional_items(&self) -> Vec<ConfigItem> {
        vec![ConfigItem::new("root", "string")
            .required()
            .help("Absolute directory all paths are resolved under, created if missing")]
    }

    fn create_driver(&self, config: &ConfigMap) -> Result<Box<dyn StorageDriver>> {
        let root_path = config.require("root")?;
        let root = PathBuf::from(root_path);

        // 同步初始化（工厂方法是同步的）
        if !root.exists() {
            std::fs::create_dir_all(&root)
                .map_err(|e| Error::Config(format!("cannot create root {}: {}", root_path, e)))?;
        }
        if !root.is_dir() {
            return Err(Error::Config(format!("root is not a directory: {}", root_path)));
        }
        let canonical_root = root
            .canonicalize()
            .map_err(|e| Error::Config(format!("cannot resolve root {}: {}", root_path, e)))?;

        tracing::info!("Local driver initialized, root: {:?}", canonical_root);

        Ok(Box::new(local::LocalDriver::new(canonical_root)))
    }
}
