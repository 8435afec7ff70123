//! S3驱动工厂

use crate::config::ConfigMap;
use crate::error::Result;
use crate::storage::{ConfigItem, DriverConfig, DriverFactory, StorageDriver};

use super::config::S3Config;
use super::driver::S3Driver;

/// S3驱动工厂
pub struct S3DriverFactory;

impl DriverFactory for S3DriverFactory {
    fn driver_type(&self) -> &'static str {
        "s3"
    }

    fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            name: "S3".to_string(),
            // A mistyped credential key must not silently fall back / 拒绝未知配置项
            strict_keys: true,
            default_root: Some("/".to_string()),
        }
    }

    fn additional_items(&self) -> Vec<ConfigItem> {
        vec![
            ConfigItem::new("bucket", "string")
                .help("S3 bucket name")
                .required(),
            ConfigItem::new("endpoint", "string")
                .help("S3 endpoint URL, empty for AWS (https://s3.{region}.amazonaws.com)"),
            ConfigItem::new("region", "string")
                .help("S3 region, e.g. us-east-1")
                .default("us-east-1"),
            ConfigItem::new("access_key_id", "string").required(),
            ConfigItem::new("secret_access_key", "password").required(),
            ConfigItem::new("session_token", "password")
                .help("Session token for temporary credentials"),
            ConfigItem::new("root_path", "string")
                .help("Root path inside the bucket")
                .default("/"),
            ConfigItem::new("force_path_style", "bool")
                .help("Required by MinIO and most self-hosted gateways")
                .default("false"),
            ConfigItem::new("page_size", "number")
                .help("Keys per list request, at most 1000")
                .default("1000"),
        ]
    }

    fn create_driver(&self, config: &ConfigMap) -> Result<Box<dyn StorageDriver>> {
        let config = S3Config::from_map(config)?;
        Ok(Box::new(S3Driver::new(config)?))
    }
}
