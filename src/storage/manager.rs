use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::capability::parse_operations;
use super::{get_common_items, Capability, ConfigItem, DriverBox, DriverConfig, DriverInfo, StorageDriver};
use crate::config::ConfigMap;
use crate::error::{Error, Result};

/// Driver factory trait / 驱动工厂 trait
pub trait DriverFactory: Send + Sync {
    /// Driver type name, the scheme / 驱动类型名称
    fn driver_type(&self) -> &'static str;

    /// Extra scheme names resolving to this factory / 别名
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Build a driver from a validated config (defaults already filled) / 创建驱动实例
    fn create_driver(&self, config: &ConfigMap) -> Result<Box<dyn StorageDriver>>;

    /// Return driver basic config / 返回驱动基本配置
    fn driver_config(&self) -> DriverConfig;

    /// Return driver specific config items / 返回驱动特有配置项
    fn additional_items(&self) -> Vec<ConfigItem>;

    /// Generate complete driver info (auto merge common + additional) / 生成完整的驱动信息
    fn driver_info(&self) -> DriverInfo {
        let config = self.driver_config();
        let common = get_common_items(&config);
        let additional = self.additional_items();
        DriverInfo { common, additional, config }
    }
}

static GLOBAL: Lazy<DriverRegistry> = Lazy::new(|| {
    let registry = DriverRegistry::new();
    crate::drivers::register_all(&registry);
    registry
});

/// Scheme → factory registry / 驱动注册表
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: Arc<RwLock<HashMap<String, Arc<dyn DriverFactory>>>>,
}

impl DriverRegistry {
    /// Empty registry / 空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in drivers / 内置驱动注册表
    pub fn global() -> &'static DriverRegistry {
        &GLOBAL
    }

    /// Register driver factory, replacing any previous one for the scheme / 注册驱动工厂
    pub fn register_factory(&self, factory: Box<dyn DriverFactory>) {
        let factory: Arc<dyn DriverFactory> = Arc::from(factory);
        let driver_type = factory.driver_type();

        let mut factories = self.factories.write();
        factories.insert(driver_type.to_string(), factory.clone());
        for alias in factory.aliases() {
            factories.insert(alias.to_string(), factory.clone());
        }

        tracing::info!("Driver factory registered: {}", driver_type);
    }

    pub fn get_factory(&self, scheme: &str) -> Option<Arc<dyn DriverFactory>> {
        self.factories.read().get(scheme).cloned()
    }

    /// List all registered schemes, aliases included / 列出所有驱动类型
    pub fn list_driver_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.read().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn driver_info(&self, scheme: &str) -> Option<DriverInfo> {
        self.get_factory(scheme).map(|f| f.driver_info())
    }

    /// Validate the config, build the driver and compute its capability snapshot.
    /// 校验配置并创建驱动
    pub fn build(&self, scheme: &str, config: &ConfigMap) -> Result<(DriverBox, Capability)> {
        let factory = self
            .get_factory(scheme)
            .ok_or_else(|| Error::Config(format!("unknown scheme: {}", scheme)))?;

        let info = factory.driver_info();
        let prepared = prepare_config(&info, config)?;

        let disabled = match prepared.get("disable") {
            Some(v) => parse_operations(v).map_err(Error::Config)?,
            None => Vec::new(),
        };

        let driver = match factory.create_driver(&prepared) {
            Ok(driver) => driver,
            Err(e) => {
                tracing::error!("Driver creation failed: {} - {}", scheme, e);
                return Err(e);
            }
        };

        let capability = driver.capabilities().without(&disabled);
        tracing::info!(
            "Driver created: {} (root {}), supports {:?}",
            scheme,
            driver.root(),
            capability.supported()
        );

        Ok((Arc::from(driver), capability))
    }
}

/// Fill defaults, check required and (for strict drivers) unknown keys / 校验配置
fn prepare_config(info: &DriverInfo, config: &ConfigMap) -> Result<ConfigMap> {
    let mut prepared = config.clone();

    for item in info.items() {
        if prepared.get(&item.name).is_some() {
            continue;
        }
        if let Some(default) = &item.default {
            prepared.set(item.name.clone(), default.clone());
        } else if item.required {
            return Err(Error::Config(format!(
                "{}: missing required key: {}",
                info.config.name, item.name
            )));
        }
    }

    for item in info.items().filter(|i| i.required) {
        prepared.require(&item.name)?;
    }

    if info.config.strict_keys {
        let mut unknown: Vec<&str> = config
            .keys()
            .filter(|k| !info.items().any(|i| i.name == *k))
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            return Err(Error::Config(format!(
                "{}: unknown keys: {}",
                info.config.name,
                unknown.join(", ")
            )));
        }
    }

    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::Operation;

    #[test]
    fn test_global_has_builtin_drivers() {
        let types = DriverRegistry::global().list_driver_types();
        for scheme in ["fs", "local", "memory", "s3"] {
            assert!(types.iter().any(|t| t == scheme), "missing {}", scheme);
        }
    }

    #[test]
    fn test_unknown_scheme_is_config_error() {
        let err = DriverRegistry::global()
            .build("ftp", &ConfigMap::new())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_disable_masks_capability() {
        let cfg = ConfigMap::new().with("disable", "rename");
        let (_, cap) = DriverRegistry::global().build("memory", &cfg).unwrap();
        assert!(!cap.supports(Operation::Rename));
        assert!(cap.supports(Operation::Copy));

        let cfg = ConfigMap::new().with("disable", "chmod");
        let err = DriverRegistry::global().build("memory", &cfg).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_strict_driver_rejects_unknown_keys() {
        let cfg = ConfigMap::new()
            .with("bucket", "media")
            .with("endpoint", "http://127.0.0.1:9000")
            .with("access_key_id", "ak")
            .with("secret_access_key", "sk")
            .with("secert_access_key", "typo");
        let err = DriverRegistry::global().build("s3", &cfg).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("secert_access_key"));
    }

    #[test]
    fn test_missing_required_key() {
        let cfg = ConfigMap::new().with("bucket", "media");
        let err = DriverRegistry::global().build("s3", &cfg).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_lenient_driver_ignores_unknown_keys() {
        let cfg = ConfigMap::new().with("whatever", "1");
        assert!(DriverRegistry::global().build("memory", &cfg).is_ok());
    }
}
