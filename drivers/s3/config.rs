//! S3驱动配置

use serde::{Deserialize, Serialize};

use crate::config::ConfigMap;
use crate::error::{Error, Result};

/// Max keys S3 returns per ListObjectsV2 call / 单页最大键数
pub const MAX_PAGE_SIZE: usize = 1000;

/// S3配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// 存储桶名称
    pub bucket: String,
    /// S3端点地址
    /// AWS: https://s3.{region}.amazonaws.com
    /// MinIO: http://localhost:9000
    pub endpoint: String,
    /// 区域
    pub region: String,
    /// Access Key ID
    pub access_key_id: String,
    /// Secret Access Key
    pub secret_access_key: String,
    /// Session Token（用于临时凭证）
    pub session_token: String,
    /// 根目录路径
    pub root_path: String,
    /// 强制使用路径风格（而非虚拟主机风格）
    /// MinIO等需要设置为true
    pub force_path_style: bool,
    /// Keys per list page, capped at 1000 / 分页大小
    pub page_size: usize,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_root() -> String {
    "/".to_string()
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            endpoint: String::new(),
            region: default_region(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: String::new(),
            root_path: default_root(),
            force_path_style: false,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

impl S3Config {
    /// Read the typed config out of the flat map / 从扁平配置解析
    pub fn from_map(map: &ConfigMap) -> Result<Self> {
        let page_size = map.get_usize("page_size")?.unwrap_or(MAX_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "page_size must be within 1..={}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }

        Ok(Self {
            bucket: map.require("bucket")?.to_string(),
            endpoint: map.get_or("endpoint", "").to_string(),
            region: map.get("region").map(str::to_string).unwrap_or_else(default_region),
            access_key_id: map.require("access_key_id")?.to_string(),
            secret_access_key: map.require("secret_access_key")?.to_string(),
            session_token: map.get_or("session_token", "").to_string(),
            root_path: map.get("root_path").map(str::to_string).unwrap_or_else(default_root),
            force_path_style: map.get_bool("force_path_style")?.unwrap_or(false),
            page_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn base() -> ConfigMap {
        ConfigMap::new()
            .with("bucket", "media")
            .with("access_key_id", "ak")
            .with("secret_access_key", "sk")
    }

    #[test]
    fn test_defaults() {
        let cfg = S3Config::from_map(&base()).unwrap();
        assert_eq!(cfg.region, "us-east-1");
        assert_eq!(cfg.root_path, "/");
        assert_eq!(cfg.page_size, 1000);
        assert!(!cfg.force_path_style);
    }

    #[test]
    fn test_page_size_bounds() {
        let err = S3Config::from_map(&base().with("page_size", "5000")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        let cfg = S3Config::from_map(&base().with("page_size", "50")).unwrap();
        assert_eq!(cfg.page_size, 50);
    }

    #[test]
    fn test_force_path_style() {
        let cfg = S3Config::from_map(&base().with("force_path_style", "true")).unwrap();
        assert!(cfg.force_path_style);
    }
}
