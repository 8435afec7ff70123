use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use std::ops::Range;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::utils;

/// Byte stream returned by a driver / 驱动返回的字节流
pub type DriverReader = Box<dyn AsyncRead + Unpin + Send>;

/// Configuration item definition / 配置项定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigItem {
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl ConfigItem {
    pub fn new(name: &str, item_type: &str) -> Self {
        Self {
            name: name.to_string(),
            item_type: item_type.to_string(),
            default: None,
            required: false,
            help: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, val: &str) -> Self {
        self.default = Some(val.to_string());
        self
    }

    pub fn help(mut self, val: &str) -> Self {
        self.help = Some(val.to_string());
        self
    }
}

/// Driver configuration information / 驱动配置信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    pub name: String,
    /// Reject keys no config item declares / 拒绝未声明的配置项
    #[serde(default)]
    pub strict_keys: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_root: Option<String>,
}

/// Complete driver information / 驱动完整信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverInfo {
    /// Common configuration items shared by all drivers / 通用配置项
    pub common: Vec<ConfigItem>,
    /// Driver-specific configuration items / 驱动特有配置项
    pub additional: Vec<ConfigItem>,
    /// Basic driver configuration / 驱动基本配置
    pub config: DriverConfig,
}

impl DriverInfo {
    pub fn items(&self) -> impl Iterator<Item = &ConfigItem> {
        self.common.iter().chain(self.additional.iter())
    }
}

/// Generate common configuration items (shared by all drivers) / 生成通用配置项
pub fn get_common_items(_config: &DriverConfig) -> Vec<ConfigItem> {
    vec![
        ConfigItem::new("disable", "string")
            .help("Comma separated operations to turn off, e.g. \"rename,copy\""),
    ]
}

/// Normalized object metadata / 对象元数据
///
/// Directories always report size 0 and never carry an etag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    is_dir: bool,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
}

impl Metadata {
    pub fn file(size: u64) -> Self {
        Self {
            is_dir: false,
            size,
            last_modified: None,
            content_type: None,
            etag: None,
        }
    }

    pub fn dir() -> Self {
        Self {
            is_dir: true,
            size: 0,
            last_modified: None,
            content_type: None,
            etag: None,
        }
    }

    pub fn with_last_modified(mut self, t: Option<DateTime<Utc>>) -> Self {
        self.last_modified = t;
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    /// Ignored for directories / 目录不保存etag
    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        if !self.is_dir {
            self.etag = etag;
        }
        self
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}

/// File entry information / 文件条目信息
///
/// `path` is relative to the operator root; directories end with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata>,
}

impl Entry {
    pub fn new(path: impl Into<String>, metadata: Option<Metadata>) -> Self {
        Self {
            path: path.into(),
            metadata,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        utils::get_basename(&self.path)
    }

    pub fn is_dir(&self) -> bool {
        match &self.metadata {
            Some(m) => m.is_dir(),
            None => utils::is_dir_path(&self.path),
        }
    }

    /// `None` when the driver defers stat to a separate call / 可能为空
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn into_parts(self) -> (String, Option<Metadata>) {
        (self.path, self.metadata)
    }
}

/// One page of a directory listing / 列表分页
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<Entry>,
    /// Continuation token, `None` on the last page / 下一页令牌
    pub next_token: Option<String>,
}

/// Storage driver interface (provides only primitive operations) / 存储驱动接口
///
/// Paths are normalized by the operator before they get here: relative,
/// `/`-separated, `"/"` for the root, directories end with `/`.
/// Drivers return only [`Error`]; native failures are translated inside.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Scheme name / 驱动名称
    fn name(&self) -> &str;

    /// Root inside the backend, in `/a/b/` form / 根目录
    fn root(&self) -> &str {
        "/"
    }

    /// Driver capabilities / 驱动能力
    fn capabilities(&self) -> Capability;

    /// Object metadata / 获取元数据
    async fn stat(&self, path: &str) -> Result<Metadata>;

    /// Open file reader (supports range reading) / 打开文件读取器
    async fn open_reader(&self, path: &str, range: Option<Range<u64>>) -> Result<DriverReader>;

    /// Put complete file data, overwriting / 上传完整文件
    async fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<()>;

    /// Create directory; existing directory is not an error / 创建目录
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// Delete file or empty directory; missing path is not an error / 删除
    async fn delete(&self, path: &str) -> Result<()>;

    /// Fetch one page of direct children of a directory / 列出一页目录内容
    async fn list_page(&self, path: &str, token: Option<&str>) -> Result<ListPage>;

    /// Copy a file (default implementation: read then write) / 复制文件
    async fn copy_item(&self, src: &str, dst: &str) -> Result<()> {
        // Drivers with a server-side copy override this
        let meta = self.stat(src).await?;
        let mut reader = self.open_reader(src, None).await?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| Error::from_io(e, src))?;
        self.put(dst, Bytes::from(buf), meta.content_type()).await
    }

    /// Rename a file (default implementation: copy then delete, not atomic) / 重命名
    async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        self.copy_item(src, dst).await?;
        self.delete(src).await
    }
}

pub type DriverBox = Arc<dyn StorageDriver>;

pub mod capability;
pub mod manager;
pub mod local_factory;

pub use capability::{Capability, Operation};
pub use manager::{DriverFactory, DriverRegistry};
pub use local_factory::LocalDriverFactory;
