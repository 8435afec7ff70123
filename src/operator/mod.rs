//! Unified operator / 统一存储操作入口
//!
//! [`Operator`] is the single facade over every driver. It normalizes paths,
//! checks the capability snapshot taken at construction and only then calls
//! into the driver, so an unsupported operation fails the same way on every
//! backend.

mod blocking;
mod lister;
mod reader;

pub use blocking::{BlockingLister, BlockingOperator, BlockingReader};
pub use lister::Lister;
pub use reader::Reader;

use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use serde::Serialize;
use tokio::io::AsyncReadExt;

use crate::config::ConfigMap;
use crate::error::{Error, Result};
use crate::layers::Layer;
use crate::storage::{Capability, DriverBox, DriverRegistry, Entry, Metadata, Operation};
use crate::utils;

/// Operator summary / 操作器信息
#[derive(Debug, Clone, Serialize)]
pub struct OperatorInfo {
    pub scheme: String,
    pub root: String,
    pub capability: Capability,
}

/// Storage operator / 存储操作器
///
/// Cheap to clone; clones share the driver and may be used from many tasks
/// at once.
#[derive(Clone)]
pub struct Operator {
    scheme: String,
    driver: DriverBox,
    capability: Capability,
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("scheme", &self.scheme)
            .field("root", &self.driver.root())
            .finish()
    }
}

impl Operator {
    /// Build from the built-in driver registry / 通过内置注册表创建
    pub fn new(scheme: &str, config: &ConfigMap) -> Result<Self> {
        Self::with_registry(DriverRegistry::global(), scheme, config)
    }

    /// Build from a caller-owned registry / 通过指定注册表创建
    pub fn with_registry(registry: &DriverRegistry, scheme: &str, config: &ConfigMap) -> Result<Self> {
        let (driver, capability) = registry.build(scheme, config)?;
        Ok(Self {
            scheme: scheme.to_string(),
            driver,
            capability,
        })
    }

    /// Wrap an already built driver / 直接包装驱动
    pub fn from_driver(driver: DriverBox) -> Self {
        Self {
            scheme: driver.name().to_string(),
            capability: driver.capabilities(),
            driver,
        }
    }

    /// Wrap the driver with a layer; later layers sit above earlier ones / 添加中间层
    pub fn layer<L: Layer>(self, layer: L) -> Self {
        Self {
            driver: layer.layer(self.driver),
            ..self
        }
    }

    pub fn info(&self) -> OperatorInfo {
        OperatorInfo {
            scheme: self.scheme.clone(),
            root: self.driver.root().to_string(),
            capability: self.capability.clone(),
        }
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Synchronous view of this operator / 阻塞调用接口
    pub fn blocking(&self) -> Result<BlockingOperator> {
        self.check(Operation::Blocking)?;
        BlockingOperator::new(self.clone())
    }

    fn check(&self, op: Operation) -> Result<()> {
        if self.capability.supports(op) {
            Ok(())
        } else {
            tracing::debug!("{}: {} rejected by capability", self.scheme, op);
            Err(Error::unsupported(self.scheme.clone(), op))
        }
    }

    /// Normalized path that must name a file / 文件路径
    fn file_path(path: &str) -> Result<String> {
        let path = utils::normalize_path(path);
        if utils::is_dir_path(&path) {
            return Err(Error::IsADirectory(path));
        }
        Ok(path)
    }

    /// Resolve a path for listing; a path without trailing slash must be a directory / 目录路径
    async fn dir_path(&self, path: &str) -> Result<String> {
        let path = utils::normalize_path(path);
        if utils::is_dir_path(&path) {
            return Ok(path);
        }
        if self.capability.stat && !self.driver.stat(&path).await?.is_dir() {
            return Err(Error::NotADirectory(path));
        }
        Ok(utils::as_dir_path(&path))
    }

    /// Read the whole object / 读取完整文件
    pub async fn read(&self, path: &str) -> Result<Bytes> {
        self.check(Operation::Read)?;
        let path = Self::file_path(path)?;
        self.read_inner(&path, None).await
    }

    /// Read `range` of the object, clamped to its size / 范围读取
    pub async fn read_with_range(&self, path: &str, range: Range<u64>) -> Result<Bytes> {
        self.check(Operation::Read)?;
        if !self.capability.read_can_seek {
            return Err(Error::unsupported(self.scheme.clone(), Operation::Read));
        }
        let path = Self::file_path(path)?;
        self.read_inner(&path, Some(range)).await
    }

    async fn read_inner(&self, path: &str, range: Option<Range<u64>>) -> Result<Bytes> {
        let mut reader = self.driver.open_reader(path, range).await?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| Error::from_io(e, path))?;
        Ok(Bytes::from(buf))
    }

    /// Write the whole object, overwriting / 写入完整文件
    pub async fn write(&self, path: &str, data: impl Into<Bytes>) -> Result<()> {
        self.check(Operation::Write)?;
        let path = Self::file_path(path)?;
        self.driver.put(&path, data.into(), None).await
    }

    /// Write with a content type; drivers that cannot store it drop it / 带内容类型写入
    pub async fn write_with_content_type(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        content_type: &str,
    ) -> Result<()> {
        self.check(Operation::Write)?;
        let path = Self::file_path(path)?;
        self.driver.put(&path, data.into(), Some(content_type)).await
    }

    /// Existence check, absence is `false` / 是否存在
    pub async fn is_exist(&self, path: &str) -> Result<bool> {
        self.check(Operation::Stat)?;
        let path = utils::normalize_path(path);
        match self.driver.stat(&path).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) | Err(Error::NotADirectory(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a directory, succeeding if it already exists / 创建目录
    pub async fn create_dir(&self, path: &str) -> Result<()> {
        self.check(Operation::CreateDir)?;
        let path = utils::as_dir_path(&utils::normalize_path(path));
        if path == "/" {
            return Ok(());
        }
        match self.driver.create_dir(&path).await {
            Err(Error::AlreadyExists(_)) => Ok(()),
            other => other,
        }
    }

    /// Copy a file; `dst` is overwritten / 复制文件
    pub async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        self.check(Operation::Copy)?;
        let src = Self::file_path(src)?;
        let dst = Self::file_path(dst)?;
        if src == dst {
            return self.driver.stat(&src).await.map(|_| ());
        }
        self.driver.copy_item(&src, &dst).await
    }

    /// Rename a file; atomic only when `rename_is_atomic` is set / 重命名
    pub async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        self.check(Operation::Rename)?;
        let src = Self::file_path(src)?;
        let dst = Self::file_path(dst)?;
        if src == dst {
            return self.driver.stat(&src).await.map(|_| ());
        }
        self.driver.rename(&src, &dst).await
    }

    /// Remove a file or empty directory, missing paths included / 删除
    pub async fn remove(&self, path: &str) -> Result<()> {
        self.check(Operation::Delete)?;
        let path = utils::normalize_path(path);
        if path == "/" {
            return Err(Error::PermissionDenied("refusing to remove the root".to_string()));
        }
        match self.driver.delete(&path).await {
            Err(Error::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    /// Remove a path and everything below it / 递归删除
    pub async fn remove_all(&self, path: &str) -> Result<()> {
        self.check(Operation::List)?;
        self.check(Operation::Delete)?;
        let path = utils::normalize_path(path);

        let root = if utils::is_dir_path(&path) {
            path
        } else {
            match self.driver.stat(&path).await {
                Ok(meta) if meta.is_dir() => utils::as_dir_path(&path),
                Ok(_) => return self.remove(&path).await,
                Err(Error::NotFound(_)) => return Ok(()),
                Err(e) => return Err(e),
            }
        };

        // Parents are visited before children, so reverse order deletes bottom-up
        let mut pending = vec![root];
        let mut dirs = Vec::new();
        while let Some(dir) = pending.pop() {
            let entries: Vec<Entry> = match Lister::new(self.driver.clone(), dir.clone()).try_collect().await {
                Ok(entries) => entries,
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            for entry in entries {
                if entry.is_dir() {
                    pending.push(entry.path().to_string());
                } else {
                    self.driver.delete(entry.path()).await?;
                }
            }
            dirs.push(dir);
        }

        for dir in dirs.iter().rev().filter(|d| d.as_str() != "/") {
            match self.driver.delete(dir).await {
                Ok(()) | Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        tracing::debug!("{}: remove_all cleared {} directories", self.scheme, dirs.len());
        Ok(())
    }

    pub async fn stat(&self, path: &str) -> Result<Metadata> {
        self.check(Operation::Stat)?;
        let path = utils::normalize_path(path);
        self.driver.stat(&path).await
    }

    /// Whole listing in memory; use [`Operator::lister`] for large directories / 列出目录
    pub async fn list(&self, path: &str) -> Result<Vec<Entry>> {
        self.lister(path).await?.try_collect().await
    }

    /// Lazy listing, pages are fetched as the stream is polled / 流式列目录
    pub async fn lister(&self, path: &str) -> Result<Lister> {
        self.check(Operation::List)?;
        let path = self.dir_path(path).await?;
        Ok(Lister::new(self.driver.clone(), path))
    }

    /// Streaming reader positioned at the start of the object / 流式读取器
    pub async fn reader(&self, path: &str) -> Result<Reader> {
        self.check(Operation::Read)?;
        let path = Self::file_path(path)?;
        let inner = self.driver.open_reader(&path, None).await?;
        Ok(Reader::new(
            Arc::clone(&self.driver),
            path,
            inner,
            self.capability.read_can_seek,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::layers::MetricsLayer;
    use crate::test_util::PanicDriver;
    use futures::StreamExt;
    use std::io::SeekFrom;
    use tokio::io::AsyncReadExt;

    fn memory() -> Operator {
        Operator::new("memory", &ConfigMap::new()).unwrap()
    }

    fn local(dir: &tempfile::TempDir) -> Operator {
        let cfg = ConfigMap::new().with("root", dir.path().to_string_lossy().to_string());
        Operator::new("fs", &cfg).unwrap()
    }

    /// Runs the same checks against every backend that needs no network
    async fn for_each_backend<F, Fut>(check: F)
    where
        F: Fn(Operator) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        check(memory()).await;
        let dir = tempfile::tempdir().unwrap();
        check(local(&dir)).await;
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        for_each_backend(|op| async move {
            let data = b"hello\x00world".to_vec();
            op.write("a/b.bin", data.clone()).await.unwrap();
            assert_eq!(op.read("a/b.bin").await.unwrap(), Bytes::from(data), "{}", op.scheme());
        })
        .await;
    }

    #[tokio::test]
    async fn test_remove_missing_path_succeeds() {
        for_each_backend(|op| async move {
            op.remove("never/written.txt").await.unwrap();
            op.remove("never/").await.unwrap();
        })
        .await;
    }

    #[tokio::test]
    async fn test_create_dir_twice() {
        for_each_backend(|op| async move {
            op.create_dir("docs").await.unwrap();
            let before = op.list("/").await.unwrap();
            op.create_dir("docs/").await.unwrap();
            assert_eq!(op.list("/").await.unwrap(), before);
            assert!(op.stat("docs/").await.unwrap().is_dir());
        })
        .await;
    }

    #[tokio::test]
    async fn test_is_exist_false_for_unwritten() {
        for_each_backend(|op| async move {
            assert!(!op.is_exist("ghost.txt").await.unwrap());
            assert!(!op.is_exist("ghost/").await.unwrap());
            op.write("real.txt", "x").await.unwrap();
            assert!(op.is_exist("real.txt").await.unwrap());
        })
        .await;
    }

    #[tokio::test]
    async fn test_stat_file_metadata() {
        for_each_backend(|op| async move {
            op.write("dir/file.txt", vec![1u8, 2, 3]).await.unwrap();
            let meta = op.stat("dir/file.txt").await.unwrap();
            assert_eq!(meta.size(), 3);
            assert!(!meta.is_dir());
            assert!(op.stat("dir/").await.unwrap().is_dir());
        })
        .await;
    }

    #[tokio::test]
    async fn test_path_shape_errors() {
        for_each_backend(|op| async move {
            op.write("dir/file.txt", "x").await.unwrap();
            assert_eq!(op.read("dir/").await.unwrap_err().kind(), ErrorKind::IsADirectory);
            assert_eq!(op.write("dir/", "x").await.unwrap_err().kind(), ErrorKind::IsADirectory);
            assert_eq!(op.list("dir/file.txt").await.unwrap_err().kind(), ErrorKind::NotADirectory);
            assert_eq!(op.read("missing.txt").await.unwrap_err().kind(), ErrorKind::NotFound);
        })
        .await;
    }

    #[tokio::test]
    async fn test_copy_and_rename() {
        for_each_backend(|op| async move {
            op.write("src.txt", "payload").await.unwrap();
            op.write("dst.txt", "old").await.unwrap();

            op.copy("src.txt", "dst.txt").await.unwrap();
            assert_eq!(op.read("dst.txt").await.unwrap(), "payload");

            op.rename("src.txt", "moved/src.txt").await.unwrap();
            assert!(!op.is_exist("src.txt").await.unwrap());
            assert_eq!(op.read("moved/src.txt").await.unwrap(), "payload");

            op.rename("moved/src.txt", "moved/src.txt").await.unwrap();
            assert_eq!(op.copy("gone.txt", "gone.txt").await.unwrap_err().kind(), ErrorKind::NotFound);
            assert_eq!(op.rename("gone.txt", "x.txt").await.unwrap_err().kind(), ErrorKind::NotFound);
        })
        .await;
    }

    #[tokio::test]
    async fn test_remove_all() {
        for_each_backend(|op| async move {
            op.write("tree/a.txt", "a").await.unwrap();
            op.write("tree/sub/b.txt", "b").await.unwrap();
            op.create_dir("tree/empty/").await.unwrap();
            op.write("keep.txt", "k").await.unwrap();

            op.remove_all("tree").await.unwrap();
            assert!(!op.is_exist("tree/").await.unwrap());
            assert!(op.is_exist("keep.txt").await.unwrap());
            op.remove_all("tree/").await.unwrap();
        })
        .await;
    }

    #[tokio::test]
    async fn test_remove_dir_named_without_slash() {
        for_each_backend(|op| async move {
            op.create_dir("d/").await.unwrap();
            op.remove("d").await.unwrap();
            assert!(!op.is_exist("d/").await.unwrap(), "{}", op.scheme());

            op.write("n/x", "x").await.unwrap();
            let err = op.remove("n").await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Backend, "{}", op.scheme());
            assert!(op.is_exist("n/x").await.unwrap());
        })
        .await;
    }

    #[tokio::test]
    async fn test_file_cannot_hold_children() {
        for_each_backend(|op| async move {
            op.write("a", "x").await.unwrap();

            let err = op.write("a/b", "y").await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotADirectory, "{}", op.scheme());
            let err = op.create_dir("a/c/").await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotADirectory, "{}", op.scheme());

            assert_eq!(op.read("a").await.unwrap(), "x");
            assert_eq!(op.list("/").await.unwrap().len(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn test_unsupported_never_reaches_driver() {
        let op = Operator::from_driver(Arc::new(PanicDriver));
        let expect_unsupported = |err: Error, op_name: Operation| {
            assert_eq!(err.kind(), ErrorKind::Unsupported);
            assert!(matches!(err, Error::Unsupported { operation, .. } if operation == op_name));
        };

        expect_unsupported(op.read("a").await.unwrap_err(), Operation::Read);
        expect_unsupported(op.write("a", "x").await.unwrap_err(), Operation::Write);
        expect_unsupported(op.is_exist("a").await.unwrap_err(), Operation::Stat);
        expect_unsupported(op.create_dir("a/").await.unwrap_err(), Operation::CreateDir);
        expect_unsupported(op.copy("a", "b").await.unwrap_err(), Operation::Copy);
        expect_unsupported(op.rename("a", "b").await.unwrap_err(), Operation::Rename);
        expect_unsupported(op.remove("a").await.unwrap_err(), Operation::Delete);
        expect_unsupported(op.stat("a").await.unwrap_err(), Operation::Stat);
        expect_unsupported(op.list("a/").await.unwrap_err(), Operation::List);
        expect_unsupported(op.lister("a/").await.unwrap_err(), Operation::List);
        expect_unsupported(op.reader("a").await.unwrap_err(), Operation::Read);
        expect_unsupported(op.blocking().unwrap_err(), Operation::Blocking);
    }

    #[tokio::test]
    async fn test_disabled_rename_is_unsupported() {
        let cfg = ConfigMap::new().with("disable", "rename");
        let op = Operator::new("memory", &cfg).unwrap();
        op.write("a", "x").await.unwrap();

        let err = op.rename("a", "b").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(op.is_exist("a").await.unwrap());
        assert!(!op.info().capability.rename);
    }

    #[tokio::test]
    async fn test_lister_pages_on_demand() {
        let cfg = ConfigMap::new().with("page_size", "50");
        let metrics = MetricsLayer::new();
        let stats = metrics.metrics();
        let op = Operator::new("memory", &cfg).unwrap().layer(metrics);

        for i in 0..150 {
            op.write(&format!("dir/{:03}.txt", i), "x").await.unwrap();
        }

        let mut lister = op.lister("dir/").await.unwrap();
        let mut seen = std::collections::HashSet::new();
        while let Some(entry) = lister.next().await {
            assert!(seen.insert(entry.unwrap().path().to_string()));
        }

        assert_eq!(seen.len(), 150);
        assert_eq!(stats.stats(Operation::List).calls, 3);
    }

    #[tokio::test]
    async fn test_list_missing_dir() {
        let op = memory();
        assert_eq!(op.list("nope/").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert!(op.list("/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_with_range() {
        for_each_backend(|op| async move {
            op.write("r.txt", "0123456789").await.unwrap();
            assert_eq!(op.read_with_range("r.txt", 2..5).await.unwrap(), "234");
            assert_eq!(op.read_with_range("r.txt", 8..100).await.unwrap(), "89");
        })
        .await;
    }

    #[tokio::test]
    async fn test_reader_seek() {
        for_each_backend(|op| async move {
            op.write("s.txt", "abcdefgh").await.unwrap();
            let mut reader = op.reader("s.txt").await.unwrap();

            let mut buf = [0u8; 3];
            reader.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"abc");
            assert_eq!(reader.position(), 3);

            assert_eq!(reader.seek(SeekFrom::End(-2)).await.unwrap(), 6);
            assert_eq!(reader.read_all().await.unwrap(), "gh");

            assert_eq!(reader.seek(SeekFrom::Current(-4)).await.unwrap(), 4);
            assert_eq!(reader.read_all().await.unwrap(), "efgh");
            reader.close();
        })
        .await;
    }

    #[tokio::test]
    async fn test_seek_unsupported_without_capability() {
        let cfg = ConfigMap::new();
        let op = Operator::new("memory", &cfg).unwrap();
        op.write("s.txt", "abc").await.unwrap();

        let capability = Capability {
            read_can_seek: false,
            ..op.capability().clone()
        };
        let op = Operator { capability, ..op };
        let mut reader = op.reader("s.txt").await.unwrap();
        let err = reader.seek(SeekFrom::Start(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert_eq!(op.read_with_range("s.txt", 0..1).await.unwrap_err().kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_content_type_round_trip() {
        let op = memory();
        op.write_with_content_type("page", "<p/>", "text/html").await.unwrap();
        assert_eq!(op.stat("page").await.unwrap().content_type(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_remove_root_is_rejected() {
        let op = memory();
        assert_eq!(op.remove("/").await.unwrap_err().kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_concurrent_writes_different_paths() {
        let op = memory();
        let mut handles = Vec::new();
        for i in 0..16 {
            let op = op.clone();
            handles.push(tokio::spawn(async move {
                op.write(&format!("c/{}.txt", i), format!("{}", i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(op.list("c/").await.unwrap().len(), 16);
    }
}
