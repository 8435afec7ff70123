use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::{Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use crate::error::{Error, Result};
use crate::storage::{Capability, DriverReader, Entry, ListPage, Metadata, StorageDriver};
use crate::utils;

/// Local filesystem driver / 本地存储驱动
///
/// Rename is a single `rename(2)` and therefore atomic within one
/// filesystem. A directory is listed in one page.
pub struct LocalDriver {
    root: PathBuf,
    root_display: String,
}

impl LocalDriver {
    pub fn new(root: PathBuf) -> Self {
        let root_display = utils::normalize_root(&root.to_string_lossy());
        Self { root, root_display }
    }

    /// Get root directory / 获取根目录
    pub fn root_path(&self) -> &PathBuf {
        &self.root
    }

    /// Map a normalized path under the root, refusing traversal / 规范化路径
    fn normalize_path(&self, path: &str) -> Result<PathBuf> {
        let path = path.trim_start_matches('/').replace('\\', "/");

        let normalized: Vec<&str> = path.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
        for component in &normalized {
            if *component == ".." {
                return Err(Error::PermissionDenied(format!(
                    "{}: access path exceeds root directory scope",
                    path
                )));
            }
        }

        Ok(self.root.join(normalized.join("/")))
    }
}

fn to_metadata(path: &Path, meta: &std::fs::Metadata) -> Metadata {
    let modified: Option<DateTime<Utc>> = meta.modified().ok().map(DateTime::<Utc>::from);

    if meta.is_dir() {
        return Metadata::dir().with_last_modified(modified);
    }

    let etag = modified.map(|t| format!("\"{:x}-{:x}\"", t.timestamp(), meta.len()));
    let content_type = mime_guess::from_path(path).first().map(|m| m.to_string());

    Metadata::file(meta.len())
        .with_last_modified(modified)
        .with_content_type(content_type)
        .with_etag(etag)
}

/// Whether a path component between `root` and `full` is a file / 祖先是否为文件
fn has_file_ancestor(root: &Path, full: &Path) -> bool {
    full.ancestors()
        .skip(1)
        .take_while(|p| p.starts_with(root) && *p != root)
        .any(|p| p.is_file())
}

#[async_trait]
impl StorageDriver for LocalDriver {
    fn name(&self) -> &str {
        "local"
    }

    fn root(&self) -> &str {
        &self.root_display
    }

    fn capabilities(&self) -> Capability {
        Capability {
            read: true,
            write: true,
            list: true,
            copy: true,
            rename: true,
            stat: true,
            create_dir: true,
            delete: true,
            blocking: true,
            read_can_seek: true,
            rename_is_atomic: true,
            copy_is_native: true,
            write_can_content_type: false,
            list_page_size: None,
        }
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let full_path = self.normalize_path(path)?;
        let meta = tokio::fs::metadata(&full_path)
            .await
            .map_err(|e| Error::from_io(e, path))?;

        if utils::is_dir_path(path) && !meta.is_dir() {
            return Err(Error::NotADirectory(path.to_string()));
        }

        Ok(to_metadata(&full_path, &meta))
    }

    async fn open_reader(&self, path: &str, range: Option<Range<u64>>) -> Result<DriverReader> {
        let full_path = self.normalize_path(path)?;
        let start = range.as_ref().map(|r| r.start);
        let owned_path = path.to_string();

        // Use sync IO to improve network share performance / 使用同步IO
        let file = tokio::task::spawn_blocking(move || {
            let meta = std::fs::metadata(&full_path).map_err(|e| Error::from_io(e, &owned_path))?;
            if meta.is_dir() {
                return Err(Error::IsADirectory(owned_path));
            }
            let mut file = std::fs::File::open(&full_path).map_err(|e| Error::from_io(e, &owned_path))?;
            if let Some(start) = start {
                file.seek(SeekFrom::Start(start))
                    .map_err(|e| Error::from_io(e, &owned_path))?;
            }
            Ok::<std::fs::File, Error>(file)
        })
        .await??;

        // Convert to async / 转换为异步
        let async_file = tokio::fs::File::from_std(file);

        match range {
            Some(r) => Ok(Box::new(async_file.take(r.end.saturating_sub(r.start)))),
            None => Ok(Box::new(async_file)),
        }
    }

    async fn put(&self, path: &str, data: Bytes, _content_type: Option<&str>) -> Result<()> {
        let full_path = self.normalize_path(path)?;
        let owned_path = path.to_string();
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || {
            if full_path.is_dir() {
                return Err(Error::IsADirectory(owned_path));
            }
            if has_file_ancestor(&root, &full_path) {
                return Err(Error::NotADirectory(owned_path));
            }
            // Ensure parent directory exists / 确保父目录存在
            if let Some(parent) = full_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::from_io(e, &owned_path))?;
            }
            std::fs::write(&full_path, &data).map_err(|e| Error::from_io(e, &owned_path))
        })
        .await?
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let full_path = self.normalize_path(path)?;
        if full_path.is_file() || has_file_ancestor(&self.root, &full_path) {
            return Err(Error::NotADirectory(path.to_string()));
        }
        tokio::fs::create_dir_all(full_path)
            .await
            .map_err(|e| Error::from_io(e, path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.normalize_path(path)?;
        if full_path == self.root {
            return Err(Error::PermissionDenied("refusing to delete the root".to_string()));
        }

        let meta = match tokio::fs::symlink_metadata(&full_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::from_io(e, path)),
        };

        let result = if meta.is_dir() {
            tokio::fs::remove_dir(&full_path).await
        } else {
            tokio::fs::remove_file(&full_path).await
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from_io(e, path)),
        }
    }

    async fn list_page(&self, path: &str, _token: Option<&str>) -> Result<ListPage> {
        let full_path = self.normalize_path(path)?;

        let meta = tokio::fs::metadata(&full_path)
            .await
            .map_err(|e| Error::from_io(e, path))?;
        if !meta.is_dir() {
            return Err(Error::NotADirectory(path.to_string()));
        }

        let mut entries = tokio::fs::read_dir(&full_path)
            .await
            .map_err(|e| Error::from_io(e, path))?;
        let mut result = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::from_io(e, path))? {
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                // Removed between read_dir and stat
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::from_io(e, path)),
            };
            let name = entry.file_name().to_string_lossy().to_string();
            let child = if meta.is_dir() {
                format!("{}/", utils::join_path(path, &name))
            } else {
                utils::join_path(path, &name)
            };

            result.push(Entry::new(child, Some(to_metadata(&entry.path(), &meta))));
        }

        result.sort_by(|a, b| a.path().cmp(b.path()));

        Ok(ListPage {
            entries: result,
            next_token: None,
        })
    }

    /// Server-side copy, sync IO in spawn_blocking / 服务端复制
    async fn copy_item(&self, src_path: &str, dst_path: &str) -> Result<()> {
        let src_full = self.normalize_path(src_path)?;
        let dst_full = self.normalize_path(dst_path)?;
        let src_owned = src_path.to_string();
        let dst_owned = dst_path.to_string();
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || {
            let meta = std::fs::metadata(&src_full).map_err(|e| Error::from_io(e, &src_owned))?;
            if meta.is_dir() {
                return Err(Error::IsADirectory(src_owned));
            }
            if dst_full.is_dir() {
                return Err(Error::IsADirectory(dst_owned));
            }
            if has_file_ancestor(&root, &dst_full) {
                return Err(Error::NotADirectory(dst_owned));
            }
            // Ensure target directory exists / 确保目标目录存在
            if let Some(parent) = dst_full.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::from_io(e, &dst_owned))?;
            }
            std::fs::copy(&src_full, &dst_full).map_err(|e| Error::from_io(e, &src_owned))?;
            Ok(())
        })
        .await?
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_full = self.normalize_path(old_path)?;
        let new_full = self.normalize_path(new_path)?;

        let meta = tokio::fs::metadata(&old_full)
            .await
            .map_err(|e| Error::from_io(e, old_path))?;
        if meta.is_dir() {
            return Err(Error::IsADirectory(old_path.to_string()));
        }
        if has_file_ancestor(&self.root, &new_full) {
            return Err(Error::NotADirectory(new_path.to_string()));
        }

        // Ensure target directory exists / 确保目标目录存在
        if let Some(parent) = new_full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::from_io(e, new_path))?;
        }

        tokio::fs::rename(old_full, new_full)
            .await
            .map_err(|e| Error::from_io(e, old_path))
    }
}
