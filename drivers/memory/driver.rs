use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::ops::{Bound, Range};

use crate::error::{Error, Result};
use crate::storage::{Capability, DriverReader, Entry, ListPage, Metadata, StorageDriver};

/// Default entries per list page / 默认分页大小
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone)]
struct MemoryObject {
    content: Bytes,
    content_type: Option<String>,
    etag: String,
    last_modified: DateTime<Utc>,
}

impl MemoryObject {
    fn new(content: Bytes, content_type: Option<&str>) -> Self {
        Self {
            etag: format!("\"{:x}\"", md5::compute(&content)),
            content,
            content_type: content_type.map(str::to_string),
            last_modified: Utc::now(),
        }
    }

    fn metadata(&self) -> Metadata {
        Metadata::file(self.content.len() as u64)
            .with_last_modified(Some(self.last_modified))
            .with_content_type(self.content_type.clone())
            .with_etag(Some(self.etag.clone()))
    }
}

/// In-memory driver / 内存存储驱动
///
/// Keys are normalized paths. A key ending with `/` is an explicit
/// directory marker; any key below a prefix makes that prefix an implicit
/// directory. Every mutation happens under one write lock, so rename is
/// atomic.
pub struct MemoryDriver {
    objects: RwLock<BTreeMap<String, MemoryObject>>,
    page_size: usize,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Number of stored keys, directory markers included / 键数量
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory prefix of a path, `""` for the root / 目录前缀
fn dir_prefix(path: &str) -> String {
    if path == "/" || path.is_empty() {
        String::new()
    } else if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Whether anything lives at or under `prefix` / 目录是否存在
fn dir_exists(objects: &BTreeMap<String, MemoryObject>, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    objects
        .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        .next()
        .map(|(k, _)| k.starts_with(prefix))
        .unwrap_or(false)
}

/// Whether `prefix` holds anything besides its own marker / 目录是否非空
fn dir_has_children(objects: &BTreeMap<String, MemoryObject>, prefix: &str) -> bool {
    objects
        .range::<str, _>((Bound::Excluded(prefix), Bound::Unbounded))
        .next()
        .map(|(k, _)| k.starts_with(prefix))
        .unwrap_or(false)
}

/// Whether some ancestor of `path` is stored as a file / 祖先是否为文件
fn has_file_ancestor(objects: &BTreeMap<String, MemoryObject>, path: &str) -> bool {
    let trimmed = path.trim_end_matches('/');
    trimmed
        .match_indices('/')
        .any(|(pos, _)| objects.contains_key(&trimmed[..pos]))
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
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
            write_can_content_type: true,
            list_page_size: Some(self.page_size),
        }
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let objects = self.objects.read();

        if path == "/" {
            return Ok(Metadata::dir());
        }
        if path.ends_with('/') {
            if objects.contains_key(path.trim_end_matches('/')) {
                return Err(Error::NotADirectory(path.to_string()));
            }
            return if dir_exists(&objects, &dir_prefix(path)) {
                Ok(Metadata::dir())
            } else {
                Err(Error::NotFound(path.to_string()))
            };
        }

        if let Some(obj) = objects.get(path) {
            return Ok(obj.metadata());
        }
        if dir_exists(&objects, &dir_prefix(path)) {
            return Ok(Metadata::dir());
        }
        Err(Error::NotFound(path.to_string()))
    }

    async fn open_reader(&self, path: &str, range: Option<Range<u64>>) -> Result<DriverReader> {
        let objects = self.objects.read();
        let obj = match objects.get(path) {
            Some(obj) => obj,
            None if dir_exists(&objects, &dir_prefix(path)) => {
                return Err(Error::IsADirectory(path.to_string()))
            }
            None => return Err(Error::NotFound(path.to_string())),
        };

        let len = obj.content.len() as u64;
        let content = match range {
            Some(r) => {
                let start = r.start.min(len) as usize;
                let end = r.end.min(len).max(r.start.min(len)) as usize;
                obj.content.slice(start..end)
            }
            None => obj.content.clone(),
        };

        Ok(Box::new(Cursor::new(content)))
    }

    async fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        let mut objects = self.objects.write();
        if dir_exists(&objects, &dir_prefix(path)) {
            return Err(Error::IsADirectory(path.to_string()));
        }
        if has_file_ancestor(&objects, path) {
            return Err(Error::NotADirectory(path.to_string()));
        }
        objects.insert(path.to_string(), MemoryObject::new(data, content_type));
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let prefix = dir_prefix(path);
        if prefix.is_empty() {
            return Ok(());
        }

        let mut objects = self.objects.write();
        if objects.contains_key(prefix.trim_end_matches('/')) || has_file_ancestor(&objects, &prefix) {
            return Err(Error::NotADirectory(path.to_string()));
        }
        if !objects.contains_key(&prefix) {
            objects.insert(prefix, MemoryObject::new(Bytes::new(), None));
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut objects = self.objects.write();

        if !path.ends_with('/') && objects.remove(path).is_some() {
            return Ok(());
        }

        // Directory, named with or without its trailing slash
        let prefix = dir_prefix(path);
        if dir_has_children(&objects, &prefix) {
            return Err(Error::unexpected(format!("directory not empty: {}", path)));
        }
        objects.remove(&prefix);
        Ok(())
    }

    async fn list_page(&self, path: &str, token: Option<&str>) -> Result<ListPage> {
        let objects = self.objects.read();
        let prefix = dir_prefix(path);

        if !prefix.is_empty() {
            if objects.contains_key(prefix.trim_end_matches('/')) {
                return Err(Error::NotADirectory(path.to_string()));
            }
            if !dir_exists(&objects, &prefix) {
                return Err(Error::NotFound(path.to_string()));
            }
        }

        let start = match token {
            Some(t) => Bound::Excluded(t),
            None => Bound::Included(prefix.as_str()),
        };

        let mut entries: Vec<Entry> = Vec::new();
        let mut has_more = false;

        for (key, obj) in objects.range::<str, _>((start, Bound::Unbounded)) {
            if !key.starts_with(&prefix) {
                break;
            }
            let rest = &key[prefix.len()..];
            if rest.is_empty() {
                continue;
            }

            let (child, is_dir) = match rest.find('/') {
                Some(pos) => (&key[..prefix.len() + pos + 1], true),
                None => (key.as_str(), false),
            };

            // Keys below an already emitted directory / 已输出的目录
            if Some(child) == token || entries.last().map(|e| e.path()) == Some(child) {
                continue;
            }
            if entries.len() == self.page_size {
                has_more = true;
                break;
            }

            let meta = if is_dir { Metadata::dir() } else { obj.metadata() };
            entries.push(Entry::new(child, Some(meta)));
        }

        let next_token = if has_more {
            entries.last().map(|e| e.path().to_string())
        } else {
            None
        };

        Ok(ListPage { entries, next_token })
    }

    async fn copy_item(&self, src: &str, dst: &str) -> Result<()> {
        let mut objects = self.objects.write();
        let obj = match objects.get(src) {
            Some(obj) => obj.clone(),
            None if dir_exists(&objects, &dir_prefix(src)) => {
                return Err(Error::IsADirectory(src.to_string()))
            }
            None => return Err(Error::NotFound(src.to_string())),
        };
        if dir_exists(&objects, &dir_prefix(dst)) {
            return Err(Error::IsADirectory(dst.to_string()));
        }
        if has_file_ancestor(&objects, dst) {
            return Err(Error::NotADirectory(dst.to_string()));
        }
        objects.insert(dst.to_string(), MemoryObject { last_modified: Utc::now(), ..obj });
        Ok(())
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let mut objects = self.objects.write();
        if !objects.contains_key(src) {
            return if dir_exists(&objects, &dir_prefix(src)) {
                Err(Error::IsADirectory(src.to_string()))
            } else {
                Err(Error::NotFound(src.to_string()))
            };
        }
        if dir_exists(&objects, &dir_prefix(dst)) {
            return Err(Error::IsADirectory(dst.to_string()));
        }
        if has_file_ancestor(&objects, dst) {
            return Err(Error::NotADirectory(dst.to_string()));
        }
        if let Some(obj) = objects.remove(src) {
            objects.insert(dst.to_string(), obj);
        }
        Ok(())
    }
}
