//! S3驱动核心实现
//!
//! - Directories are zero-byte `dir/` marker objects
//! - Listing pages through ListObjectsV2 continuation tokens
//! - Copy is a server-side CopyObject; rename is copy + delete and is not atomic

use std::io::Cursor;
use std::ops::Range;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use s3::Bucket;
use s3::creds::Credentials;
use s3::region::Region;

use crate::error::{Error, Result};
use crate::storage::{Capability, DriverReader, Entry, ListPage, Metadata, StorageDriver};
use crate::utils;
use super::config::S3Config;

/// S3驱动
pub struct S3Driver {
    config: S3Config,
    bucket: Box<Bucket>,
    root: String,
}

/// Translate an HTTP status into the unified taxonomy / 转换HTTP状态码
pub(crate) fn check_status(code: u16, path: &str, action: &str) -> Result<()> {
    match code {
        200..=299 => Ok(()),
        404 => Err(Error::NotFound(path.to_string())),
        401 | 403 => Err(Error::PermissionDenied(path.to_string())),
        408 | 429 | 500..=599 => Err(Error::temporary(
            format!("S3 {} {} failed", action, path),
            anyhow::anyhow!("HTTP status {}", code),
        )),
        _ => Err(Error::backend(
            format!("S3 {} {} failed", action, path),
            anyhow::anyhow!("HTTP status {}", code),
        )),
    }
}

/// Transport failures are treated as transient / 传输错误视为临时错误
fn transport_error(action: &str, path: &str, err: impl std::fmt::Display) -> Error {
    Error::temporary(
        format!("S3 {} {} failed", action, path),
        anyhow::anyhow!("{}", err),
    )
}

/// HEAD returns RFC 2822 dates, listings return RFC 3339 / 解析时间
pub(crate) fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Whether a delimited listing of `prefix` shows entries, the marker object
/// itself counted only when `count_marker` is set / 列表是否有条目
pub(crate) fn listing_has_entries<'a>(
    prefix: &str,
    keys: impl IntoIterator<Item = &'a str>,
    common_prefixes: usize,
    count_marker: bool,
) -> bool {
    common_prefixes > 0 || keys.into_iter().any(|k| count_marker || k != prefix)
}

impl S3Driver {
    /// 创建新的S3驱动实例
    pub fn new(config: S3Config) -> Result<Self> {
        let bucket = Self::create_bucket(&config)?;
        let root = utils::normalize_root(&config.root_path);
        Ok(Self { config, bucket, root })
    }

    /// 创建S3 Bucket客户端
    fn create_bucket(config: &S3Config) -> Result<Box<Bucket>> {
        let credentials = Credentials::new(
            Some(&config.access_key_id),
            Some(&config.secret_access_key),
            if config.session_token.is_empty() { None } else { Some(&config.session_token) },
            None,
            None,
        )
        .map_err(|e| Error::Config(format!("invalid S3 credentials: {}", e)))?;

        let region = if config.endpoint.is_empty() {
            Region::Custom {
                region: config.region.clone(),
                endpoint: format!("https://s3.{}.amazonaws.com", config.region),
            }
        } else {
            Region::Custom {
                region: config.region.clone(),
                endpoint: config.endpoint.clone(),
            }
        };

        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| Error::Config(format!("invalid S3 bucket: {}", e)))?;

        let bucket = if config.force_path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(bucket)
    }

    /// 获取完整的对象键（路径）, keeps the trailing slash of directories
    fn get_object_key(&self, path: &str) -> String {
        let root = self.root.trim_start_matches('/');
        if path == "/" {
            root.to_string()
        } else {
            format!("{}{}", root, path)
        }
    }

    /// Strip the root back off a key / 键转为相对路径
    fn relative_path(&self, key: &str) -> String {
        let root = self.root.trim_start_matches('/');
        key.strip_prefix(root).unwrap_or(key).to_string()
    }

    /// Whether anything exists under a directory key / 目录是否存在
    async fn dir_exists(&self, prefix: &str, path: &str) -> Result<bool> {
        self.scan_dir(prefix, path, 1, true).await
    }

    /// Whether a directory key holds more than its marker / 目录是否非空
    async fn dir_has_children(&self, prefix: &str, path: &str) -> Result<bool> {
        self.scan_dir(prefix, path, 2, false).await
    }

    async fn scan_dir(&self, prefix: &str, path: &str, max_keys: usize, count_marker: bool) -> Result<bool> {
        let (result, code) = self
            .bucket
            .list_page(prefix.to_string(), Some("/".to_string()), None, None, Some(max_keys))
            .await
            .map_err(|e| transport_error("list", path, e))?;
        check_status(code, path, "list")?;

        let common_prefixes = result.common_prefixes.map(|p| p.len()).unwrap_or(0);
        Ok(listing_has_entries(
            prefix,
            result.contents.iter().map(|o| o.key.as_str()),
            common_prefixes,
            count_marker,
        ))
    }
}

#[async_trait]
impl StorageDriver for S3Driver {
    fn name(&self) -> &str {
        "s3"
    }

    fn root(&self) -> &str {
        &self.root
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
            blocking: false,
            read_can_seek: true,
            rename_is_atomic: false,
            copy_is_native: true,
            write_can_content_type: true,
            list_page_size: Some(self.config.page_size),
        }
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let key = self.get_object_key(path);
        if key.is_empty() {
            return Ok(Metadata::dir());
        }

        let (head, code) = self
            .bucket
            .head_object(&key)
            .await
            .map_err(|e| transport_error("head", path, e))?;

        if utils::is_dir_path(path) {
            // Implicit directories have no marker object
            if code == 404 {
                return if self.dir_exists(&key, path).await? {
                    Ok(Metadata::dir())
                } else {
                    Err(Error::NotFound(path.to_string()))
                };
            }
            check_status(code, path, "head")?;
            return Ok(Metadata::dir().with_last_modified(head.last_modified.as_deref().and_then(parse_time)));
        }

        // A key without trailing slash may still name an implicit directory
        if code == 404 {
            return if self.dir_exists(&format!("{}/", key), path).await? {
                Ok(Metadata::dir())
            } else {
                Err(Error::NotFound(path.to_string()))
            };
        }
        check_status(code, path, "head")?;

        let size = head.content_length.unwrap_or(0).max(0) as u64;
        Ok(Metadata::file(size)
            .with_last_modified(head.last_modified.as_deref().and_then(parse_time))
            .with_content_type(head.content_type)
            .with_etag(head.e_tag))
    }

    async fn open_reader(&self, path: &str, range: Option<Range<u64>>) -> Result<DriverReader> {
        let key = self.get_object_key(path);

        // rust-s3返回完整响应，封装为AsyncRead
        let response = match range {
            Some(r) if r.start >= r.end => return Ok(Box::new(Cursor::new(Bytes::new()))),
            // Range end is inclusive on the wire, open-ended reads send `bytes=start-`
            Some(r) => {
                let end = if r.end == u64::MAX { None } else { Some(r.end - 1) };
                self.bucket
                    .get_object_range(&key, r.start, end)
                    .await
                    .map_err(|e| transport_error("get", path, e))?
            }
            None => self
                .bucket
                .get_object(&key)
                .await
                .map_err(|e| transport_error("get", path, e))?,
        };

        // Range starting past the end of the object
        if response.status_code() == 416 {
            return Ok(Box::new(Cursor::new(Bytes::new())));
        }
        check_status(response.status_code(), path, "get")?;

        Ok(Box::new(Cursor::new(response.bytes().clone())))
    }

    async fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        let key = self.get_object_key(path);
        let guessed = mime_guess::from_path(path).first_or_octet_stream();
        let content_type = content_type.unwrap_or_else(|| guessed.essence_str());

        let response = self
            .bucket
            .put_object_with_content_type(&key, &data, content_type)
            .await
            .map_err(|e| transport_error("put", path, e))?;
        check_status(response.status_code(), path, "put")
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let key = self.get_object_key(path);
        if key.is_empty() {
            return Ok(());
        }

        let response = self
            .bucket
            .put_object(&key, &[])
            .await
            .map_err(|e| transport_error("create_dir", path, e))?;
        check_status(response.status_code(), path, "create_dir")
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut key = self.get_object_key(path);
        if key.is_empty() {
            return Err(Error::PermissionDenied("refusing to delete the root".to_string()));
        }

        // DeleteObject succeeds on absent keys, so a slash-less directory
        // name is resolved to its `dir/` key first
        if !utils::is_dir_path(path) {
            let (_, code) = self
                .bucket
                .head_object(&key)
                .await
                .map_err(|e| transport_error("head", path, e))?;
            if code == 404 {
                key.push('/');
            }
        }
        if key.ends_with('/') && self.dir_has_children(&key, path).await? {
            return Err(Error::unexpected(format!("directory not empty: {}", path)));
        }

        let response = self
            .bucket
            .delete_object(&key)
            .await
            .map_err(|e| transport_error("delete", path, e))?;

        match check_status(response.status_code(), path, "delete") {
            Err(Error::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    async fn list_page(&self, path: &str, token: Option<&str>) -> Result<ListPage> {
        let prefix = self.get_object_key(path);

        let (result, code) = self
            .bucket
            .list_page(
                prefix.clone(),
                Some("/".to_string()),
                token.map(str::to_string),
                None,
                Some(self.config.page_size),
            )
            .await
            .map_err(|e| transport_error("list", path, e))?;
        check_status(code, path, "list")?;

        let mut entries = Vec::new();
        let mut saw_marker = false;

        // 处理目录（公共前缀）
        for cp in result.common_prefixes.unwrap_or_default() {
            entries.push(Entry::new(self.relative_path(&cp.prefix), Some(Metadata::dir())));
        }

        // 处理文件
        for obj in result.contents {
            if obj.key == prefix {
                saw_marker = true;
                continue;
            }
            if obj.key.ends_with('/') {
                continue;
            }
            let meta = Metadata::file(obj.size as u64)
                .with_last_modified(parse_time(&obj.last_modified))
                .with_etag(obj.e_tag.clone());
            entries.push(Entry::new(self.relative_path(&obj.key), Some(meta)));
        }

        if token.is_none() && !prefix.is_empty() && entries.is_empty() && !saw_marker {
            return Err(Error::NotFound(path.to_string()));
        }

        entries.sort_by(|a, b| a.path().cmp(b.path()));

        let next_token = if result.is_truncated {
            result.next_continuation_token
        } else {
            None
        };

        Ok(ListPage { entries, next_token })
    }

    /// S3 CopyObject
    async fn copy_item(&self, src: &str, dst: &str) -> Result<()> {
        let src_key = self.get_object_key(src);
        let dst_key = self.get_object_key(dst);
        // copy_object_internal的from参数需要URL编码（中文等非ASCII字符）
        let encoded_src = urlencoding::encode(&src_key);

        tracing::debug!("S3 CopyObject: src_key={}, dst_key={}", src_key, dst_key);

        let code = self
            .bucket
            .copy_object_internal(&encoded_src, &dst_key)
            .await
            .map_err(|e| transport_error("copy", src, e))?;
        check_status(code, src, "copy")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn driver(root: &str) -> S3Driver {
        S3Driver::new(S3Config {
            bucket: "media".to_string(),
            endpoint: "http://127.0.0.1:9000".to_string(),
            access_key_id: "ak".to_string(),
            secret_access_key: "sk".to_string(),
            root_path: root.to_string(),
            force_path_style: true,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_object_key_under_root() {
        let d = driver("/photos/");
        assert_eq!(d.get_object_key("/"), "photos/");
        assert_eq!(d.get_object_key("2024/a.jpg"), "photos/2024/a.jpg");
        assert_eq!(d.get_object_key("2024/"), "photos/2024/");
        assert_eq!(d.relative_path("photos/2024/a.jpg"), "2024/a.jpg");

        let d = driver("/");
        assert_eq!(d.get_object_key("/"), "");
        assert_eq!(d.get_object_key("a.jpg"), "a.jpg");
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(204, "a", "delete").is_ok());
        assert_eq!(check_status(404, "a", "get").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(check_status(403, "a", "get").unwrap_err().kind(), ErrorKind::PermissionDenied);
        assert!(check_status(503, "a", "get").unwrap_err().is_temporary());
        assert!(check_status(429, "a", "get").unwrap_err().is_temporary());
        let err = check_status(400, "a", "get").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(!err.is_temporary());
    }

    #[test]
    fn test_parse_time() {
        let t = parse_time("2009-10-12T17:50:30.000Z").unwrap();
        assert_eq!(t.timestamp(), 1255369830);
        let t = parse_time("Mon, 12 Oct 2009 17:50:30 GMT").unwrap();
        assert_eq!(t.timestamp(), 1255369830);
        assert!(parse_time("yesterday").is_none());
    }

    #[test]
    fn test_listing_has_entries() {
        // Marker only: the directory exists but is empty
        assert!(listing_has_entries("d/", ["d/"], 0, true));
        assert!(!listing_has_entries("d/", ["d/"], 0, false));

        assert!(listing_has_entries("d/", ["d/", "d/a.txt"], 0, false));
        assert!(listing_has_entries("d/", [], 1, false));
        assert!(!listing_has_entries("tree/", [], 0, true));
        assert!(listing_has_entries("tree/", ["tree/a.txt"], 0, true));
    }

    #[test]
    fn test_capability_declares_emulated_rename() {
        let cap = driver("/").capabilities();
        assert!(cap.rename);
        assert!(!cap.rename_is_atomic);
        assert!(!cap.blocking);
    }
}
