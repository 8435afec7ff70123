use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;

use super::Layer;
use crate::error::{Error, Result};
use crate::storage::{Capability, DriverBox, DriverReader, ListPage, Metadata, Operation, StorageDriver};

/// Log every driver call through `tracing` / 日志中间层
///
/// Finished calls log at `debug`, failures at `warn`. `NotFound` is an
/// ordinary answer and stays at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer;

impl LoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl Layer for LoggingLayer {
    fn layer(&self, inner: DriverBox) -> DriverBox {
        Arc::new(LoggingDriver { inner })
    }
}

struct LoggingDriver {
    inner: DriverBox,
}

impl LoggingDriver {
    fn log<T>(&self, op: Operation, path: &str, started: Instant, result: &Result<T>) {
        let elapsed_ms = started.elapsed().as_millis();
        match result {
            Ok(_) => tracing::debug!(
                "[{}] {} {} finished in {}ms",
                self.inner.name(),
                op,
                path,
                elapsed_ms
            ),
            Err(e @ Error::NotFound(_)) => tracing::debug!(
                "[{}] {} {} -> {} ({}ms)",
                self.inner.name(),
                op,
                path,
                e,
                elapsed_ms
            ),
            Err(e) => tracing::warn!(
                "[{}] {} {} failed after {}ms: {} (temporary: {})",
                self.inner.name(),
                op,
                path,
                elapsed_ms,
                e,
                e.is_temporary()
            ),
        }
    }
}

#[async_trait]
impl StorageDriver for LoggingDriver {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn root(&self) -> &str {
        self.inner.root()
    }

    fn capabilities(&self) -> Capability {
        self.inner.capabilities()
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let started = Instant::now();
        let result = self.inner.stat(path).await;
        self.log(Operation::Stat, path, started, &result);
        result
    }

    async fn open_reader(&self, path: &str, range: Option<Range<u64>>) -> Result<DriverReader> {
        let started = Instant::now();
        let result = self.inner.open_reader(path, range.clone()).await;
        match &range {
            Some(r) => self.log(Operation::Read, &format!("{} [{}..{}]", path, r.start, r.end), started, &result),
            None => self.log(Operation::Read, path, started, &result),
        }
        result
    }

    async fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        let started = Instant::now();
        let len = data.len();
        let result = self.inner.put(path, data, content_type).await;
        self.log(Operation::Write, &format!("{} ({} bytes)", path, len), started, &result);
        result
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.create_dir(path).await;
        self.log(Operation::CreateDir, path, started, &result);
        result
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.delete(path).await;
        self.log(Operation::Delete, path, started, &result);
        result
    }

    async fn list_page(&self, path: &str, token: Option<&str>) -> Result<ListPage> {
        let started = Instant::now();
        let result = self.inner.list_page(path, token).await;
        self.log(Operation::List, path, started, &result);
        result
    }

    async fn copy_item(&self, src: &str, dst: &str) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.copy_item(src, dst).await;
        self.log(Operation::Copy, &format!("{} -> {}", src, dst), started, &result);
        result
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.rename(src, dst).await;
        self.log(Operation::Rename, &format!("{} -> {}", src, dst), started, &result);
        result
    }
}
