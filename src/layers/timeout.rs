use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::Layer;
use crate::error::{Error, Result};
use crate::storage::{Capability, DriverBox, DriverReader, ListPage, Metadata, Operation, StorageDriver};

/// Per-call deadline / 超时中间层
///
/// The in-flight call is dropped at the deadline, which releases whatever
/// it held, and the caller gets a temporary backend error that a retry
/// layer above may retry. Reading from an opened stream is not bounded.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutLayer {
    timeout: Duration,
}

impl TimeoutLayer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Layer for TimeoutLayer {
    fn layer(&self, inner: DriverBox) -> DriverBox {
        Arc::new(TimeoutDriver {
            inner,
            timeout: self.timeout,
        })
    }
}

struct TimeoutDriver {
    inner: DriverBox,
    timeout: Duration,
}

impl TimeoutDriver {
    async fn run<T>(&self, op: Operation, path: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(elapsed) => {
                tracing::warn!("{} {} timed out after {:?}", op, path, self.timeout);
                Err(Error::temporary(
                    format!("{} {} timed out after {:?}", op, path, self.timeout),
                    elapsed,
                ))
            }
        }
    }
}

#[async_trait]
impl StorageDriver for TimeoutDriver {
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
        self.run(Operation::Stat, path, self.inner.stat(path)).await
    }

    async fn open_reader(&self, path: &str, range: Option<Range<u64>>) -> Result<DriverReader> {
        self.run(Operation::Read, path, self.inner.open_reader(path, range))
            .await
    }

    async fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        self.run(Operation::Write, path, self.inner.put(path, data, content_type))
            .await
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.run(Operation::CreateDir, path, self.inner.create_dir(path))
            .await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.run(Operation::Delete, path, self.inner.delete(path)).await
    }

    async fn list_page(&self, path: &str, token: Option<&str>) -> Result<ListPage> {
        self.run(Operation::List, path, self.inner.list_page(path, token))
            .await
    }

    async fn copy_item(&self, src: &str, dst: &str) -> Result<()> {
        self.run(Operation::Copy, src, self.inner.copy_item(src, dst))
            .await
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        self.run(Operation::Rename, src, self.inner.rename(src, dst))
            .await
    }
}
