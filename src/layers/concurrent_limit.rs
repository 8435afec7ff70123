use std::ops::Range;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::Layer;
use crate::error::{Error, Result};
use crate::storage::{Capability, DriverBox, DriverReader, ListPage, Metadata, StorageDriver};

/// Bound the number of in-flight driver calls / 并发限制中间层
///
/// Excess calls wait for a permit. An opened reader keeps its permit until
/// it is dropped, so open streams count against the limit.
#[derive(Clone)]
pub struct ConcurrentLimitLayer {
    semaphore: Arc<Semaphore>,
}

impl ConcurrentLimitLayer {
    /// `permits` is raised to at least 1 / 最大并发数
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    /// Permits currently free / 可用许可数
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Layer for ConcurrentLimitLayer {
    fn layer(&self, inner: DriverBox) -> DriverBox {
        Arc::new(ConcurrentLimitDriver {
            inner,
            semaphore: self.semaphore.clone(),
        })
    }
}

struct ConcurrentLimitDriver {
    inner: DriverBox,
    semaphore: Arc<Semaphore>,
}

impl ConcurrentLimitDriver {
    async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Cancelled)
    }
}

/// Reader holding a permit for its lifetime / 持有许可的读取器
struct PermitReader {
    inner: DriverReader,
    _permit: OwnedSemaphorePermit,
}

impl AsyncRead for PermitReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

#[async_trait]
impl StorageDriver for ConcurrentLimitDriver {
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
        let _permit = self.acquire().await?;
        self.inner.stat(path).await
    }

    async fn open_reader(&self, path: &str, range: Option<Range<u64>>) -> Result<DriverReader> {
        let permit = self.acquire().await?;
        let inner = self.inner.open_reader(path, range).await?;
        Ok(Box::new(PermitReader {
            inner,
            _permit: permit,
        }))
    }

    async fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        let _permit = self.acquire().await?;
        self.inner.put(path, data, content_type).await
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let _permit = self.acquire().await?;
        self.inner.create_dir(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let _permit = self.acquire().await?;
        self.inner.delete(path).await
    }

    async fn list_page(&self, path: &str, token: Option<&str>) -> Result<ListPage> {
        let _permit = self.acquire().await?;
        self.inner.list_page(path, token).await
    }

    async fn copy_item(&self, src: &str, dst: &str) -> Result<()> {
        let _permit = self.acquire().await?;
        self.inner.copy_item(src, dst).await
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let _permit = self.acquire().await?;
        self.inner.rename(src, dst).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigMap;
    use crate::layers::TimeoutLayer;
    use crate::test_util::SlowDriver;
    use crate::Operator;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reader_holds_permit() {
        let limit = ConcurrentLimitLayer::new(1);
        let op = Operator::new("memory", &ConfigMap::new())
            .unwrap()
            .layer(limit.clone());
        op.write("a", "x").await.unwrap();

        let reader = op.reader("a").await.unwrap();
        assert_eq!(limit.available(), 0);

        // Blocked until the reader is dropped
        let blocked = tokio::time::timeout(Duration::from_millis(50), op.stat("a")).await;
        assert!(blocked.is_err());

        drop(reader);
        assert_eq!(limit.available(), 1);
        assert!(op.stat("a").await.unwrap().is_file());
    }

    #[tokio::test]
    async fn test_parallel_calls_complete() {
        let op = Operator::new("memory", &ConfigMap::new())
            .unwrap()
            .layer(ConcurrentLimitLayer::new(2));

        let mut handles = Vec::new();
        for i in 0..8 {
            let op = op.clone();
            handles.push(tokio::spawn(async move {
                op.write(&format!("p/{}", i), "x").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(op.list("p/").await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_cancelled_call_releases_permit() {
        let limit = ConcurrentLimitLayer::new(1);
        let op = Operator::from_driver(Arc::new(SlowDriver::new(Duration::from_secs(5))))
            .layer(limit.clone());

        let cancelled = tokio::time::timeout(Duration::from_millis(20), op.stat("a")).await;
        assert!(cancelled.is_err());
        assert_eq!(limit.available(), 1);

        // Same through a timeout layer stacked on top
        let op = op.layer(TimeoutLayer::new(Duration::from_millis(20)));
        assert!(op.stat("a").await.unwrap_err().is_temporary());
        assert_eq!(limit.available(), 1);
    }
}
