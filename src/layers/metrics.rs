use std::ops::Range;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncRead, ReadBuf};

use super::Layer;
use crate::error::Result;
use crate::storage::{Capability, DriverBox, DriverReader, ListPage, Metadata, Operation, StorageDriver};

#[derive(Default)]
struct Counters {
    calls: AtomicU64,
    errors: AtomicU64,
    bytes: AtomicU64,
    nanos: AtomicU64,
}

/// Point-in-time counters of one operation / 单个操作的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperationStats {
    pub calls: u64,
    pub errors: u64,
    /// Bytes written, or bytes streamed out of opened readers / 传输字节数
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Per-operation counters shared between a `MetricsLayer` and its caller / 操作统计
#[derive(Default)]
pub struct OperatorMetrics {
    counters: [Counters; Operation::ALL.len()],
}

impl OperatorMetrics {
    pub fn stats(&self, op: Operation) -> OperationStats {
        let c = &self.counters[op.index()];
        OperationStats {
            calls: c.calls.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            bytes: c.bytes.load(Ordering::Relaxed),
            elapsed: Duration::from_nanos(c.nanos.load(Ordering::Relaxed)),
        }
    }

    /// Every operation with at least one call / 所有有调用的操作
    pub fn snapshot(&self) -> Vec<(Operation, OperationStats)> {
        Operation::ALL
            .iter()
            .map(|op| (*op, self.stats(*op)))
            .filter(|(_, s)| s.calls > 0)
            .collect()
    }

    fn record<T>(&self, op: Operation, started: Instant, result: &Result<T>) {
        let c = &self.counters[op.index()];
        c.calls.fetch_add(1, Ordering::Relaxed);
        c.nanos
            .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);
        if result.is_err() {
            c.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn add_bytes(&self, op: Operation, n: u64) {
        self.counters[op.index()].bytes.fetch_add(n, Ordering::Relaxed);
    }
}

/// Count calls, failures, bytes and latency per operation / 统计中间层
#[derive(Clone, Default)]
pub struct MetricsLayer {
    metrics: Arc<OperatorMetrics>,
}

impl MetricsLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the counters, valid after the layer is consumed / 获取统计句柄
    pub fn metrics(&self) -> Arc<OperatorMetrics> {
        self.metrics.clone()
    }
}

impl Layer for MetricsLayer {
    fn layer(&self, inner: DriverBox) -> DriverBox {
        Arc::new(MetricsDriver {
            inner,
            metrics: self.metrics.clone(),
        })
    }
}

struct MetricsDriver {
    inner: DriverBox,
    metrics: Arc<OperatorMetrics>,
}

/// Counts bytes as they are read / 统计读取字节
struct CountingReader {
    inner: DriverReader,
    metrics: Arc<OperatorMetrics>,
}

impl AsyncRead for CountingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            this.metrics
                .add_bytes(Operation::Read, (buf.filled().len() - before) as u64);
        }
        poll
    }
}

#[async_trait]
impl StorageDriver for MetricsDriver {
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
        self.metrics.record(Operation::Stat, started, &result);
        result
    }

    async fn open_reader(&self, path: &str, range: Option<Range<u64>>) -> Result<DriverReader> {
        let started = Instant::now();
        let result = self.inner.open_reader(path, range).await;
        self.metrics.record(Operation::Read, started, &result);
        let inner = result?;
        Ok(Box::new(CountingReader {
            inner,
            metrics: self.metrics.clone(),
        }))
    }

    async fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        let started = Instant::now();
        let len = data.len() as u64;
        let result = self.inner.put(path, data, content_type).await;
        self.metrics.record(Operation::Write, started, &result);
        if result.is_ok() {
            self.metrics.add_bytes(Operation::Write, len);
        }
        result
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.create_dir(path).await;
        self.metrics.record(Operation::CreateDir, started, &result);
        result
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.delete(path).await;
        self.metrics.record(Operation::Delete, started, &result);
        result
    }

    async fn list_page(&self, path: &str, token: Option<&str>) -> Result<ListPage> {
        let started = Instant::now();
        let result = self.inner.list_page(path, token).await;
        self.metrics.record(Operation::List, started, &result);
        result
    }

    async fn copy_item(&self, src: &str, dst: &str) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.copy_item(src, dst).await;
        self.metrics.record(Operation::Copy, started, &result);
        result
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.rename(src, dst).await;
        self.metrics.record(Operation::Rename, started, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigMap;
    use crate::Operator;

    #[tokio::test]
    async fn test_counts_calls_errors_and_bytes() {
        let layer = MetricsLayer::new();
        let metrics = layer.metrics();
        let op = Operator::new("memory", &ConfigMap::new()).unwrap().layer(layer);

        op.write("m.txt", "12345").await.unwrap();
        assert_eq!(op.read("m.txt").await.unwrap(), "12345");
        assert!(op.read("nope.txt").await.is_err());

        let write = metrics.stats(Operation::Write);
        assert_eq!((write.calls, write.errors, write.bytes), (1, 0, 5));

        let read = metrics.stats(Operation::Read);
        assert_eq!((read.calls, read.errors, read.bytes), (2, 1, 5));

        let ops: Vec<Operation> = metrics.snapshot().into_iter().map(|(op, _)| op).collect();
        assert_eq!(ops, vec![Operation::Read, Operation::Write]);
    }

    #[tokio::test]
    async fn test_native_copy_is_forwarded() {
        let layer = MetricsLayer::new();
        let metrics = layer.metrics();
        let op = Operator::new("memory", &ConfigMap::new()).unwrap().layer(layer);

        op.write("a", "x").await.unwrap();
        op.copy("a", "b").await.unwrap();

        assert_eq!(metrics.stats(Operation::Copy).calls, 1);
        // No stream copy underneath
        assert_eq!(metrics.stats(Operation::Read).calls, 0);
    }
}
