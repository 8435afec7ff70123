use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;

use super::Layer;
use crate::error::Result;
use crate::storage::{Capability, DriverBox, DriverReader, ListPage, Metadata, Operation, StorageDriver};

/// Retry temporary failures with exponential backoff / 重试中间层
///
/// Only errors with `is_temporary()` are retried. `max_times` counts
/// retries, so a call runs at most `max_times + 1` times. Opening a reader
/// is retried; bytes already streamed from it are not.
#[derive(Debug, Clone)]
pub struct RetryLayer {
    max_times: usize,
    min_delay: Duration,
    max_delay: Duration,
    factor: f64,
    jitter: bool,
}

impl Default for RetryLayer {
    fn default() -> Self {
        Self {
            max_times: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            factor: 2.0,
            jitter: false,
        }
    }
}

impl RetryLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_times(mut self, max_times: usize) -> Self {
        self.max_times = max_times;
        self
    }

    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Clamped to at least 1.0 / 退避倍数
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor.max(1.0);
        self
    }

    /// Randomize each delay within `[delay / 2, delay]` / 随机抖动
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Delay before retry number `attempt` (0-based) / 计算退避时间
    fn backoff(&self, attempt: usize) -> Duration {
        let exp = self.factor.powi(attempt.min(32) as i32);
        let nanos = (self.min_delay.as_nanos() as f64 * exp).min(self.max_delay.as_nanos() as f64);
        let delay = Duration::from_nanos(nanos as u64);
        if self.jitter && !delay.is_zero() {
            let low = delay / 2;
            rand::thread_rng().gen_range(low..=delay)
        } else {
            delay
        }
    }
}

impl Layer for RetryLayer {
    fn layer(&self, inner: DriverBox) -> DriverBox {
        Arc::new(RetryDriver {
            inner,
            policy: self.clone(),
        })
    }
}

struct RetryDriver {
    inner: DriverBox,
    policy: RetryLayer,
}

impl RetryDriver {
    async fn retry<T, F, Fut>(&self, op: Operation, path: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(e) if e.is_temporary() && attempt < self.policy.max_times => {
                    let delay = self.policy.backoff(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "{} {} failed, retry {}/{} in {:?}: {}",
                        op,
                        path,
                        attempt,
                        self.policy.max_times,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl StorageDriver for RetryDriver {
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
        self.retry(Operation::Stat, path, || self.inner.stat(path)).await
    }

    async fn open_reader(&self, path: &str, range: Option<Range<u64>>) -> Result<DriverReader> {
        self.retry(Operation::Read, path, || self.inner.open_reader(path, range.clone()))
            .await
    }

    async fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        self.retry(Operation::Write, path, || {
            self.inner.put(path, data.clone(), content_type)
        })
        .await
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.retry(Operation::CreateDir, path, || self.inner.create_dir(path))
            .await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.retry(Operation::Delete, path, || self.inner.delete(path)).await
    }

    async fn list_page(&self, path: &str, token: Option<&str>) -> Result<ListPage> {
        self.retry(Operation::List, path, || self.inner.list_page(path, token))
            .await
    }

    async fn copy_item(&self, src: &str, dst: &str) -> Result<()> {
        self.retry(Operation::Copy, src, || self.inner.copy_item(src, dst))
            .await
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        self.retry(Operation::Rename, src, || self.inner.rename(src, dst))
            .await
    }
}
