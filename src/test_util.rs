//! Mock drivers shared by unit tests / 测试用驱动

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::drivers::memory::MemoryDriver;
use crate::error::{Error, Result};
use crate::storage::{Capability, DriverReader, ListPage, Metadata, StorageDriver};

/// Route `tracing` output to the test harness, `RUST_LOG` filtered
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Declares nothing and panics if any operation reaches it
pub struct PanicDriver;

#[async_trait]
impl StorageDriver for PanicDriver {
    fn name(&self) -> &str {
        "panic"
    }

    fn capabilities(&self) -> Capability {
        Capability::default()
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        panic!("stat({}) reached the driver", path)
    }

    async fn open_reader(&self, path: &str, _range: Option<Range<u64>>) -> Result<DriverReader> {
        panic!("open_reader({}) reached the driver", path)
    }

    async fn put(&self, path: &str, _data: Bytes, _content_type: Option<&str>) -> Result<()> {
        panic!("put({}) reached the driver", path)
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        panic!("create_dir({}) reached the driver", path)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        panic!("delete({}) reached the driver", path)
    }

    async fn list_page(&self, path: &str, _token: Option<&str>) -> Result<ListPage> {
        panic!("list_page({}) reached the driver", path)
    }

    async fn copy_item(&self, src: &str, _dst: &str) -> Result<()> {
        panic!("copy_item({}) reached the driver", src)
    }

    async fn rename(&self, src: &str, _dst: &str) -> Result<()> {
        panic!("rename({}) reached the driver", src)
    }
}

/// Memory driver whose first `failures` calls fail with a temporary error
pub struct FlakyDriver {
    inner: MemoryDriver,
    remaining: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyDriver {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: MemoryDriver::new(),
            remaining: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Calls that reached this driver, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn attempt(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Error::temporary("flaky backend", anyhow::anyhow!("503 Slow Down")));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for FlakyDriver {
    fn name(&self) -> &str {
        "flaky"
    }

    fn capabilities(&self) -> Capability {
        self.inner.capabilities()
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        self.attempt()?;
        self.inner.stat(path).await
    }

    async fn open_reader(&self, path: &str, range: Option<Range<u64>>) -> Result<DriverReader> {
        self.attempt()?;
        self.inner.open_reader(path, range).await
    }

    async fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        self.attempt()?;
        self.inner.put(path, data, content_type).await
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.attempt()?;
        self.inner.create_dir(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.attempt()?;
        self.inner.delete(path).await
    }

    async fn list_page(&self, path: &str, token: Option<&str>) -> Result<ListPage> {
        self.attempt()?;
        self.inner.list_page(path, token).await
    }
}

/// Memory driver that sleeps before every call
pub struct SlowDriver {
    inner: MemoryDriver,
    delay: Duration,
}

impl SlowDriver {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryDriver::new(),
            delay,
        }
    }
}

#[async_trait]
impl StorageDriver for SlowDriver {
    fn name(&self) -> &str {
        "slow"
    }

    fn capabilities(&self) -> Capability {
        self.inner.capabilities()
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        tokio::time::sleep(self.delay).await;
        self.inner.stat(path).await
    }

    async fn open_reader(&self, path: &str, range: Option<Range<u64>>) -> Result<DriverReader> {
        tokio::time::sleep(self.delay).await;
        self.inner.open_reader(path, range).await
    }

    async fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(path, data, content_type).await
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.create_dir(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(path).await
    }

    async fn list_page(&self, path: &str, token: Option<&str>) -> Result<ListPage> {
        tokio::time::sleep(self.delay).await;
        self.inner.list_page(path, token).await
    }
}
