use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Layer;
use crate::error::{Error, Result};
use crate::storage::{Capability, DriverBox, DriverReader, ListPage, Metadata, Operation, StorageDriver};

/// Inject temporary failures for fault tests / 故障注入中间层
///
/// Each call fails with a temporary backend error at probability
/// `error_ratio` before it reaches the wrapped driver. A fixed seed makes
/// the failure sequence reproducible.
#[derive(Debug, Clone)]
pub struct ChaosLayer {
    error_ratio: f64,
    seed: Option<u64>,
}

impl ChaosLayer {
    /// `error_ratio` is clamped to `0.0..=1.0` / 故障比例
    pub fn new(error_ratio: f64) -> Self {
        Self {
            error_ratio: error_ratio.clamp(0.0, 1.0),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Layer for ChaosLayer {
    fn layer(&self, inner: DriverBox) -> DriverBox {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Arc::new(ChaosDriver {
            inner,
            error_ratio: self.error_ratio,
            rng: Mutex::new(rng),
        })
    }
}

struct ChaosDriver {
    inner: DriverBox,
    error_ratio: f64,
    rng: Mutex<StdRng>,
}

impl ChaosDriver {
    fn inject(&self, op: Operation, path: &str) -> Result<()> {
        if self.rng.lock().gen_bool(self.error_ratio) {
            tracing::debug!("chaos: failing {} {}", op, path);
            return Err(Error::temporary(
                format!("injected failure on {} {}", op, path),
                anyhow::anyhow!("chaos"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for ChaosDriver {
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
        self.inject(Operation::Stat, path)?;
        self.inner.stat(path).await
    }

    async fn open_reader(&self, path: &str, range: Option<Range<u64>>) -> Result<DriverReader> {
        self.inject(Operation::Read, path)?;
        self.inner.open_reader(path, range).await
    }

    async fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        self.inject(Operation::Write, path)?;
        self.inner.put(path, data, content_type).await
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.inject(Operation::CreateDir, path)?;
        self.inner.create_dir(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inject(Operation::Delete, path)?;
        self.inner.delete(path).await
    }

    async fn list_page(&self, path: &str, token: Option<&str>) -> Result<ListPage> {
        self.inject(Operation::List, path)?;
        self.inner.list_page(path, token).await
    }

    async fn copy_item(&self, src: &str, dst: &str) -> Result<()> {
        self.inject(Operation::Copy, src)?;
        self.inner.copy_item(src, dst).await
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        self.inject(Operation::Rename, src)?;
        self.inner.rename(src, dst).await
    }
}
