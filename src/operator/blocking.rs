//! Blocking call style / 阻塞调用接口
//!
//! Every call drives the async operator on a private current-thread runtime,
//! so these types must not be used from inside another tokio runtime.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncReadExt;
use tokio::runtime::Runtime;

use super::{Lister, Operator, Reader};
use crate::error::{Error, Result};
use crate::storage::{Entry, Metadata};

/// Synchronous operator / 阻塞操作器
#[derive(Clone)]
pub struct BlockingOperator {
    op: Operator,
    rt: Arc<Runtime>,
}

impl std::fmt::Debug for BlockingOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingOperator").field("op", &self.op).finish()
    }
}

impl BlockingOperator {
    pub(super) fn new(op: Operator) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::backend("failed to start blocking runtime", e))?;
        Ok(Self {
            op,
            rt: Arc::new(rt),
        })
    }

    /// The async operator behind this one / 对应的异步操作器
    pub fn operator(&self) -> &Operator {
        &self.op
    }

    pub fn read(&self, path: &str) -> Result<Bytes> {
        self.rt.block_on(self.op.read(path))
    }

    pub fn write(&self, path: &str, data: impl Into<Bytes>) -> Result<()> {
        self.rt.block_on(self.op.write(path, data))
    }

    pub fn is_exist(&self, path: &str) -> Result<bool> {
        self.rt.block_on(self.op.is_exist(path))
    }

    pub fn create_dir(&self, path: &str) -> Result<()> {
        self.rt.block_on(self.op.create_dir(path))
    }

    pub fn copy(&self, src: &str, dst: &str) -> Result<()> {
        self.rt.block_on(self.op.copy(src, dst))
    }

    pub fn rename(&self, src: &str, dst: &str) -> Result<()> {
        self.rt.block_on(self.op.rename(src, dst))
    }

    pub fn remove(&self, path: &str) -> Result<()> {
        self.rt.block_on(self.op.remove(path))
    }

    pub fn remove_all(&self, path: &str) -> Result<()> {
        self.rt.block_on(self.op.remove_all(path))
    }

    pub fn stat(&self, path: &str) -> Result<Metadata> {
        self.rt.block_on(self.op.stat(path))
    }

    pub fn list(&self, path: &str) -> Result<Vec<Entry>> {
        self.rt.block_on(self.op.list(path))
    }

    pub fn lister(&self, path: &str) -> Result<BlockingLister> {
        let inner = self.rt.block_on(self.op.lister(path))?;
        Ok(BlockingLister {
            rt: self.rt.clone(),
            inner,
        })
    }

    pub fn reader(&self, path: &str) -> Result<BlockingReader> {
        let inner = self.rt.block_on(self.op.reader(path))?;
        Ok(BlockingReader {
            rt: self.rt.clone(),
            inner,
        })
    }
}

/// `std::io` reader / 阻塞读取器
pub struct BlockingReader {
    rt: Arc<Runtime>,
    inner: Reader,
}

impl Read for BlockingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.rt.block_on(self.inner.read(buf))
    }
}

impl Seek for BlockingReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.rt.block_on(self.inner.seek(pos)).map_err(io::Error::from)
    }
}

/// Iterator over directory entries / 阻塞目录迭代器
pub struct BlockingLister {
    rt: Arc<Runtime>,
    inner: Lister,
}

impl Iterator for BlockingLister {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rt.block_on(self.inner.next())
    }
}
