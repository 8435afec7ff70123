use std::io::SeekFrom;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio_util::io::ReaderStream;

use crate::error::{Error, Result};
use crate::storage::{DriverBox, DriverReader, Operation};

/// Streaming reader over one object / 流式读取器
///
/// Tracks its own position. Seeking reopens the object at the new offset,
/// which needs `read_can_seek`. Dropping the reader releases the backend
/// stream.
pub struct Reader {
    driver: DriverBox,
    path: String,
    inner: DriverReader,
    pos: u64,
    can_seek: bool,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("path", &self.path)
            .field("pos", &self.pos)
            .finish()
    }
}

impl Reader {
    pub(crate) fn new(driver: DriverBox, path: String, inner: DriverReader, can_seek: bool) -> Self {
        Self {
            driver,
            path,
            inner,
            pos: 0,
            can_seek,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Bytes consumed so far, seeks included / 当前位置
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Move to a new offset / 定位
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if !self.can_seek {
            return Err(Error::unsupported(self.driver.name().to_string(), Operation::Read));
        }

        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let size = self.driver.stat(&self.path).await?.size();
                size.checked_add_signed(delta)
            }
        };
        let target = target.ok_or_else(|| {
            Error::unexpected(format!("{}: seek to a negative offset", self.path))
        })?;

        if target != self.pos {
            self.inner = self.driver.open_reader(&self.path, Some(target..u64::MAX)).await?;
            self.pos = target;
        }
        Ok(self.pos)
    }

    /// Read everything from the current position / 读取剩余内容
    pub async fn read_all(&mut self) -> Result<Bytes> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)
            .await
            .map_err(|e| Error::from_io(e, &self.path))?;
        Ok(Bytes::from(buf))
    }

    /// Chunked byte stream / 转为字节流
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send + Unpin {
        let path = self.path.clone();
        ReaderStream::new(self).map_err(move |e| Error::from_io(e, &path))
    }

    /// Release the backend stream now instead of at drop / 关闭
    pub fn close(self) {
        tracing::debug!("reader closed: {} at {}", self.path, self.pos);
    }
}

impl AsyncRead for Reader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                this.pos += (buf.filled().len() - before) as u64;
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::memory::MemoryDriver;
    use futures::StreamExt;
    use std::sync::Arc;

    async fn reader(content: &'static [u8]) -> Reader {
        let driver: DriverBox = Arc::new(MemoryDriver::new());
        driver.put("f.bin", Bytes::from_static(content), None).await.unwrap();
        let inner = driver.open_reader("f.bin", None).await.unwrap();
        Reader::new(driver, "f.bin".to_string(), inner, true)
    }

    #[tokio::test]
    async fn test_partial_reads_end_with_zero() {
        let mut r = reader(b"abcde").await;
        let mut buf = [0u8; 2];
        assert_eq!(r.read(&mut buf).await.unwrap(), 2);
        assert_eq!(r.read(&mut buf).await.unwrap(), 2);
        assert_eq!(r.read(&mut buf).await.unwrap(), 1);
        assert_eq!(r.read(&mut buf).await.unwrap(), 0);
        assert_eq!(r.position(), 5);
    }

    #[tokio::test]
    async fn test_seek_negative_is_error() {
        let mut r = reader(b"abc").await;
        assert!(r.seek(SeekFrom::Current(-1)).await.is_err());
        assert_eq!(r.seek(SeekFrom::Start(10)).await.unwrap(), 10);
        assert_eq!(r.read_all().await.unwrap(), Bytes::new());
    }

    #[tokio::test]
    async fn test_into_stream() {
        let r = reader(b"streamed").await;
        let chunks: Vec<Bytes> = r.into_stream().map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.concat(), b"streamed");
    }
}
