use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::{FutureExt, Stream};

use crate::error::Result;
use crate::storage::{DriverBox, Entry, ListPage};

/// Lazy directory listing / 流式目录列表
///
/// Pages are fetched from the driver only when the buffered entries run out.
/// The stream ends after the page without a continuation token; an error
/// also ends it.
pub struct Lister {
    driver: DriverBox,
    path: String,
    buffer: VecDeque<Entry>,
    token: Option<String>,
    pending: Option<BoxFuture<'static, Result<ListPage>>>,
    done: bool,
}

impl std::fmt::Debug for Lister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lister")
            .field("path", &self.path)
            .field("buffered", &self.buffer.len())
            .field("done", &self.done)
            .finish()
    }
}

impl Lister {
    pub(crate) fn new(driver: DriverBox, path: String) -> Self {
        Self {
            driver,
            path,
            buffer: VecDeque::new(),
            token: None,
            pending: None,
            done: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn fetch(&self) -> BoxFuture<'static, Result<ListPage>> {
        let driver = self.driver.clone();
        let path = self.path.clone();
        let token = self.token.clone();
        Box::pin(async move { driver.list_page(&path, token.as_deref()).await })
    }
}

impl Stream for Lister {
    type Item = Result<Entry>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(entry) = this.buffer.pop_front() {
                return Poll::Ready(Some(Ok(entry)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            let mut fut = match this.pending.take() {
                Some(fut) => fut,
                None => this.fetch(),
            };
            match fut.poll_unpin(cx) {
                Poll::Pending => {
                    this.pending = Some(fut);
                    return Poll::Pending;
                }
                Poll::Ready(Ok(page)) => {
                    tracing::debug!(
                        "list page: {} ({} entries, more: {})",
                        this.path,
                        page.entries.len(),
                        page.next_token.is_some()
                    );
                    this.done = page.next_token.is_none();
                    this.token = page.next_token;
                    this.buffer.extend(page.entries);
                }
                Poll::Ready(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
    }
}
