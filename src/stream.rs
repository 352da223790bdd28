//! Async reader and line stream adapters over a [`Follower`].

use crate::error::{Error, Result};
use crate::follower::Follower;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::io;
use std::ops::Range;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::{Stream, StreamExt};

type PendingRead = BoxFuture<'static, (Vec<u8>, Result<usize>)>;

/// A `tokio::io::AsyncRead` over a follower, for use with tokio's buffered
/// readers and codecs.
///
/// Retry wake-ups are absorbed, so a read only completes with data, with EOF
/// once the follower is closed and drained, or with an error. Terminal
/// follower errors are wrapped in `std::io::Error`.
pub struct FollowReader {
    follower: Arc<Follower>,
    scratch: Vec<u8>,
    ready: Range<usize>,
    pending: Option<PendingRead>,
}

impl FollowReader {
    pub fn new(follower: Arc<Follower>) -> Self {
        Self {
            follower,
            scratch: Vec::new(),
            ready: 0..0,
            pending: None,
        }
    }

    /// The follower being read, e.g. to close it from another task.
    pub fn follower(&self) -> &Arc<Follower> {
        &self.follower
    }
}

fn read_into(follower: Arc<Follower>, mut scratch: Vec<u8>, len: usize) -> PendingRead {
    scratch.resize(len, 0);
    async move {
        let result = follower.read(&mut scratch).await;
        (scratch, result)
    }
    .boxed()
}

impl AsyncRead for FollowReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            // The caller's buffer may have shrunk since the read was issued
            if !this.ready.is_empty() {
                let n = this.ready.len().min(buf.remaining());
                let start = this.ready.start;
                buf.put_slice(&this.scratch[start..start + n]);
                this.ready.start += n;
                return Poll::Ready(Ok(()));
            }

            let pending = this.pending.get_or_insert_with(|| {
                read_into(
                    Arc::clone(&this.follower),
                    std::mem::take(&mut this.scratch),
                    buf.remaining(),
                )
            });
            let (scratch, result) = ready!(pending.poll_unpin(cx));
            this.pending = None;
            this.scratch = scratch;

            match result {
                // Woken without data: read again
                Ok(0) => continue,
                Ok(n) => this.ready = 0..n,
                Err(Error::StreamEnded) => return Poll::Ready(Ok(())),
                Err(e) => return Poll::Ready(Err(io::Error::other(e))),
            }
        }
    }
}

/// Streams the lines appended to a followed file.
pub(crate) fn lines(follower: Follower) -> impl Stream<Item = Result<String>> + Unpin {
    let lines = BufReader::new(follower.into_reader()).lines();
    LinesStream::new(lines).map(|line| line.map_err(Error::from_io))
}
