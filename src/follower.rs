//! The follower: a never-ending read stream over a live file.

use crate::error::{Error, Result};
use crate::reader::Cursor;
use crate::stream::FollowReader;
use crate::watcher::{FileEvent, FileEventKind, Notifier, Subscription, SubscriptionHandle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Default size of the follower's read buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

/// Options controlling how a file is followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowOptions {
    /// Deliver the file's existing content before following new writes.
    pub from_start: bool,
    /// Size of the read buffer. Values below one byte are raised to one.
    pub buffer_capacity: usize,
}

impl Default for FollowOptions {
    fn default() -> Self {
        Self {
            from_start: false,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl FollowOptions {
    pub fn from_start(mut self, from_start: bool) -> Self {
        self.from_start = from_start;
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }
}

struct FollowState {
    cursor: Cursor,
    closed: bool,
}

/// Follows the writes to a file, like `tail -f`.
///
/// [`read`](Follower::read) never reports end of stream while the follower is
/// open: it returns new bytes as they are appended, or blocks until the file
/// changes. `Ok(0)` means "something changed, read again", never end of
/// stream. After [`close`](Follower::close), reads drain whatever was
/// already buffered and then fail with [`Error::StreamEnded`].
///
/// Both methods take `&self`, so a follower shared through an `Arc` can be
/// closed while another task is blocked reading from it. Only one task should
/// read at a time.
pub struct Follower {
    path: PathBuf,
    state: Arc<Mutex<FollowState>>,
    wake_rx: Mutex<mpsc::Receiver<()>>,
    error_rx: Mutex<oneshot::Receiver<Error>>,
    subscription: Mutex<Option<Box<dyn SubscriptionHandle>>>,
}

impl Follower {
    /// Opens `path` and follows it using change events from `notifier`.
    ///
    /// Any failure to open, seek or subscribe is returned here and leaves
    /// nothing running.
    pub async fn open<P, N>(path: P, options: FollowOptions, notifier: &N) -> Result<Self>
    where
        P: AsRef<Path>,
        N: Notifier + ?Sized,
    {
        let path = path.as_ref().to_path_buf();
        let cursor = Cursor::open(&path, options.from_start, options.buffer_capacity).await?;
        let Subscription {
            events,
            errors,
            handle,
        } = notifier.subscribe(&path)?;

        let (wake_tx, wake_rx) = mpsc::channel(1);
        let (error_tx, error_rx) = oneshot::channel();
        let state = Arc::new(Mutex::new(FollowState {
            cursor,
            closed: false,
        }));

        tokio::spawn(follow_events(
            Arc::clone(&state),
            events,
            errors,
            wake_tx,
            error_tx,
        ));
        info!(path = %path.display(), from_start = options.from_start, "following file");

        Ok(Self {
            path,
            state,
            wake_rx: Mutex::new(wake_rx),
            error_rx: Mutex::new(error_rx),
            subscription: Mutex::new(Some(handle)),
        })
    }

    /// The path being followed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads newly available bytes into `buf`.
    ///
    /// Returns the number of bytes copied. Short reads are normal. `Ok(0)`
    /// with a non-empty `buf` means the file changed and the caller should
    /// read again. Terminal conditions ([`Error::FileTruncated`],
    /// [`Error::FileRemoved`], subscription or I/O failures) are reported
    /// once; the follower should then be discarded.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock().await;
        let readable = state.cursor.fill().await?;

        match self.error_rx.lock().await.try_recv() {
            Ok(error) => return Err(error),
            Err(TryRecvError::Closed) if readable == 0 => return Err(Error::StreamEnded),
            Err(_) => {}
        }

        if readable > 0 {
            return Ok(state.cursor.copy_to(buf));
        }
        if state.closed {
            return Err(Error::StreamEnded);
        }
        drop(state);

        // Wait for the file to change, then let the caller try again
        let woken = self.wake_rx.lock().await.recv().await;
        match woken {
            Some(()) => Ok(0),
            None => match self.error_rx.lock().await.try_recv() {
                Ok(error) => Err(error),
                Err(_) => Err(Error::StreamEnded),
            },
        }
    }

    /// Stops following the file and releases its handle.
    ///
    /// Bytes that were already buffered stay readable. A reader blocked in
    /// [`read`](Follower::read) is released once the subscription shuts
    /// down. Closing again is a no-op.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.closed = true;
            if state.cursor.release() {
                info!(path = %self.path.display(), "closed followed file");
            }
        }

        match self.subscription.lock().await.take() {
            Some(mut handle) => handle.unsubscribe(),
            None => Ok(()),
        }
    }

    /// Converts the follower into a `tokio::io::AsyncRead`.
    pub fn into_reader(self) -> FollowReader {
        FollowReader::new(Arc::new(self))
    }
}

impl Drop for Follower {
    fn drop(&mut self) {
        if let Some(mut handle) = self.subscription.get_mut().take() {
            if let Err(e) = handle.unsubscribe() {
                debug!(path = %self.path.display(), error = %e, "unsubscribe on drop failed");
            }
        }
    }
}

/// Event-reaction loop: applies file events to the shared state and wakes the
/// reader. Exits when either input closes or a terminal error occurs; the
/// wake and error signals close when it returns.
async fn follow_events(
    state: Arc<Mutex<FollowState>>,
    mut events: mpsc::UnboundedReceiver<FileEvent>,
    mut errors: mpsc::UnboundedReceiver<Error>,
    wake_tx: mpsc::Sender<()>,
    error_tx: oneshot::Sender<Error>,
) {
    let failure = loop {
        let outcome = tokio::select! {
            event = events.recv() => match event {
                Some(event) => handle_event(&state, event).await,
                None => break None,
            },
            error = errors.recv() => match error {
                Some(error) => Err(error),
                None => break None,
            },
        };

        if let Err(error) = outcome {
            break Some(error);
        }

        // Wake whoever is waiting; if nobody is, their next read sees the
        // new state anyway
        let _ = wake_tx.try_send(());
    };

    if let Some(failure) = failure {
        match &failure {
            Error::UnrecognizedEvent(event) => error!(event = %event, "unrecognized file event"),
            other => warn!(error = %other, "follow loop stopped"),
        }
        let _ = error_tx.send(failure);
    }
    debug!("follow loop finished");
}

async fn handle_event(state: &Mutex<FollowState>, event: FileEvent) -> Result<()> {
    debug!(kind = ?event.kind, path = %event.path.display(), "file event");

    let mut state = state.lock().await;
    if state.closed {
        return Ok(());
    }

    match event.kind {
        FileEventKind::Created => Err(Error::FileTruncated {
            path: event.path.display().to_string(),
        }),
        FileEventKind::Removed => Err(Error::FileRemoved {
            path: event.path.display().to_string(),
        }),
        FileEventKind::Renamed => {
            state.cursor.reopen().await?;
            info!(path = %event.path.display(), "reopened rotated file");
            Ok(())
        }
        FileEventKind::Written => state.cursor.refresh().await,
        FileEventKind::MetadataChanged => Ok(()),
    }
}
