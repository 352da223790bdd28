//! Test utilities for temporary log files and hand-driven change notifications.

use crate::error::{Error, Result};
use crate::follower::{FollowOptions, Follower};
use crate::watcher::{FileEvent, FileEventKind, Notifier, Subscription, SubscriptionHandle};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub struct TempLogFile {
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TempLogFile {
    /// Create a new empty temporary log file for testing
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("test.log");

        File::create(&path)?;

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a temporary log file with initial content
    pub fn with_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append(content)?;
        Ok(temp_file)
    }

    /// Append raw content to the temporary log file
    pub fn append(&self, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(content.as_bytes())?;
        file.flush()
    }

    /// Truncate the file in place
    pub fn truncate(&self) -> std::io::Result<()> {
        File::create(&self.path)?;
        Ok(())
    }

    /// Move the file aside and create an empty one in its place, returning
    /// the rotated path
    pub fn rotate(&self) -> std::io::Result<PathBuf> {
        let rotated = self.path.with_extension("log.1");
        std::fs::rename(&self.path, &rotated)?;
        File::create(&self.path)?;
        Ok(rotated)
    }

    /// Move the file out of the way without creating a replacement,
    /// returning its new path
    pub fn move_away(&self) -> std::io::Result<PathBuf> {
        let moved = self.path.with_file_name("moved.log");
        std::fs::rename(&self.path, &moved)?;
        Ok(moved)
    }

    pub fn remove(&self) -> std::io::Result<()> {
        std::fs::remove_file(&self.path)
    }

    /// Get the path to the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

type Senders = (mpsc::UnboundedSender<FileEvent>, mpsc::UnboundedSender<Error>);

#[derive(Default)]
struct ManualState {
    path: PathBuf,
    senders: Option<Senders>,
    fail_subscribe: bool,
}

/// A notifier whose events are emitted by the test itself.
#[derive(Clone, Default)]
pub struct ManualNotifier {
    state: Arc<Mutex<ManualState>>,
}

impl ManualNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose subscribe call always fails.
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.state.lock().unwrap().fail_subscribe = true;
        notifier
    }

    /// Emits an event for the subscribed path. Returns false once unsubscribed.
    pub fn emit(&self, kind: FileEventKind) -> bool {
        let state = self.state.lock().unwrap();
        match &state.senders {
            Some((events, _)) => events
                .send(FileEvent {
                    kind,
                    path: state.path.clone(),
                })
                .is_ok(),
            None => false,
        }
    }

    /// Emits a subscription error. Returns false once unsubscribed.
    pub fn fail(&self, error: Error) -> bool {
        let state = self.state.lock().unwrap();
        match &state.senders {
            Some((_, errors)) => errors.send(error).is_ok(),
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.lock().unwrap().senders.is_some()
    }
}

impl Notifier for ManualNotifier {
    fn subscribe(&self, path: &Path) -> Result<Subscription> {
        let mut state = self.state.lock().unwrap();
        if state.fail_subscribe {
            return Err(Error::Watcher(notify::Error::generic("subscription refused")));
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        state.path = path.to_path_buf();
        state.senders = Some((event_tx, error_tx));

        Ok(Subscription {
            events: event_rx,
            errors: error_rx,
            handle: Box::new(ManualSubscription {
                state: Arc::clone(&self.state),
            }),
        })
    }
}

struct ManualSubscription {
    state: Arc<Mutex<ManualState>>,
}

impl SubscriptionHandle for ManualSubscription {
    fn unsubscribe(&mut self) -> Result<()> {
        self.state.lock().unwrap().senders = None;
        Ok(())
    }
}

/// Follow `file` with events supplied by a fresh [`ManualNotifier`].
pub async fn open_follower(file: &TempLogFile, from_start: bool) -> (Follower, ManualNotifier) {
    let notifier = ManualNotifier::new();
    let follower = Follower::open(
        file.path(),
        FollowOptions::default().from_start(from_start),
        &notifier,
    )
    .await
    .unwrap();
    (follower, notifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
    }

    #[tokio::test]
    async fn test_append_is_raw() {
        let temp_file = TempLogFile::with_content("hello,").unwrap();
        temp_file.append(" world!").unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "hello, world!");
    }

    #[tokio::test]
    async fn test_truncate() {
        let temp_file = TempLogFile::with_content("initial content").unwrap();
        temp_file.truncate().unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn test_rotate() {
        let temp_file = TempLogFile::with_content("before").unwrap();
        let rotated = temp_file.rotate().unwrap();

        assert_eq!(std::fs::read_to_string(&rotated).unwrap(), "before");
        assert_eq!(std::fs::read_to_string(temp_file.path()).unwrap(), "");
    }

    #[tokio::test]
    async fn test_manual_notifier_delivers_until_unsubscribed() {
        let notifier = ManualNotifier::new();
        let mut subscription = notifier.subscribe(Path::new("/tmp/test.log")).unwrap();

        assert!(notifier.emit(FileEventKind::Written));
        let event = subscription.events.recv().await.unwrap();
        assert_eq!(event.kind, FileEventKind::Written);
        assert_eq!(event.path, PathBuf::from("/tmp/test.log"));

        subscription.handle.unsubscribe().unwrap();
        assert!(!notifier.is_subscribed());
        assert!(!notifier.emit(FileEventKind::Written));
        assert!(subscription.events.recv().await.is_none());
        assert!(subscription.errors.recv().await.is_none());
    }

    #[test]
    fn test_failing_notifier() {
        let notifier = ManualNotifier::failing();
        assert!(notifier.subscribe(Path::new("/tmp/test.log")).is_err());
    }
}
