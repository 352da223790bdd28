//! File change subscriptions using the notify crate.

use crate::error::{Error, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

/// The kinds of change a follower reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// The file grew or its content changed in place.
    Written,
    /// The file was moved away from the path or another file was moved onto
    /// it (rotation).
    Renamed,
    /// The file was removed.
    Removed,
    /// A new file was created at the path without a preceding rotation.
    Created,
    /// Permissions or other attributes changed.
    MetadataChanged,
}

/// A change observed on the followed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
}

/// An active subscription: a stream of events, a stream of errors, and the
/// handle that tears both down.
pub struct Subscription {
    pub events: mpsc::UnboundedReceiver<FileEvent>,
    pub errors: mpsc::UnboundedReceiver<Error>,
    pub handle: Box<dyn SubscriptionHandle>,
}

/// Tears down a subscription. Once unsubscribed, both of the subscription's
/// streams close.
pub trait SubscriptionHandle: Send {
    /// Stops delivering events. Calling it again is a no-op.
    fn unsubscribe(&mut self) -> Result<()>;
}

/// A source of change notifications keyed by file path.
pub trait Notifier {
    fn subscribe(&self, path: &Path) -> Result<Subscription>;
}

/// Notifier backed by the platform's recommended `notify` watcher.
///
/// The parent directory is watched so that rotations and re-creations of the
/// file are observed, not just writes to the currently open inode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyWatcher;

impl Notifier for NotifyWatcher {
    fn subscribe(&self, path: &Path) -> Result<Subscription> {
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::InvalidPath {
                message: format!("{} does not name a file", path.display()),
            })?
            .to_os_string();
        let watch_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let mut classifier = EventClassifier::new(watch_dir.join(&file_name), file_name);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => match classifier.classify(&event) {
                    Ok(Some(event)) => {
                        let _ = event_tx.send(event);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let _ = error_tx.send(e);
                    }
                },
                Err(e) => {
                    let _ = error_tx.send(Error::Watcher(e));
                }
            },
            Config::default(),
        )?;
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
        debug!(dir = %watch_dir.display(), "watching directory");

        Ok(Subscription {
            events: event_rx,
            errors: error_rx,
            handle: Box::new(NotifySubscription {
                watcher: Some(watcher),
                watch_dir,
            }),
        })
    }
}

struct NotifySubscription {
    watcher: Option<RecommendedWatcher>,
    watch_dir: PathBuf,
}

impl SubscriptionHandle for NotifySubscription {
    fn unsubscribe(&mut self) -> Result<()> {
        // Dropping the watcher drops its handler, which closes both streams
        // whether or not the unwatch succeeded.
        match self.watcher.take() {
            Some(mut watcher) => watcher.unwatch(&self.watch_dir).map_err(Error::from),
            None => Ok(()),
        }
    }
}

/// Translates raw notify events on a directory into [`FileEvent`]s for one file.
pub(crate) struct EventClassifier {
    target: PathBuf,
    file_name: OsString,
    renamed_away: bool,
}

impl EventClassifier {
    pub(crate) fn new(target: PathBuf, file_name: OsString) -> Self {
        Self {
            target,
            file_name,
            renamed_away: false,
        }
    }

    /// Returns `Ok(None)` for events that don't concern the followed file or
    /// carry no follow-relevant information.
    pub(crate) fn classify(&mut self, event: &Event) -> Result<Option<FileEvent>> {
        if !is_event_relevant_to_file(event, &self.file_name) {
            return Ok(None);
        }

        let kind = match event.kind {
            EventKind::Access(_) => return Ok(None),
            EventKind::Create(_) => {
                // The move-away already asked the follower to settle the path,
                // which picks up the file created in its place
                if std::mem::take(&mut self.renamed_away) {
                    return Ok(None);
                }
                FileEventKind::Created
            }
            EventKind::Remove(_) => {
                self.renamed_away = false;
                FileEventKind::Removed
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                self.renamed_away = true;
                FileEventKind::Renamed
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                self.renamed_away = false;
                FileEventKind::Renamed
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return Ok(None),
            EventKind::Modify(ModifyKind::Name(RenameMode::Any | RenameMode::Other)) => {
                self.renamed_away = !self.target.exists();
                FileEventKind::Renamed
            }
            EventKind::Modify(ModifyKind::Metadata(_)) => FileEventKind::MetadataChanged,
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other) => {
                FileEventKind::Written
            }
            EventKind::Any | EventKind::Other => {
                return Err(Error::UnrecognizedEvent(format!("{:?}", event)));
            }
        };

        Ok(Some(FileEvent {
            kind,
            path: self.target.clone(),
        }))
    }
}

/// Check if a notify event is relevant to a specific file
pub(crate) fn is_event_relevant_to_file(event: &Event, target_file_name: &OsStr) -> bool {
    event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(target_file_name))
}
