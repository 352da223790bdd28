//! A library that follows a file like `tail -f`.
//!
//! [`follow`] returns a [`Follower`], a read stream that never reaches end of
//! file on its own: reads return newly appended bytes, and block until the
//! file changes when there is nothing new. Rotations (the file moved aside
//! and recreated) are followed transparently. Truncation and removal are
//! reported as terminal errors. Closing the follower lets reads drain what
//! was already buffered before they report [`Error::StreamEnded`].
//!
//! # Example
//!
//! ```rust,no_run
//! use log_follower::follow;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let follower = follow("app.log", false).await?;
//!     let mut buf = [0u8; 4096];
//!
//!     loop {
//!         let n = follower.read(&mut buf).await?;
//!         // Zero bytes means "read again", not end of stream
//!         print!("{}", String::from_utf8_lossy(&buf[..n]));
//!     }
//! }
//! ```

// Internal modules - not part of public API
mod error;
mod follower;
mod reader;
mod stream;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use error::{Error, Result};
pub use follower::{DEFAULT_BUFFER_CAPACITY, FollowOptions, Follower};
pub use stream::FollowReader;
pub use watcher::{
    FileEvent, FileEventKind, Notifier, NotifyWatcher, Subscription, SubscriptionHandle,
};

use std::path::Path;
use tokio_stream::Stream;

/// Follows the file at `path`.
///
/// With `from_start` the existing content is delivered first; otherwise only
/// bytes appended after this call are.
pub async fn follow<P: AsRef<Path>>(path: P, from_start: bool) -> Result<Follower> {
    follow_with(path, FollowOptions::default().from_start(from_start)).await
}

/// Follows the file at `path` with explicit options.
pub async fn follow_with<P: AsRef<Path>>(path: P, options: FollowOptions) -> Result<Follower> {
    Follower::open(path, options, &NotifyWatcher).await
}

/// Creates a stream of the lines appended to a file.
///
/// # Example
///
/// ```rust,no_run
/// use log_follower::follow_lines;
/// use tokio_stream::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut lines = follow_lines("app.log", true).await?;
///
///     while let Some(line) = lines.next().await {
///         println!("{}", line?);
///     }
///
///     Ok(())
/// }
/// ```
pub async fn follow_lines<P: AsRef<Path>>(
    path: P,
    from_start: bool,
) -> Result<impl Stream<Item = Result<String>> + Unpin> {
    let follower = follow(path, from_start).await?;
    Ok(stream::lines(follower))
}
