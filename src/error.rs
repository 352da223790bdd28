//! Error types for the log follower library.

use thiserror::Error;

/// The main error type for follower operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors when opening, seeking or reading the followed file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors from the notify crate.
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// File path errors.
    #[error("Invalid file path: {message}")]
    InvalidPath { message: String },

    /// The followed file was replaced or shrank. The follower should be discarded.
    #[error("File was truncated: {path}")]
    FileTruncated { path: String },

    /// The followed file was removed. The follower should be discarded.
    #[error("File was removed: {path}")]
    FileRemoved { path: String },

    /// The event source produced an event outside its documented vocabulary.
    #[error("Unrecognized file event: {0}")]
    UnrecognizedEvent(String),

    /// The follower was closed and every buffered byte has been delivered.
    #[error("Stream ended")]
    StreamEnded,
}

impl Error {
    /// Returns true when the error only marks the end of a closed stream.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::StreamEnded)
    }

    /// Recovers an `Error` that was tunnelled through `std::io::Error`.
    pub(crate) fn from_io(error: std::io::Error) -> Self {
        error.downcast::<Error>().unwrap_or_else(Error::Io)
    }
}

/// A convenient Result type for follower operations.
pub type Result<T> = std::result::Result<T, Error>;
