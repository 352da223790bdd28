//! Cursor and buffer management for the followed file.

use crate::error::{Error, Result};
use std::fs::Metadata;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};

/// Owns the open file handle and tracks the bytes that are safe to deliver.
///
/// Deliverable bytes are the `carry` (undelivered bytes from a handle that
/// was rotated away or released) followed by whatever the current reader
/// has staged.
pub(crate) struct Cursor {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    carry: Vec<u8>,
    /// Offset in the current file of the next byte the caller will see.
    offset: u64,
    capacity: usize,
}

impl Cursor {
    /// Opens `path`, starting at offset zero or at the current end of file.
    pub(crate) async fn open(path: &Path, from_start: bool, capacity: usize) -> Result<Self> {
        let mut file = File::open(path).await?;
        let offset = if from_start {
            0
        } else {
            file.seek(SeekFrom::End(0)).await?
        };
        let capacity = capacity.max(1);

        Ok(Self {
            path: path.to_path_buf(),
            reader: Some(BufReader::with_capacity(capacity, file)),
            carry: Vec::new(),
            offset,
            capacity,
        })
    }

    /// Refills the read buffer if it is empty. Reaching end of file is not
    /// an error. Returns the number of deliverable bytes.
    pub(crate) async fn fill(&mut self) -> Result<usize> {
        if let Some(reader) = self.reader.as_mut() {
            reader.fill_buf().await?;
        }
        Ok(self.buffered())
    }

    /// Number of bytes that can be delivered without touching the file.
    pub(crate) fn buffered(&self) -> usize {
        self.carry.len() + self.reader.as_ref().map_or(0, |r| r.buffer().len())
    }

    /// Copies up to `buf.len()` deliverable bytes, carried bytes first.
    pub(crate) fn copy_to(&mut self, buf: &mut [u8]) -> usize {
        if !self.carry.is_empty() {
            let n = self.carry.len().min(buf.len());
            buf[..n].copy_from_slice(&self.carry[..n]);
            self.carry.drain(..n);
            return n;
        }

        let Some(reader) = self.reader.as_mut() else {
            return 0;
        };
        let staged = reader.buffer();
        let n = staged.len().min(buf.len());
        buf[..n].copy_from_slice(&staged[..n]);
        reader.consume(n);
        self.offset += n as u64;
        n
    }

    /// Picks up appended bytes after a write notification.
    ///
    /// A file that is now shorter than what has already been read was
    /// truncated in place; the bytes already delivered no longer correspond
    /// to its content.
    pub(crate) async fn refresh(&mut self) -> Result<()> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };

        let current_size = reader.get_ref().metadata().await?.len();
        let read_position = self.offset + reader.buffer().len() as u64;
        if detect_file_truncation(current_size, read_position) {
            return Err(Error::FileTruncated {
                path: self.path.display().to_string(),
            });
        }

        reader.fill_buf().await?;
        Ok(())
    }

    /// Swaps in a fresh handle for the file now at `path`.
    ///
    /// Everything left in the old handle, staged or not yet read, is carried
    /// ahead of the new file's content. The carry is kept even when nothing
    /// is left at `path`, in which case the file is reported removed. If
    /// `path` still names the file already open, nothing changes.
    pub(crate) async fn reopen(&mut self) -> Result<()> {
        let current = tokio::fs::metadata(&self.path).await;

        if let (Ok(current), Some(reader)) = (&current, self.reader.as_ref()) {
            let held = reader.get_ref().metadata().await?;
            if is_same_file(current, &held) {
                return Ok(());
            }
        }

        if let Some(mut previous) = self.reader.take() {
            previous.read_to_end(&mut self.carry).await?;
        }

        if let Err(e) = current {
            return Err(self.open_error(e));
        }

        let file = File::open(&self.path)
            .await
            .map_err(|e| self.open_error(e))?;
        self.reader = Some(BufReader::with_capacity(self.capacity, file));
        self.offset = 0;
        Ok(())
    }

    /// Closes the file handle, keeping its staged bytes deliverable.
    /// Returns false if the handle was already released.
    pub(crate) fn release(&mut self) -> bool {
        match self.reader.take() {
            Some(reader) => {
                self.carry.extend_from_slice(reader.buffer());
                true
            }
            None => false,
        }
    }

    fn open_error(&self, error: std::io::Error) -> Error {
        if error.kind() == ErrorKind::NotFound {
            Error::FileRemoved {
                path: self.path.display().to_string(),
            }
        } else {
            Error::Io(error)
        }
    }
}

#[cfg(unix)]
fn is_same_file(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn is_same_file(_: &Metadata, _: &Metadata) -> bool {
    false
}

/// Returns true when the file is shorter than the position already read.
fn detect_file_truncation(current_size: u64, last_position: u64) -> bool {
    current_size < last_position
}
