//! Append-only transcript of raw user input.
//!
//! The transcript owns the single log handle of the session. Every line is written
//! through to the file before it is interpreted, and the handle is closed exactly once,
//! whichever exit path gets there first.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

/// Default transcript location, relative to the working directory.
pub const DEFAULT_HISTORY_FILE: &str = "shell-history";

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("cannot open {} for append: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write to history file: {0}")]
    Write(#[from] io::Error),
    #[error("history file is already closed")]
    Closed,
}

/// Process-lifetime sink for input lines.
///
/// Shared by reference between the shell loop, which records, and the session
/// controller, which finalizes. The mutex keeps a finalize from racing a record that
/// is halfway through its write.
#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
    file: Mutex<Option<File>>,
    fd: RawFd,
}

impl Transcript {
    /// Open (or create) `path` in append mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TranscriptError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|source| TranscriptError::Open {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "transcript opened");
        Ok(Self {
            fd: file.as_raw_fd(),
            path,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw descriptor of the log file, valid until [`Transcript::finalize`].
    pub fn raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Append `line` followed by a newline and flush it.
    ///
    /// A trailing `\n` or `\r\n` already present on `line` is normalized, so each
    /// record occupies exactly one line of the file.
    pub fn record(&self, line: &str) -> Result<(), TranscriptError> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);

        let mut guard = self.lock();
        let file = guard.as_mut().ok_or(TranscriptError::Closed)?;
        // One write per record: a fault between two writes must not split a line.
        let mut entry = String::with_capacity(line.len() + 1);
        entry.push_str(line);
        entry.push('\n');
        file.write_all(entry.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Flush, sync and close the log.
    ///
    /// Returns `Ok(true)` for the call that actually closed the file and `Ok(false)` for
    /// every later call.
    pub fn finalize(&self) -> Result<bool, TranscriptError> {
        let Some(mut file) = self.lock().take() else {
            debug!("transcript already finalized");
            return Ok(false);
        };
        file.flush()?;
        if let Err(e) = file.sync_all() {
            // Not every target supports fsync (pipes, some special files).
            warn!("failed to sync {}: {e}", self.path.display());
        }
        drop(file);
        debug!(path = %self.path.display(), "transcript finalized");
        Ok(true)
    }

    #[cfg(test)]
    fn is_finalized(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        // A panic while holding the lock leaves the file itself intact.
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
