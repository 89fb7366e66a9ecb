//! Single-instance advisory lock
//!
//! An exclusive `flock`-style lock on a fixed file next to the database. The
//! lock belongs to the open file handle, so it is dropped by the OS when the
//! holding process dies and a second handle (in this or another process)
//! cannot take it while the first is held.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use tracing::{debug, info};

use crate::Result;

/// Advisory lock keyed by a lock file path
#[derive(Debug)]
pub struct SingletonLock {
    path: PathBuf,
    held: Mutex<Option<File>>,
}

impl SingletonLock {
    /// Create a lock handle for the given lock file path (not acquired yet)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "SingletonLock::new: called");
        Self {
            path,
            held: Mutex::new(None),
        }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the lock without blocking
    ///
    /// Returns `Ok(false)` whenever the lock is held, including by this
    /// handle, so every holder releases exactly once.
    pub fn try_acquire(&self) -> Result<bool> {
        debug!(path = ?self.path, "SingletonLock::try_acquire: called");
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if held.is_some() {
            debug!("SingletonLock::try_acquire: already held by this handle");
            return Ok(false);
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        // Don't truncate before the lock is ours: the file carries the holder's PID
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                file.set_len(0)?;
                writeln!(file, "{}", std::process::id())?;
                *held = Some(file);
                info!(path = ?self.path, pid = std::process::id(), "Singleton lock acquired");
                Ok(true)
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                debug!(path = ?self.path, "SingletonLock::try_acquire: held elsewhere");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Release the lock if this handle holds it
    pub fn release(&self) -> Result<()> {
        debug!(path = ?self.path, "SingletonLock::release: called");
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(file) = held.take() {
            FileExt::unlock(&file)?;
            info!(path = ?self.path, "Singleton lock released");
        } else {
            debug!("SingletonLock::release: not held");
        }
        Ok(())
    }

    /// Whether this handle currently holds the lock
    pub fn is_held(&self) -> bool {
        self.held.lock().map(|h| h.is_some()).unwrap_or(false)
    }

    /// PID recorded by the last holder, if any
    pub fn holder_pid(&self) -> Option<u32> {
        debug!(path = ?self.path, "SingletonLock::holder_pid: called");
        fs::read_to_string(&self.path).ok()?.trim().parse().ok()
    }
}
