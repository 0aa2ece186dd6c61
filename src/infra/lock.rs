//! Repository lock
//!
//! Only one strapkit process may mutate a repository at a time. The lock is an
//! exclusive advisory lock on a file at the repository root, so the kernel
//! drops it when the owning process dies. The file also carries the owner's
//! PID for diagnostics and is emptied again on release.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs4::FileExt;
use tracing::{debug, warn};

use crate::config::defaults;
use crate::error::LockError;

/// Held repository lock
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    file: File,
}

/// Path of the lock file of the repository at `root`
pub fn lock_path(root: &Path) -> PathBuf {
    root.join(defaults::LOCK_FILE)
}

impl RepoLock {
    /// Take the lock, waiting for the current holder to let go
    pub async fn acquire(root: &Path) -> Result<Self, LockError> {
        let mut warned = false;
        loop {
            if let Some(lock) = Self::try_acquire(root)? {
                return Ok(lock);
            }
            if !warned {
                let holder = holder(root).map_or_else(|| "another process".to_string(), |pid| format!("process {pid}"));
                warn!("Repository is locked by {holder}, waiting");
                warned = true;
            }
            tokio::time::sleep(Duration::from_millis(defaults::LOCK_POLL_INTERVAL_MS)).await;
        }
    }

    /// Take the lock if nobody holds it
    pub fn try_acquire(root: &Path) -> Result<Option<Self>, LockError> {
        let path = lock_path(root);
        let io_error = |e: std::io::Error| LockError::IoError {
            path: path.clone(),
            error: e.to_string(),
        };

        // No truncation here, the holder's PID must survive a failed attempt
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_error)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(io_error(e)),
        }

        file.set_len(0).map_err(io_error)?;
        writeln!(file, "{}", std::process::id()).map_err(io_error)?;

        debug!("Acquired {}", path.display());
        Ok(Some(Self { path, file }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exit on SIGINT or SIGTERM.
    ///
    /// A build interrupted this way may leave the repository half updated,
    /// which is reported before exiting with status 1. The lock goes away
    /// with the process.
    pub fn release_on_signal(&self) {
        tokio::spawn(async move {
            let ctrl_c = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut signal) => {
                        signal.recv().await;
                    }
                    Err(_) => std::future::pending::<()>().await,
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                () = ctrl_c => {}
                () = terminate => {}
            }

            eprintln!("FATAL: Interrupted by a signal. The repository might be in an invalid state");
            std::process::exit(1);
        });
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        // Keep the file: unlinking it would let a waiter lock a fresh inode
        // while another process still holds the old one.
        let _ = self.file.set_len(0);
    }
}

/// PID recorded in the lock file, if any
pub fn holder(root: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_path(root))
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Whether a live process holds the lock of the repository at `root`
pub fn is_locked(root: &Path) -> Result<bool, LockError> {
    let path = lock_path(root);
    if !path.exists() {
        return Ok(false);
    }
    Ok(RepoLock::try_acquire(root)?.is_none())
}

/// Remove the lock file; returns whether there was one
pub fn force_unlock(root: &Path) -> Result<bool, LockError> {
    let path = lock_path(root);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LockError::IoError {
            path,
            error: e.to_string(),
        }),
    }
}
