//! Host port allocation.
//!
//! Allocation runs under a cross-process file lock so concurrent
//! provisioners on the same machine cannot race each other between
//! "port looks free" and "container actually bound it". Within the lock
//! the scan walks upward from a start port, skipping ports the caller
//! already knows are taken and ports that fail a bind probe.

use std::fs::OpenOptions;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;

use crate::error::SandboxError;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// First free port at or above `start` according to `is_free`.
///
/// Pure scan so the policy is testable without sockets; callers compose
/// `is_free` from their claimed-port set and [`bind_probe`].
pub fn next_free_port(
    start: u16,
    mut is_free: impl FnMut(u16) -> bool,
) -> Result<u16, SandboxError> {
    let mut port = start;
    loop {
        if is_free(port) {
            return Ok(port);
        }
        port = match port.checked_add(1) {
            Some(next) => next,
            None => return Err(SandboxError::PortExhausted { start }),
        };
    }
}

/// Whether `port` can currently be bound on all interfaces.
pub fn bind_probe(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

/// Held exclusive lock on the shared allocation lock file. Released on drop.
#[derive(Debug)]
pub struct PortLock {
    file: std::fs::File,
    path: PathBuf,
}

impl PortLock {
    /// Acquire the lock, polling until `timeout` elapses.
    ///
    /// The lock file (and its parent directory) is created if missing, so
    /// the first provisioner on a machine does not need setup.
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self, SandboxError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "acquired port allocation lock");
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(_) => {
                    return Err(SandboxError::LockTimeout {
                        path: path.display().to_string(),
                        timeout,
                    });
                }
            }
        }
    }
}

impl Drop for PortLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release port lock");
        }
    }
}
