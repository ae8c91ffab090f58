//! Mutual exclusion over one PKI directory.
//!
//! The index, the CRL and the bundle directory form a single shared
//! resource. Every pipeline run holds the lock for its whole duration.
//!
//! Two layers make up the lock. All [`PkiLock`] values created in one
//! process for the same directory share one mutex, which orders threads.
//! The mutex holder then takes an exclusive advisory lock on a lock file
//! next to the PKI directory, which orders processes. Both waits share the
//! same `timeout`.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::LifecycleError;

/// Interval between attempts on a contended lock file.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

type Registry = Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn shared_mutex(key: &Path) -> Arc<Mutex<()>> {
    let registry = REGISTRY.get_or_init(Default::default);
    registry
        .lock()
        .entry(key.to_path_buf())
        .or_default()
        .clone()
}

/// `<parent>/.tollgate-<dirname>.lock`. Lives outside `dir` because
/// `init-pki` recreates the PKI directory.
fn lock_file_for(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.parent()
        .unwrap_or(dir)
        .join(format!(".tollgate-{name}.lock"))
}

/// Directory-scoped lock with a bounded wait.
#[derive(Debug, Clone)]
pub struct PkiLock {
    dir: PathBuf,
    lock_file: PathBuf,
    mutex: Arc<Mutex<()>>,
    timeout: Duration,
}

/// Held for the duration of one pipeline run.
#[must_use = "the PKI is only locked while the guard is alive"]
pub struct PkiLockGuard<'a> {
    // Closing the file releases the advisory lock; it must go before the mutex.
    _file: File,
    _guard: MutexGuard<'a, ()>,
    dir: &'a Path,
    acquired: Instant,
}

impl PkiLock {
    /// Lock for `dir`, shared with every other lock on the same path.
    pub fn for_dir(dir: impl AsRef<Path>, timeout: Duration) -> Self {
        let dir = dir.as_ref();
        let key = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
        Self {
            mutex: shared_mutex(&key),
            lock_file: lock_file_for(&key),
            dir: key,
            timeout,
        }
    }

    /// The locked directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File carrying the cross-process lock.
    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    /// Maximum wait in [`PkiLock::acquire`].
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Blocks until the lock is free or the timeout elapses.
    pub fn acquire(&self) -> Result<PkiLockGuard<'_>, LifecycleError> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let guard = self
            .mutex
            .try_lock_for(self.timeout)
            .ok_or_else(|| self.busy(started))?;

        let file = self.open_lock_file()?;
        loop {
            match fs2::FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(self.busy(started));
                    }
                    thread::sleep(POLL_INTERVAL.min(deadline - now));
                },
                Err(e) => return Err(self.io_error(e)),
            }
        }

        debug!(dir = %self.dir.display(), waited = ?started.elapsed(), "PKI lock acquired");
        Ok(PkiLockGuard {
            _file: file,
            _guard: guard,
            dir: &self.dir,
            acquired: Instant::now(),
        })
    }

    fn open_lock_file(&self) -> Result<File, LifecycleError> {
        if let Some(parent) = self.lock_file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)
            .map_err(|e| self.io_error(e))
    }

    fn busy(&self, started: Instant) -> LifecycleError {
        LifecycleError::Busy {
            dir: self.dir.clone(),
            waited: started.elapsed(),
        }
    }

    fn io_error(&self, source: io::Error) -> LifecycleError {
        LifecycleError::Io {
            path: self.lock_file.clone(),
            source,
        }
    }
}

impl Drop for PkiLockGuard<'_> {
    fn drop(&mut self) {
        debug!(dir = %self.dir.display(), held = ?self.acquired.elapsed(), "PKI lock released");
    }
}
