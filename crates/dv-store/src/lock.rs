//! Exclusive per-document locking.
//!
//! Two layers guard a document's `<path>.lock` handle:
//!
//! 1. An in-process gate (mutex + condvar) so threads sharing one store
//!    block on a condition variable instead of polling each other.
//! 2. An OS advisory lock (`flock`/`LockFileEx` via `fs2`) on the lock file,
//!    which excludes other processes. It is polled at a fixed delay, since
//!    a blocking `flock` cannot be bounded.
//!
//! Both layers share a single deadline. The lock file itself is never
//! deleted; removing it while another process waits would split the lock.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use dv_types::DocumentId;
use fs2::FileExt;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::config::LockConfig;
use crate::error::{StoreError, StoreResult};

/// Path of the lock handle guarding `path`.
pub(crate) fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Lock paths currently held by threads of this process.
#[derive(Debug, Default)]
pub(crate) struct LocalGate {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

impl LocalGate {
    /// Wait until `key` is free, then claim it. Returns `false` if the
    /// deadline passes first.
    fn enter(&self, key: &Path, deadline: Instant) -> bool {
        let mut held = self.held.lock();
        loop {
            if !held.contains(key) {
                held.insert(key.to_path_buf());
                return true;
            }
            if self.released.wait_until(&mut held, deadline).timed_out() && held.contains(key) {
                return false;
            }
        }
    }

    fn leave(&self, key: &Path) {
        self.held.lock().remove(key);
        self.released.notify_all();
    }
}

/// A claim on the in-process gate, released on drop.
struct GateTicket<'a> {
    gate: &'a LocalGate,
    key: PathBuf,
}

impl Drop for GateTicket<'_> {
    fn drop(&mut self) {
        self.gate.leave(&self.key);
    }
}

/// An exclusive lock on one document, released on drop.
///
/// Dropping during unwinding releases it too, so a panicking mutation cannot
/// strand the document.
pub(crate) struct DocumentLock<'a> {
    file: File,
    path: PathBuf,
    _ticket: GateTicket<'a>,
}

impl Drop for DocumentLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release document lock");
        }
        debug!(path = %self.path.display(), "document lock released");
    }
}

/// Take the exclusive lock for `document`, waiting at most the configured
/// budget or until `deadline`, whichever comes first.
pub(crate) fn acquire<'a>(
    gate: &'a LocalGate,
    document: &DocumentId,
    path: PathBuf,
    config: &LockConfig,
    deadline: Option<Instant>,
) -> StoreResult<DocumentLock<'a>> {
    let started = Instant::now();
    let budget = started + config.budget();
    let deadline = deadline.map_or(budget, |d| d.min(budget));
    let timeout = |attempts: u32| StoreError::LockTimeout {
        document: document.clone(),
        attempts,
        waited: started.elapsed(),
    };

    if !gate.enter(&path, deadline) {
        warn!(document = %document, "lock wait expired inside this process");
        return Err(timeout(0));
    }
    let ticket = GateTicket {
        gate,
        key: path.clone(),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)?;

    let mut attempts = 0;
    loop {
        attempts += 1;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(document = %document, attempts, "document lock acquired");
                return Ok(DocumentLock {
                    file,
                    path,
                    _ticket: ticket,
                });
            }
            Err(e) if is_contended(&e) => {}
            Err(e) => return Err(e.into()),
        }

        let now = Instant::now();
        if attempts >= config.max_attempts || now >= deadline {
            warn!(document = %document, attempts, "document lock contended; giving up");
            return Err(timeout(attempts));
        }
        debug!(document = %document, attempts, "document lock contended; retrying");
        thread::sleep(config.retry_delay.min(deadline - now));
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
