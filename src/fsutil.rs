//! Shared file primitives for the on-disk stores.
//!
//! Mailboxes, dog records and the run history are all touched by several
//! processes at once. Every store serialises its mutations through an
//! advisory lock file and replaces whole files with a temp-file rename, so a
//! reader never observes a half-written record.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use fs2::FileExt;

/// Default bound on how long a store waits for a contended lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Error from acquiring a [`LockGuard`].
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("opening lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {waited_ms}ms waiting for lock {path}")]
    Timeout { path: PathBuf, waited_ms: u128 },
}

/// Held advisory lock. The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
}

impl LockGuard {
    /// Take an exclusive lock, retrying with backoff until `timeout` elapses.
    pub fn exclusive(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        Self::acquire(path, timeout, true)
    }

    /// Take a shared lock, retrying with backoff until `timeout` elapses.
    pub fn shared(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        Self::acquire(path, timeout, false)
    }

    fn acquire(path: &Path, timeout: Duration, exclusive: bool) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        let start = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            // Fully qualified: std's inherent File locking methods share these names.
            let result = if exclusive {
                FileExt::try_lock_exclusive(&file)
            } else {
                FileExt::try_lock_shared(&file)
            };
            match result {
                Ok(()) => return Ok(Self { file }),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if start.elapsed() >= timeout {
                        return Err(LockError::Timeout {
                            path: path.to_path_buf(),
                            waited_ms: start.elapsed().as_millis(),
                        });
                    }
                    // 10ms, 20ms, 40ms ... capped at 160ms
                    let backoff = Duration::from_millis(10 << attempt.min(4));
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                Err(e) => return Err(io_err(e)),
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Replace `path` with `data` via a sibling temp file and rename.
///
/// The temp file lives in the target's directory so the rename stays on one
/// filesystem.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(".tmp-{}-{seq}-{file_name}", std::process::id()));

    let mut f = File::create(&tmp_path)?;
    f.write_all(data)?;
    f.sync_data()?;
    drop(f);

    fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp_path);
    })
}

/// Append one line to `path`, creating it if needed, and flush it to disk.
pub fn append_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    f.write_all(buf.as_bytes())?;
    f.sync_data()
}

/// Read a file to a string, treating a missing file as empty.
pub fn read_or_empty(path: &Path) -> io::Result<String> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}
