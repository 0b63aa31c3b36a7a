//! File-based instance locking.
//!
//! A non-blocking exclusive lock on a shared filesystem path guarantees that
//! only one worker instance runs at a time, across processes on the same
//! host and across hosts mounting the same volume. The OS releases the lock
//! when the holding process exits, cleanly or not, so there is no stale-lock
//! recovery here: the metadata written into the file is diagnostics only and
//! is never consulted for liveness.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs4::FileExt;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock file path must name a file (got '{path}')")]
    InvalidPath { path: String },
    #[error("lock already held by another instance: {}", display_holder(.holder.as_ref()))]
    AlreadyHeld { holder: Option<HolderInfo> },
    #[error("failed to {action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn display_holder(holder: Option<&HolderInfo>) -> String {
    holder.map_or_else(|| "holder unknown".to_string(), HolderInfo::to_string)
}

/// Metadata lines written by the current holder after acquisition. Purely
/// cosmetic: stale content from a dead holder is overwritten by the next
/// acquisition, never read for liveness decisions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HolderInfo {
    pub pid: Option<String>,
    pub hostname: Option<String>,
    pub timestamp: Option<String>,
}

impl HolderInfo {
    fn parse(content: &str) -> Option<Self> {
        let mut pid = None;
        let mut hostname = None;
        let mut timestamp = None;
        let mut seen = false;
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            seen = true;
            match key {
                "pid" => pid = Some(value.to_string()),
                "hostname" => hostname = Some(value.to_string()),
                "timestamp" => timestamp = Some(value.to_string()),
                _ => {}
            }
        }
        seen.then_some(Self {
            pid,
            hostname,
            timestamp,
        })
    }
}

impl fmt::Display for HolderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pid={} hostname={} timestamp={}",
            self.pid.as_deref().unwrap_or("?"),
            self.hostname.as_deref().unwrap_or("?"),
            self.timestamp.as_deref().unwrap_or("?"),
        )
    }
}

/// Read the holder metadata for `path` without taking the lock.
///
/// Returns `None` (never an error) when the file is missing or carries no
/// parsable `key=value` lines; this is diagnostics, not correctness.
#[must_use]
pub fn holder_info(path: &Path) -> Option<HolderInfo> {
    match fs::read_to_string(path) {
        Ok(content) => HolderInfo::parse(&content),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            tracing::warn!(%err, path = %path.display(), "failed to read lock holder info");
            None
        }
    }
}

#[derive(Debug)]
pub struct LockManager {
    path: PathBuf,
}

impl LockManager {
    /// Fails before any I/O when the path cannot name a lock file.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        if path.as_os_str().is_empty() || path.file_name().is_none() {
            return Err(LockError::InvalidPath {
                path: path.display().to_string(),
            });
        }
        Ok(Self { path })
    }

    /// Single non-blocking attempt at the exclusive lock. No retry, no
    /// backoff: contention is terminal for this attempt and retry policy
    /// belongs to the caller.
    pub fn acquire(&self) -> Result<LockGuard, LockError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LockError::Io {
                action: "create lock directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // Opened without truncation: a losing contender must not destroy the
        // holder's metadata before reading it back for diagnostics.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|source| LockError::Io {
                action: "open lock file",
                path: self.path.clone(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                let mut guard = LockGuard {
                    file: Some(file),
                    path: self.path.clone(),
                };
                guard.write_holder_metadata();
                tracing::info!(path = %self.path.display(), "instance lock acquired");
                Ok(guard)
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                drop(file);
                let holder = holder_info(&self.path);
                tracing::error!(
                    path = %self.path.display(),
                    holder = %display_holder(holder.as_ref()),
                    "instance lock already held"
                );
                Err(LockError::AlreadyHeld { holder })
            }
            Err(source) => {
                drop(file);
                Err(LockError::Io {
                    action: "lock",
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }

    /// Read-only holder inspection for this manager's path.
    #[must_use]
    pub fn holder_info(&self) -> Option<HolderInfo> {
        holder_info(&self.path)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Live exclusive handle. Releasing is idempotent and also happens on drop,
/// so every exit path out of the protected region unlocks.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl LockGuard {
    /// Explicitly unlock and close the handle. Process exit would release
    /// the OS lock anyway; releasing here makes the timing deterministic for
    /// callers that keep the process alive afterwards. Secondary errors are
    /// logged, never raised, so they cannot mask a failure already in
    /// flight.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = file.unlock() {
                tracing::warn!(%err, path = %self.path.display(), "error releasing instance lock");
            } else {
                tracing::info!(path = %self.path.display(), "instance lock released");
            }
        }
    }

    // Best-effort: a metadata write failure leaves the lock held and is only
    // logged, since the metadata is not part of the locking contract.
    fn write_holder_metadata(&mut self) {
        if let Some(file) = self.file.as_mut() {
            if let Err(err) = write_metadata(file) {
                tracing::warn!(%err, path = %self.path.display(), "failed to write lock metadata");
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

fn write_metadata(file: &mut File) -> anyhow::Result<()> {
    let hostname = hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "pid={}", std::process::id())?;
    writeln!(file, "hostname={hostname}")?;
    writeln!(file, "timestamp={timestamp}")?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::TempDir;

    use super::*;

    fn lock_path(dir: &TempDir) -> PathBuf {
        dir.path().join("test.lock")
    }

    #[test]
    #[serial]
    fn acquire_writes_three_metadata_lines_with_own_pid() {
        let dir = TempDir::new().expect("tempdir");
        let manager = LockManager::new(lock_path(&dir)).expect("manager");

        let guard = manager.acquire().expect("acquire");
        let content = fs::read_to_string(manager.path()).expect("read lock file");
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], format!("pid={}", std::process::id()));
        assert!(lines[1].starts_with("hostname="));
        assert!(lines[1].len() > "hostname=".len());
        assert!(lines[2].starts_with("timestamp="));
        assert!(lines[2].contains('T'));
        drop(guard);
    }

    #[test]
    #[serial]
    fn second_acquisition_fails_while_first_held_then_succeeds_after_release() {
        let dir = TempDir::new().expect("tempdir");
        let first = LockManager::new(lock_path(&dir)).expect("manager");
        let second = LockManager::new(lock_path(&dir)).expect("manager");

        let mut guard = first.acquire().expect("first acquire");
        let err = second.acquire().expect_err("second acquire must contend");
        assert!(matches!(err, LockError::AlreadyHeld { .. }));
        assert!(err.to_string().to_lowercase().contains("already held"));

        guard.release();
        let reacquired = second.acquire().expect("acquire after release");
        drop(reacquired);
    }

    #[test]
    #[serial]
    fn contention_error_carries_holder_metadata() {
        let dir = TempDir::new().expect("tempdir");
        let first = LockManager::new(lock_path(&dir)).expect("manager");
        let second = LockManager::new(lock_path(&dir)).expect("manager");

        let _guard = first.acquire().expect("first acquire");
        match second.acquire() {
            Err(LockError::AlreadyHeld { holder: Some(info) }) => {
                assert_eq!(info.pid.as_deref(), Some(std::process::id().to_string().as_str()));
            }
            other => panic!("expected AlreadyHeld with holder info, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn holder_info_matches_holder_and_is_none_without_file() {
        let dir = TempDir::new().expect("tempdir");
        let manager = LockManager::new(lock_path(&dir)).expect("manager");

        assert_eq!(manager.holder_info(), None);

        let _guard = manager.acquire().expect("acquire");
        let info = manager.holder_info().expect("holder info while held");
        assert_eq!(info.pid.as_deref(), Some(std::process::id().to_string().as_str()));
        assert!(info.hostname.is_some());
        assert!(info.timestamp.is_some());
    }

    #[test]
    #[serial]
    fn holder_info_is_none_for_unparsable_content() {
        let dir = TempDir::new().expect("tempdir");
        let path = lock_path(&dir);
        fs::write(&path, "no metadata here\n").expect("write");
        assert_eq!(holder_info(&path), None);
    }

    #[test]
    #[serial]
    fn stale_metadata_from_dead_holder_is_overwritten() {
        let dir = TempDir::new().expect("tempdir");
        let path = lock_path(&dir);
        let stale = "pid=999999\nhostname=old-host\ntimestamp=2025-01-01T00:00:00Z\n";
        fs::write(&path, stale).expect("seed stale metadata");

        // The OS lock is the sole liveness authority: nothing inspects the
        // stale pid, the new acquisition simply wins and rewrites the file.
        let manager = LockManager::new(&path).expect("manager");
        let _guard = manager.acquire().expect("acquire over stale metadata");

        let content = fs::read_to_string(&path).expect("read");
        assert!(content.contains(&format!("pid={}", std::process::id())));
        assert!(!content.contains("pid=999999"));
        assert!(!content.contains("old-host"));
    }

    #[test]
    #[serial]
    fn acquire_creates_missing_parent_directories() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("deeper").join("test.lock");
        let manager = LockManager::new(&path).expect("manager");
        let _guard = manager.acquire().expect("acquire");
        assert!(path.exists());
    }

    #[test]
    fn empty_path_is_a_contract_violation_before_io() {
        let err = LockManager::new("").expect_err("empty path must fail");
        assert!(matches!(err, LockError::InvalidPath { .. }));
    }

    #[test]
    #[serial]
    fn release_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let manager = LockManager::new(lock_path(&dir)).expect("manager");
        let mut guard = manager.acquire().expect("acquire");
        guard.release();
        guard.release();
        let _reacquired = manager.acquire().expect("acquire after double release");
    }
}
