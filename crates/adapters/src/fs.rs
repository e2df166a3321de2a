//! Atomic filesystem operations and sentinel-protected staging/backup
//! directories.
//!
//! Promotion is a same-filesystem rename per file where possible; when a
//! non-atomic copy is unavoidable (cross-device), we fall back to
//! write-temp -> fsync -> rename within the destination directory, as the
//! spec requires.

use std::fs::Permissions;
use std::io;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

pub const STAGE_SENTINEL: &str = ".guardrails-stage-marker";
pub const BACKUP_SENTINEL: &str = ".guardrails-backup-marker";

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("refusing to remove {path:?}: sentinel {sentinel} not found")]
    MissingSentinel { path: PathBuf, sentinel: &'static str },
}

fn io_err(path: impl Into<PathBuf>, source: io::Error) -> Error {
    Error::Io {
        path: path.into(),
        source,
    }
}

/// Write `bytes` to `path` atomically: write to a sibling temp file, fsync
/// it, then rename into place. `mode` is applied before the rename on
/// unix so the file never exists world-writable, even momentarily.
pub fn atomic_write(path: &Path, bytes: &[u8], mode: u32) -> Result<(), Error> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs_err::create_dir_all(dir).map_err(|e| io_err(dir, e.into()))?;

    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("guardrails"),
        std::process::id()
    ));

    {
        let mut file = std::fs::File::create(&tmp_path).map_err(|e| io_err(&tmp_path, e))?;
        #[cfg(unix)]
        file.set_permissions(Permissions::from_mode(mode)).map_err(|e| io_err(&tmp_path, e))?;
        #[cfg(not(unix))]
        let _ = mode;
        use std::io::Write;
        file.write_all(bytes).map_err(|e| io_err(&tmp_path, e))?;
        file.sync_all().map_err(|e| io_err(&tmp_path, e))?;
    }

    std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;

    Ok(())
}

/// Rename `from` to `to`, retrying once after 50ms on a transient failure,
/// falling back to write-temp+fsync+rename if the rename itself fails
/// because `from`/`to` straddle a filesystem boundary.
pub fn promote_file(from: &Path, to: &Path) -> Result<(), Error> {
    if let Some(parent) = to.parent() {
        fs_err::create_dir_all(parent).map_err(|e| io_err(parent, e.into()))?;
    }

    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(first) => {
            std::thread::sleep(std::time::Duration::from_millis(50));
            match std::fs::rename(from, to) {
                Ok(()) => Ok(()),
                Err(_) if is_cross_device(&first) => {
                    let bytes = fs_err::read(from).map_err(|e| io_err(from, e.into()))?;
                    let mode = mode_of(from).unwrap_or(0o644);
                    atomic_write(to, &bytes, mode)?;
                    std::fs::remove_file(from).map_err(|e| io_err(from, e))?;
                    Ok(())
                }
                Err(e) => Err(io_err(to, e)),
            }
        }
    }
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc_exdev())
}

#[cfg(unix)]
fn libc_exdev() -> i32 {
    18 // EXDEV on Linux; stable across the platforms this engine targets.
}

#[cfg(not(unix))]
fn is_cross_device(_err: &io::Error) -> bool {
    false
}

#[cfg(unix)]
fn mode_of(path: &Path) -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).ok().map(|m| m.mode() & 0o7777)
}

#[cfg(not(unix))]
fn mode_of(_path: &Path) -> Option<u32> {
    None
}

/// A guard over a staging (or backup) directory: created with its
/// sentinel written, removed only via [`safe_rmtree`].
#[derive(Debug)]
pub struct StageGuard {
    pub dir: PathBuf,
}

/// Create `<root>/.staging/<component>/` (or `.backup/<component>/`) with
/// its sentinel file containing `component`, pid, and wall clock.
pub fn stage(dir: &Path, component: &str, sentinel: &'static str) -> Result<StageGuard, Error> {
    fs_err::create_dir_all(dir).map_err(|e| io_err(dir, e.into()))?;

    let marker = dir.join(sentinel);
    let contents = format!(
        "component={component}\npid={}\nstarted_at={}\n",
        std::process::id(),
        chrono::Utc::now().to_rfc3339()
    );
    atomic_write(&marker, contents.as_bytes(), 0o644)?;

    Ok(StageGuard { dir: dir.to_path_buf() })
}

/// Remove `dir` recursively, but only if it contains `sentinel`. Refuses
/// to operate on a directory lacking the expected marker, preventing
/// accidental removal of user-owned content.
pub fn safe_rmtree(dir: &Path, sentinel: &'static str) -> Result<(), Error> {
    if !dir.exists() {
        return Ok(());
    }

    if !dir.join(sentinel).is_file() {
        return Err(Error::MissingSentinel {
            path: dir.to_path_buf(),
            sentinel,
        });
    }

    std::fs::remove_dir_all(dir).map_err(|e| io_err(dir, e))
}

/// An advisory lock over `.ai/guardrails/.lock`, held for the duration of
/// a run. `fs2`'s `try_lock_exclusive` provides the OS-level advisory
/// lock; the file itself also records the holder for diagnostics.
pub struct Lock {
    _file: std::fs::File,
    path: PathBuf,
}

impl Lock {
    /// Attempt to acquire the lock at `path`, failing immediately
    /// (non-blocking) if another run already holds it.
    pub fn try_acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent).map_err(|e| LockError::Io(e.into()))?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(LockError::Io)?;

        file.try_lock_exclusive().map_err(|_| LockError::Busy)?;

        use std::io::Write;
        let mut writer = &file;
        let _ = write!(writer, "pid={}\n", std::process::id());

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock is held by another run")]
    Busy,
    #[error("io error acquiring lock")]
    Io(#[source] io::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/file.txt");
        atomic_write(&path, b"hello", 0o644).unwrap();
        assert_eq!(fs_err::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn safe_rmtree_refuses_without_sentinel() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("user-file.txt"), b"keep me").unwrap();

        let result = safe_rmtree(&staging, STAGE_SENTINEL);
        assert!(matches!(result, Err(Error::MissingSentinel { .. })));
        assert!(staging.exists());
    }

    #[test]
    fn safe_rmtree_removes_when_sentinel_present() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("staging");
        let guard = stage(&staging, "core", STAGE_SENTINEL).unwrap();

        safe_rmtree(&guard.dir, STAGE_SENTINEL).unwrap();
        assert!(!staging.exists());
    }

    #[test]
    fn lock_refuses_second_holder() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join(".lock");

        let first = Lock::try_acquire(&lock_path).unwrap();
        let second = Lock::try_acquire(&lock_path);
        assert!(matches!(second, Err(LockError::Busy)));

        drop(first);
        assert!(Lock::try_acquire(&lock_path).is_ok());
    }
}
