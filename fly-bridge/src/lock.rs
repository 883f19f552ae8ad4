//! Exclusive-ownership marker: an advisory file lock held while a bridge instance is live.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

const DIRECTORY_LOCK_NAME: &str = ".flydrop-bridge.lock";

/// Where the lock file lives, and therefore what it guards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    /// Named after the current process id in the temp dir. Only one bridge per process; two
    /// processes never see each other's lock.
    #[default]
    Process,
    /// Fixed name inside the working directory. One bridge per working directory, across
    /// processes.
    Directory,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("bridge lock already held: {}", path.display())]
    Held { path: PathBuf },
    #[error("bridge lock io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Held lock. Released on [`InstanceLock::release`] or drop, whichever comes first.
#[derive(Debug)]
pub struct InstanceLock {
    file: Option<File>,
    path: PathBuf,
}

impl InstanceLock {
    /// Lock file path for `scope`. `directory` is the bridge working directory.
    pub fn path_for(scope: LockScope, directory: &Path) -> PathBuf {
        match scope {
            LockScope::Process => {
                std::env::temp_dir().join(format!("flydrop-bridge-{}.lock", std::process::id()))
            }
            LockScope::Directory => directory.join(DIRECTORY_LOCK_NAME),
        }
    }

    /// Take the lock without waiting. Fails with [`LockError::Held`] if anyone, this process
    /// included, already holds it.
    pub fn acquire(scope: LockScope, directory: &Path) -> Result<Self, LockError> {
        let path = Self::path_for(scope, directory);
        let io_err = |source| LockError::Io {
            path: path.clone(),
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
            .open(&path)
            .map_err(io_err)?;
        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                return Err(LockError::Held { path });
            }
            Err(e) => return Err(io_err(e)),
        }
        tracing::debug!(path = %path.display(), ?scope, "bridge lock acquired");
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlock now. The lock file is never removed, so every acquirer contends on the same inode.
    pub fn release(mut self) {
        self.unlock();
    }

    fn unlock(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        if let Err(e) = FileExt::unlock(&file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to unlock bridge lock");
        }
        drop(file);
        tracing::debug!(path = %self.path.display(), "bridge lock released");
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_lock_is_exclusive_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let first = InstanceLock::acquire(LockScope::Directory, dir.path()).unwrap();
        assert_eq!(first.path(), dir.path().join(DIRECTORY_LOCK_NAME));

        let second = InstanceLock::acquire(LockScope::Directory, dir.path());
        assert!(matches!(second, Err(LockError::Held { .. })));

        first.release();
        let third = InstanceLock::acquire(LockScope::Directory, dir.path()).unwrap();
        drop(third);
        InstanceLock::acquire(LockScope::Directory, dir.path()).unwrap();
    }

    #[test]
    fn separate_directories_do_not_collide() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let _la = InstanceLock::acquire(LockScope::Directory, a.path()).unwrap();
        let _lb = InstanceLock::acquire(LockScope::Directory, b.path()).unwrap();
    }

    // the only test in this binary that takes the per-process lock
    #[test]
    fn process_scope_is_exclusive_and_keeps_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = InstanceLock::acquire(LockScope::Process, dir.path()).unwrap();
        let other_dir = tempfile::tempdir().unwrap();
        let second = InstanceLock::acquire(LockScope::Process, other_dir.path());
        assert!(matches!(second, Err(LockError::Held { .. })));

        let path = first.path().to_path_buf();
        first.release();
        assert!(path.exists());
        InstanceLock::acquire(LockScope::Process, dir.path()).unwrap();
    }

    #[test]
    fn process_scope_names_lock_after_pid() {
        let path = InstanceLock::path_for(LockScope::Process, Path::new("/ignored"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("flydrop-bridge-{}.lock", std::process::id()));
        assert!(path.starts_with(std::env::temp_dir()));
    }
}
