use std::fs::{self, OpenOptions, TryLockError};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{JobError, Result};
use crate::types::JobDescriptor;

/// Suffix of the advisory lock placed next to a descriptor file.
pub const LOCK_SUFFIX: &str = "lock";
/// Suffix of the scratch file used while rewriting a descriptor file.
pub const TEMP_SUFFIX: &str = "tmp";

/// One file of ordered job descriptors, read and written as a whole.
#[derive(Debug, Clone)]
pub struct DescriptorFile {
    path: PathBuf,
}

impl DescriptorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the file into its descriptors, in file order.
    ///
    /// Any entry that is not a descriptor object, `null` included, fails the
    /// whole file.
    pub fn read(&self) -> Result<Vec<JobDescriptor>> {
        let content = fs::read_to_string(&self.path).map_err(|source| JobError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| JobError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the file contents with `descriptors`.
    ///
    /// The new contents are written to a sibling scratch file and renamed over
    /// the original, so readers see either the old or the new array.
    pub fn write(&self, descriptors: &[JobDescriptor]) -> Result<()> {
        let mut body = serde_json::to_string_pretty(descriptors).map_err(|e| JobError::Write {
            path: self.path.clone(),
            source: std::io::Error::other(e),
        })?;
        body.push('\n');

        let tmp = sibling(&self.path, TEMP_SUFFIX);
        let result = write_synced(&tmp, body.as_bytes()).and_then(|_| fs::rename(&tmp, &self.path));
        if let Err(source) = result {
            let _ = fs::remove_file(&tmp);
            return Err(JobError::Write {
                path: self.path.clone(),
                source,
            });
        }
        debug!(file = %self.path.display(), count = descriptors.len(), "descriptor file written");
        Ok(())
    }

    /// Take the advisory lock for this file without blocking.
    ///
    /// The lock is an OS lock on the sibling `<file>.lock`, so it is released
    /// by the kernel when its holder exits, however it exits. The lock file
    /// itself is left in place and only records the last holder.
    pub fn lock(&self, holder: &str) -> Result<FileLock> {
        let lock_path = sibling(&self.path, LOCK_SUFFIX);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| self.lock_error(source))?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                let mut current = String::new();
                let _ = file.read_to_string(&mut current);
                return Err(JobError::Locked {
                    path: self.path.clone(),
                    holder: current.trim().to_string(),
                });
            }
            Err(TryLockError::Error(source)) => return Err(self.lock_error(source)),
        }

        file.set_len(0)
            .and_then(|_| writeln!(file, "{holder}"))
            .map_err(|source| self.lock_error(source))?;
        debug!(lock = %lock_path.display(), holder, "lock acquired");
        Ok(FileLock {
            file,
            path: lock_path,
        })
    }

    fn lock_error(&self, source: std::io::Error) -> JobError {
        JobError::Lock {
            path: self.path.clone(),
            source,
        }
    }
}

/// Held advisory lock, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: fs::File,
    path: PathBuf,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(lock = %self.path.display(), "failed to release lock: {e}");
        }
    }
}

/// True for scratch and lock files that live next to descriptor files.
pub fn is_auxiliary(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(LOCK_SUFFIX) | Some(TEMP_SUFFIX)
    )
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
