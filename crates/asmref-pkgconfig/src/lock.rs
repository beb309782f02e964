use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;

use crate::error::{PkgConfigError, Result};

/// How long to wait for another process holding the cache file lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            delay: Duration::from_millis(200),
        }
    }
}

/// Advisory lock on `<cache file>.lock`, released on drop.
#[derive(Debug)]
pub(crate) struct CacheFileLock {
    file: File,
}

impl CacheFileLock {
    pub(crate) fn acquire(cache_file: &Path, exclusive: bool, policy: LockPolicy) -> Result<Self> {
        let path = lock_path(cache_file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| PkgConfigError::io(parent, err))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| PkgConfigError::io(&path, err))?;

        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            // Fully qualified so the `fs2` methods win over the inherent
            // `File` locking methods on newer toolchains.
            let locked = if exclusive {
                FileExt::try_lock_exclusive(&file)
            } else {
                FileExt::try_lock_shared(&file)
            };
            match locked {
                Ok(()) => return Ok(Self { file }),
                Err(err) => {
                    tracing::debug!(
                        target = "asmref.pkgconfig",
                        path = %path.display(),
                        attempt,
                        error = %err,
                        "package cache lock busy"
                    );
                    if attempt < attempts {
                        std::thread::sleep(policy.delay);
                    }
                }
            }
        }

        Err(PkgConfigError::LockContended {
            path: cache_file.to_path_buf(),
        })
    }
}

impl Drop for CacheFileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub(crate) fn lock_path(cache_file: &Path) -> PathBuf {
    let mut name = cache_file.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}
