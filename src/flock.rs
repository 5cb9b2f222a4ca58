use std::{
    fs::File,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::{debug, trace};
use thiserror::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Exclusive advisory lock on a file, released on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    _file: File,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("Timed out after {}s waiting for the lock on {}", .timeout.as_secs(), .path.display())]
    Timeout { path: PathBuf, timeout: Duration },
}

impl FileLock {
    pub fn new(path: &Path) -> Result<Self, Error> {
        Self::with_timeout(path, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(path: &Path, timeout: Duration) -> Result<Self, Error> {
        let file = File::create(path)?;
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(true) => {
                    trace!("Locked {}", path.display());
                    return Ok(Self {
                        path: path.to_path_buf(),
                        _file: file,
                    });
                }
                Ok(false) => {
                    if start.elapsed() >= timeout {
                        return Err(Error::Timeout {
                            path: path.to_path_buf(),
                            timeout,
                        });
                    }
                    debug!("Failed to acquire a lock on {}, retrying", path.display());
                    std::thread::sleep(RETRY_DELAY);
                }
                Err(error)
                    if error.raw_os_error() == fs4::lock_contended_error().raw_os_error() =>
                {
                    if start.elapsed() >= timeout {
                        return Err(Error::Timeout {
                            path: path.to_path_buf(),
                            timeout,
                        });
                    }
                    debug!("Failed to acquire a lock on {}, retrying", path.display());
                    std::thread::sleep(RETRY_DELAY);
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");
        let held = FileLock::new(&path).unwrap();
        assert_eq!(held.path(), path.as_path());

        let other = FileLock::with_timeout(&path, Duration::ZERO);
        assert!(matches!(other, Err(Error::Timeout { .. })));

        drop(held);
        assert!(FileLock::with_timeout(&path, Duration::ZERO).is_ok());
    }
}
