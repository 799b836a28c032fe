//! Wipe target execution strategies
//!
//! [`FsWipeExecutor`] is the real thing: optional multi-pass random
//! overwrite followed by deletion. [`RecordingWipeExecutor`] is the
//! injectable no-op used by tests, wired in at engine construction.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::RngCore;
use thiserror::Error;

/// Overwrite buffer size
const WIPE_CHUNK: usize = 64 * 1024;

/// Errors from a single wipe target
#[derive(Debug, Error)]
pub enum WipeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The three protected storage categories
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WipeTarget {
    Database,
    Settings,
    Cache,
}

impl std::fmt::Display for WipeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WipeTarget::Database => "database",
            WipeTarget::Settings => "settings",
            WipeTarget::Cache => "cache",
        };
        f.write_str(name)
    }
}

/// Secure-wipe behavior for one execution
#[derive(Clone, Copy, Debug)]
pub struct SecureWipeOptions {
    /// Overwrite before deletion
    pub enabled: bool,
    /// Number of random-fill passes
    pub passes: u32,
}

/// Strategy interface for destroying one storage category.
///
/// Implementations must treat an absent or already-empty target as a
/// successful no-op, and must never panic on I/O problems.
pub trait WipeExecutor: Send + Sync {
    fn wipe(&self, target: WipeTarget, opts: SecureWipeOptions) -> Result<(), WipeError>;
}

/// Filesystem-backed wipe executor.
///
/// The database is a single file, settings may span several files
/// (settings store plus credential records), and the cache is a directory
/// whose contents are destroyed recursively.
pub struct FsWipeExecutor {
    database_path: PathBuf,
    settings_paths: Vec<PathBuf>,
    cache_dir: PathBuf,
}

impl FsWipeExecutor {
    pub fn new(database_path: PathBuf, settings_paths: Vec<PathBuf>, cache_dir: PathBuf) -> Self {
        Self {
            database_path,
            settings_paths,
            cache_dir,
        }
    }
}

impl WipeExecutor for FsWipeExecutor {
    fn wipe(&self, target: WipeTarget, opts: SecureWipeOptions) -> Result<(), WipeError> {
        match target {
            WipeTarget::Database => wipe_file(&self.database_path, opts),
            WipeTarget::Settings => {
                for path in &self.settings_paths {
                    wipe_file(path, opts)?;
                }
                Ok(())
            }
            WipeTarget::Cache => wipe_dir_contents(&self.cache_dir, opts),
        }
    }
}

/// Overwrite (when enabled) and delete a single file. Missing files are a
/// no-op success.
fn wipe_file(path: &Path, opts: SecureWipeOptions) -> Result<(), WipeError> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if opts.enabled && metadata.len() > 0 {
        overwrite_file(path, metadata.len(), opts.passes.max(1))?;
    }

    fs::remove_file(path)?;
    tracing::debug!(path = %path.display(), "wiped file");
    Ok(())
}

/// Fill the file with fresh random bytes, once per pass, syncing each pass
/// to disk before the next begins.
fn overwrite_file(path: &Path, len: u64, passes: u32) -> Result<(), WipeError> {
    let mut rng = rand::thread_rng();
    let mut buf = vec![0u8; WIPE_CHUNK];

    for pass in 0..passes {
        let mut file = OpenOptions::new().write(true).open(path)?;
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(buf.len() as u64) as usize;
            rng.fill_bytes(&mut buf[..chunk]);
            file.write_all(&buf[..chunk])?;
            remaining -= chunk as u64;
        }
        file.sync_all()?;
        tracing::trace!(path = %path.display(), pass, "overwrite pass complete");
    }

    Ok(())
}

/// Destroy everything inside a directory, leaving the directory itself.
/// A missing directory is a no-op success.
fn wipe_dir_contents(dir: &Path, opts: SecureWipeOptions) -> Result<(), WipeError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            wipe_dir_contents(&path, opts)?;
            fs::remove_dir(&path)?;
        } else {
            wipe_file(&path, opts)?;
        }
    }

    Ok(())
}

/// Recording no-op executor for tests: remembers which targets were wiped
/// and can be told to fail specific targets.
#[derive(Default)]
pub struct RecordingWipeExecutor {
    wiped: Mutex<Vec<WipeTarget>>,
    failing: Mutex<Vec<WipeTarget>>,
}

impl RecordingWipeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent wipes of this target fail with an I/O error.
    pub fn fail_on(&self, target: WipeTarget) {
        self.failing.lock().unwrap().push(target);
    }

    /// Targets wiped so far, in order.
    pub fn wiped(&self) -> Vec<WipeTarget> {
        self.wiped.lock().unwrap().clone()
    }
}

impl WipeExecutor for RecordingWipeExecutor {
    fn wipe(&self, target: WipeTarget, _opts: SecureWipeOptions) -> Result<(), WipeError> {
        if self.failing.lock().unwrap().contains(&target) {
            return Err(WipeError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected wipe failure",
            )));
        }
        self.wiped.lock().unwrap().push(target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn plain() -> SecureWipeOptions {
        SecureWipeOptions {
            enabled: false,
            passes: 1,
        }
    }

    fn secure(passes: u32) -> SecureWipeOptions {
        SecureWipeOptions {
            enabled: true,
            passes,
        }
    }

    #[test]
    fn test_wipe_missing_file_is_noop_success() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.db");
        assert!(wipe_file(&path, plain()).is_ok());
        assert!(wipe_file(&path, secure(3)).is_ok());
    }

    #[test]
    fn test_wipe_file_removes_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("detections.db");
        fs::write(&path, b"sensitive scan records").unwrap();

        wipe_file(&path, secure(3)).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_wipe_empty_file_skips_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.db");
        fs::write(&path, b"").unwrap();

        wipe_file(&path, secure(3)).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_wipe_dir_contents_recurses_and_keeps_root() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        fs::create_dir_all(cache.join("thumbs")).unwrap();
        fs::write(cache.join("index.bin"), b"cache index").unwrap();
        fs::write(cache.join("thumbs").join("a.png"), b"thumb").unwrap();

        wipe_dir_contents(&cache, plain()).unwrap();
        assert!(cache.exists());
        assert_eq!(fs::read_dir(&cache).unwrap().count(), 0);
    }

    #[test]
    fn test_fs_executor_wipes_all_settings_paths() {
        let dir = tempdir().unwrap();
        let settings = dir.path().join("settings.json");
        let credential = dir.path().join("credential.json");
        fs::write(&settings, b"{}").unwrap();
        fs::write(&credential, b"{}").unwrap();

        let executor = FsWipeExecutor::new(
            dir.path().join("detections.db"),
            vec![settings.clone(), credential.clone()],
            dir.path().join("cache"),
        );

        executor.wipe(WipeTarget::Settings, plain()).unwrap();
        assert!(!settings.exists());
        assert!(!credential.exists());
    }

    #[test]
    fn test_recording_executor_tracks_and_fails() {
        let executor = RecordingWipeExecutor::new();
        executor.fail_on(WipeTarget::Cache);

        executor.wipe(WipeTarget::Database, plain()).unwrap();
        assert!(executor.wipe(WipeTarget::Cache, plain()).is_err());
        assert_eq!(executor.wiped(), vec![WipeTarget::Database]);
    }
}
