//! Key-value settings persistence
//!
//! Configuration storage mechanics are an external concern: the warden only
//! requires get/set of string-valued keys. [`JsonSettingsStore`] is the
//! file-backed implementation used in deployments (and doubles as the
//! "settings" wipe target); [`MemorySettingsStore`] backs tests.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{Result, WardenError};

/// Settings file name
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Narrow contract over the external settings store.
pub trait SettingsStore: Send + Sync {
    /// Read a raw value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a raw value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a single key. Removing an absent key is a no-op.
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every stored key.
    fn clear(&self) -> Result<()>;

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, if value { "true" } else { "false" })
    }

    fn set_u32(&self, key: &str, value: u32) -> Result<()> {
        self.set(key, &value.to_string())
    }

    fn set_u64(&self, key: &str, value: u64) -> Result<()> {
        self.set(key, &value.to_string())
    }
}

/// In-memory settings store for tests and ephemeral profiles.
#[derive(Default)]
pub struct MemorySettingsStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }
}

/// JSON file-backed settings store.
///
/// The whole map is persisted on every mutation with an atomic
/// temp-file-then-rename write and `0o600` permissions on Unix.
pub struct JsonSettingsStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl JsonSettingsStore {
    /// Open (or create) a store at the given file path.
    ///
    /// A missing file yields an empty store; a corrupt file is an error
    /// rather than silent data loss.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)
                .map_err(|e| WardenError::Storage(format!("Failed to parse settings: {}", e)))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Default settings path under the platform config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flock-warden")
            .join(SETTINGS_FILE_NAME)
    }

    /// Path of the backing file (the "settings" wipe target).
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        let contents = serde_json::to_string_pretty(entries)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents)?;
        fs::rename(&temp_path, &self.path)?;

        // Set restrictive permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.clear();
        self.persist(&entries)
    }
}
