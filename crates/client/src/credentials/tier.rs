//! Storage tiers backing the credential store.
//!
//! A tier is a flat string key/value store. The durable tier survives
//! restarts (a JSON file); the secondary tier is transport-oriented and may
//! be shared with other processes or hosts, like a cookie jar.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;

/// Errors raised by a storage tier.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem access failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file could not be encoded or decoded.
    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The tier does not accept writes.
    #[error("storage tier '{0}' is read-only")]
    ReadOnly(&'static str),

    /// A writer panicked while holding the lock.
    #[error("storage tier '{0}' lock poisoned")]
    Poisoned(&'static str),
}

/// A flat key/value persistence tier.
pub trait StorageTier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Read a value. Unreadable tiers return `None`.
    fn read(&self, key: &str) -> Option<String>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier is read-only or persistence fails.
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier is read-only or persistence fails.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Whether writes are currently accepted.
    fn is_writable(&self) -> bool {
        true
    }
}

/// In-process tier. Used as the secondary tier and in tests.
#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: RwLock<HashMap<String, String>>,
    read_only: bool,
}

impl MemoryTier {
    /// Create an empty, writable tier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a read-only tier pre-populated with `entries`.
    ///
    /// Models a tier the client can observe but not update, such as cookies
    /// set by a sibling subdomain.
    #[must_use]
    pub fn read_only<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            read_only: true,
        }
    }
}

impl StorageTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly(self.name()));
        }
        self.entries
            .write()
            .map_err(|_| StorageError::Poisoned(self.name()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly(self.name()));
        }
        self.entries
            .write()
            .map_err(|_| StorageError::Poisoned(self.name()))?
            .remove(key);
        Ok(())
    }

    fn is_writable(&self) -> bool {
        !self.read_only
    }
}

/// Durable tier persisted as a JSON object in a single file.
///
/// The file is read once on open and rewritten on every change.
#[derive(Debug)]
pub struct FileTier {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileTier {
    /// Open (or lazily create) the tier at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        write_private(&tmp, &serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Write a file readable only by its owner.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // A leftover temp file keeps its old mode.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    file.sync_all()
}

impl StorageTier for FileTier {
    fn name(&self) -> &'static str {
        "file"
    }

    fn read(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::Poisoned(self.name()))?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::Poisoned(self.name()))?;
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}
