//! # sirac-keystore
//!
//! Small namespaced key/value persistence for the SIRAC onboarding client.
//!
//! The mobile client keeps exactly three entries between runs: the API base
//! URL, the bearer token, and the JSON-encoded last logged-in user. On a
//! device those live in the platform secure store; here they live in a
//! single JSON file per namespace under the platform data directory.
//!
//! ## How it works
//!
//! 1. [`FileStore::open_default`] resolves [`store_dir`] (honouring
//!    `SIRAC_STORE_DIR`) and loads `<namespace>.json` if it exists.
//! 2. Reads are served from the in-memory map.
//! 3. Every write rewrites the file atomically (temp file + rename). On Unix
//!    the file is created with mode `0600`.
//!
//! [`MemoryStore`] offers the same [`KeyValueStore`] interface without any
//! I/O and is what tests inject.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sirac_keystore::{FileStore, KeyValueStore, AUTH_TOKEN_KEY};
//!
//! let store = FileStore::open_default("default").expect("store unavailable");
//! store.set(AUTH_TOKEN_KEY, "abc123").unwrap();
//! assert_eq!(store.get(AUTH_TOKEN_KEY).unwrap().as_deref(), Some("abc123"));
//! ```
//!
//! ## Environment variable overrides
//!
//! - `SIRAC_STORE_DIR` — directory holding the namespace files.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Key holding the API base URL chosen by the user.
pub const API_BASE_URL_KEY: &str = "sirac_api_base_url";

/// Key holding the bearer token returned by login.
pub const AUTH_TOKEN_KEY: &str = "sirac_auth_token";

/// Key holding the JSON-encoded last logged-in user.
pub const USER_DATA_KEY: &str = "sirac_user_data";

/// Directory name used below the platform data directory.
const APP_DIR: &str = "sirac";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by keystore operations.
#[derive(Error, Debug)]
pub enum KeystoreError {
    /// Could not create the store directory.
    #[error("Store directory error for '{path}': {source}")]
    StoreDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The namespace file exists but could not be read.
    #[error("Failed to read store '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The namespace file could not be written.
    #[error("Failed to write store '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The namespace file is not a flat JSON object of strings.
    #[error("Store '{path}' is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Namespace names become file names, so they are restricted.
    #[error("Invalid namespace '{0}': use ASCII letters, digits, '-' or '_'")]
    InvalidNamespace(String),
}

// ── Store trait ──────────────────────────────────────────────────────────────

/// String key/value persistence.
///
/// Implementations must be `Send + Sync`; the onboarding client shares one
/// store between the session and the HTTP client.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value for `key`, or `None` when unset.
    fn get(&self, key: &str) -> Result<Option<String>, KeystoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), KeystoreError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), KeystoreError>;
}

// ── In-memory store ──────────────────────────────────────────────────────────

/// A volatile store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, KeystoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KeystoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KeystoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

// ── File-backed store ────────────────────────────────────────────────────────

/// A store persisted as `<dir>/<namespace>.json`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens (or prepares to create) the namespace file inside `dir`.
    ///
    /// The directory is created lazily on first write.
    pub fn open(dir: impl AsRef<Path>, namespace: &str) -> Result<Self, KeystoreError> {
        validate_namespace(namespace)?;
        let path = dir.as_ref().join(format!("{namespace}.json"));
        let entries = load_entries(&path)?;
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Opens the namespace inside [`store_dir`].
    pub fn open_default(namespace: &str) -> Result<Self, KeystoreError> {
        Self::open(store_dir(), namespace)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), KeystoreError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|source| KeystoreError::StoreDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let body = serde_json::to_vec_pretty(entries).map_err(|e| KeystoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let write_err = |source| KeystoreError::Write {
            path: self.path.clone(),
            source,
        };

        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = open_private(&tmp_path).map_err(write_err)?;
        file.write_all(&body).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        std::fs::rename(&tmp_path, &self.path).map_err(write_err)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, KeystoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KeystoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), KeystoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

// ── Directory resolution ─────────────────────────────────────────────────────

/// Returns the directory holding namespace files.
///
/// Default locations:
/// - **macOS**: `~/Library/Application Support/sirac/`
/// - **Linux**: `~/.local/share/sirac/`
/// - **Windows**: `%LOCALAPPDATA%\sirac\`
///
/// Override by setting `SIRAC_STORE_DIR`.
pub fn store_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var("SIRAC_STORE_DIR") {
        if !override_dir.is_empty() {
            return PathBuf::from(override_dir);
        }
    }

    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn validate_namespace(namespace: &str) -> Result<(), KeystoreError> {
    let ok = !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(KeystoreError::InvalidNamespace(namespace.to_string()))
    }
}

fn load_entries(path: &Path) -> Result<BTreeMap<String, String>, KeystoreError> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(KeystoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&raw).map_err(|e| KeystoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::File::create(path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
