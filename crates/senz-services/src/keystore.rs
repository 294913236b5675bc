//! Persistent public-key store.
//!
//! One record per registered name, written once at SHARE registration and
//! never mutated. Lookups are served from an in-memory map; every save
//! rewrites the JSON file so the directory survives restarts. No deletion
//! is exposed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use dashmap::DashMap;
use thiserror::Error;

/// A registered senzie: its name and hex-encoded Ed25519 public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyRecord {
    pub name: String,
    pub public_key: String,
}

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, serde_json::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize key store: {0}")]
    SerializeFailed(serde_json::Error),
}

/// Name → public key directory, cached in memory and persisted as JSON.
pub struct KeyStore {
    path: PathBuf,
    records: DashMap<String, String>,
    write_lock: Mutex<()>,
}

impl KeyStore {
    /// Open the store at `path`, loading existing records if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, KeyStoreError> {
        let path = path.into();
        let records = DashMap::new();
        if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| KeyStoreError::ReadFailed(path.clone(), e))?;
            let map: BTreeMap<String, String> = serde_json::from_str(&text)
                .map_err(|e| KeyStoreError::ParseFailed(path.clone(), e))?;
            for (name, key) in map {
                records.insert(name, key);
            }
        }
        Ok(Self {
            path,
            records,
            write_lock: Mutex::new(()),
        })
    }

    /// Look up a record by name.
    pub fn find(&self, name: &str) -> Option<PublicKeyRecord> {
        self.records.get(name).map(|entry| PublicKeyRecord {
            name: name.to_string(),
            public_key: entry.value().clone(),
        })
    }

    /// Persist a new record. The caller has already established that the
    /// name is fresh; a duplicate save would overwrite, so don't.
    pub fn save(&self, record: PublicKeyRecord) -> Result<(), KeyStoreError> {
        tracing::info!(name = %record.name, "public key saved");
        self.records.insert(record.name, record.public_key);
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&self) -> Result<(), KeyStoreError> {
        let snapshot: BTreeMap<String, String> = self
            .records
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let text =
            serde_json::to_string_pretty(&snapshot).map_err(KeyStoreError::SerializeFailed)?;

        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| KeyStoreError::WriteFailed(self.path.clone(), e))?;
        }
        std::fs::write(&self.path, text)
            .map_err(|e| KeyStoreError::WriteFailed(self.path.clone(), e))
    }
}
