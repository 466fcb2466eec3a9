//! File storage backend
//!
//! Stores records in a single JSON file in the vault's data directory. Records
//! are written through on every change using a temp file and rename.

use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::RecordStorage;
use crate::crypto::{decrypt_field, encrypt_field, generate_iv, parse_iv, EncryptionKey};
use crate::error::{Result, VaultError};

/// Known plaintext sealed with the vault key to detect a wrong key at startup
const KEY_CHECK_PLAINTEXT: &str = "api-vault-key-check";

/// File format for persistent storage
#[derive(Debug, Default, Serialize, Deserialize)]
struct StorageFile {
    version: u32,
    entries: BTreeMap<String, String>,
}

/// JSON file storage backend
pub struct FileStorage {
    storage_dir: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Default data directory for the current user
    pub fn default_dir() -> Result<PathBuf> {
        ProjectDirs::from("com", "symbia-labs", "api-vault")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| {
                VaultError::StorageError("Could not determine data directory".to_string())
            })
    }

    /// Open the store in `storage_dir`, creating the directory if needed
    pub async fn open(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_dir = storage_dir.into();
        tokio::fs::create_dir_all(&storage_dir).await?;

        let storage = Self {
            storage_dir,
            entries: RwLock::new(BTreeMap::new()),
        };
        storage.load().await?;

        debug!("File storage opened at: {:?}", storage.storage_dir);
        Ok(storage)
    }

    /// Get the storage directory path
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn storage_file_path(&self) -> PathBuf {
        self.storage_dir.join("vault.json")
    }

    fn salt_file_path(&self) -> PathBuf {
        self.storage_dir.join("salt")
    }

    fn key_check_file_path(&self) -> PathBuf {
        self.storage_dir.join("key-check")
    }

    async fn load(&self) -> Result<()> {
        let path = self.storage_file_path();
        if !path.exists() {
            debug!("No existing storage file found");
            return Ok(());
        }

        let contents = tokio::fs::read_to_string(&path).await?;
        let file: StorageFile = serde_json::from_str(&contents)?;

        let mut entries = self.entries.write().await;
        *entries = file.entries;

        debug!("Loaded {} entries from storage", entries.len());
        Ok(())
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let file = StorageFile {
            version: 1,
            entries: entries.clone(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        let path = self.storage_file_path();

        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!("Saved {} entries to storage", entries.len());
        Ok(())
    }

    /// Load the passphrase salt, if one was saved
    pub async fn load_salt(&self) -> Result<Option<String>> {
        let path = self.salt_file_path();
        if !path.exists() {
            return Ok(None);
        }
        let salt = tokio::fs::read_to_string(&path).await?;
        Ok(Some(salt.trim().to_string()))
    }

    pub async fn save_salt(&self, salt: &str) -> Result<()> {
        tokio::fs::write(self.salt_file_path(), salt).await?;
        Ok(())
    }

    /// Seal the known plaintext with `key` so later opens can verify the key
    pub async fn save_key_check(&self, key: &EncryptionKey) -> Result<()> {
        let iv = generate_iv();
        let sealed = encrypt_field(KEY_CHECK_PLAINTEXT, key, &iv)?;
        tokio::fs::write(
            self.key_check_file_path(),
            format!("{}:{}", hex::encode(iv), sealed),
        )
        .await?;
        debug!("Saved key check");
        Ok(())
    }

    /// Whether `key` matches the key this store was first opened with.
    ///
    /// Returns `None` when no key check has been saved yet.
    pub async fn verify_key(&self, key: &EncryptionKey) -> Result<Option<bool>> {
        let path = self.key_check_file_path();
        if !path.exists() {
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(&path).await?;
        let Some((iv_hex, sealed)) = contents.trim().split_once(':') else {
            warn!("Malformed key check file");
            return Ok(Some(false));
        };

        let matches = parse_iv(iv_hex)
            .and_then(|iv| decrypt_field(sealed, key, &iv))
            .map(|plaintext| plaintext == KEY_CHECK_PLAINTEXT)
            .unwrap_or(false);

        Ok(Some(matches))
    }
}

#[async_trait]
impl RecordStorage for FileStorage {
    async fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        let value = String::from_utf8(value.to_vec())
            .map_err(|e| VaultError::StorageError(format!("Record is not UTF-8: {}", e)))?;

        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value);
        self.persist(&entries).await?;

        debug!("Stored key: {}", key);
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).map(|v| v.as_bytes().to_vec()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
            debug!("Deleted key: {}", key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.clear();
        self.persist(&entries).await?;
        debug!("Cleared all entries");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "File Storage"
    }
}
