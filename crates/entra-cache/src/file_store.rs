use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

use crate::crypto::{self, EncryptionKey, SealedBlob};
use crate::error::{CacheError, Result};
use crate::secret::SecretProvider;
use crate::store::CacheStorage;

const AAD_CONTEXT: &str = "token-cache";

/// File-based encrypted cache storage
///
/// Persists the whole key-value map as one AES-256-GCM sealed file. Cache
/// keys are not filename-safe, so records share a single file rather than
/// one file each.
///
/// # Directory Structure
/// ```text
/// ~/.config/entra-auth/cache/
/// ├── meta.json   # Storage metadata (version, passphrase salt)
/// ├── lock        # Advisory lock file
/// └── cache.json  # Sealed entry map
/// ```
pub struct FileStorage {
    cache_file: PathBuf,
    lock_file: PathBuf,
    key: EncryptionKey,
    /// Write-through copy of the on-disk map
    entries: Arc<RwLock<HashMap<String, String>>>,
}

/// Metadata for key derivation and storage format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreMeta {
    version: u32,
    created_at: chrono::DateTime<chrono::Utc>,
    /// Base64-encoded Argon2id salt (when sealed with a passphrase)
    #[serde(skip_serializing_if = "Option::is_none")]
    passphrase_salt: Option<String>,
}

impl Default for StoreMeta {
    fn default() -> Self {
        Self {
            version: 1,
            created_at: chrono::Utc::now(),
            passphrase_salt: None,
        }
    }
}

impl FileStorage {
    /// Open (or create) a store sealed with a passphrase-derived key.
    ///
    /// # Arguments
    /// * `storage_dir` - Base directory for storage (e.g., ~/.config/entra-auth/cache)
    /// * `secret_provider` - Provider for the sealing passphrase
    pub async fn new(
        storage_dir: impl AsRef<Path>,
        secret_provider: Arc<dyn SecretProvider>,
    ) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        Self::prepare_dir(&storage_dir).await?;

        let meta_path = storage_dir.join("meta.json");
        let mut meta = if meta_path.exists() {
            let content = fs::read_to_string(&meta_path).await?;
            serde_json::from_str(&content).map_err(|_| CacheError::CorruptedStore)?
        } else {
            StoreMeta::default()
        };

        let salt = match &meta.passphrase_salt {
            Some(salt_b64) => STANDARD
                .decode(salt_b64)
                .map_err(|_| CacheError::CorruptedStore)?,
            None => {
                let salt = crypto::generate_salt();
                meta.passphrase_salt = Some(STANDARD.encode(salt));
                salt.to_vec()
            }
        };

        let passphrase = secret_provider
            .get_passphrase("Enter passphrase for the token cache")
            .await
            .ok_or(CacheError::MissingSecret)?;
        let key = EncryptionKey::derive_from_passphrase(&passphrase, &salt)?;

        let meta_json =
            serde_json::to_string_pretty(&meta).map_err(CacheError::Serialization)?;
        fs::write(&meta_path, meta_json).await?;

        Self::open(storage_dir, key).await
    }

    /// Open (or create) a store sealed with caller-provided key bytes.
    ///
    /// Use this when the application keeps the key in an OS keyring or
    /// similar and no passphrase prompt is wanted.
    pub async fn with_key(storage_dir: impl AsRef<Path>, key: EncryptionKey) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        Self::prepare_dir(&storage_dir).await?;
        Self::open(storage_dir, key).await
    }

    /// Get default storage directory for the current platform
    pub fn default_storage_dir() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("", "", "entra-auth").ok_or_else(
            || CacheError::InvalidLocation("Could not determine config directory".to_string()),
        )?;

        Ok(project_dirs.config_dir().join("cache"))
    }

    async fn prepare_dir(storage_dir: &Path) -> Result<()> {
        fs::create_dir_all(storage_dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(storage_dir, perms)?;
        }

        Ok(())
    }

    async fn open(storage_dir: PathBuf, key: EncryptionKey) -> Result<Self> {
        let cache_file = storage_dir.join("cache.json");
        let lock_file = storage_dir.join("lock");

        let entries = if cache_file.exists() {
            let content = fs::read_to_string(&cache_file).await?;
            let sealed: SealedBlob =
                serde_json::from_str(&content).map_err(|_| CacheError::CorruptedStore)?;
            let plaintext = crypto::open(&key, &sealed, AAD_CONTEXT)?;
            serde_json::from_slice(&plaintext).map_err(|_| CacheError::CorruptedStore)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            cache_file,
            lock_file,
            key,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    /// Acquire an exclusive advisory lock for the duration of a write
    fn acquire_lock(&self) -> Result<std::fs::File> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_file)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| CacheError::LockTimeout)?;

        Ok(lock_file)
    }

    /// Seal and write the entry map to disk
    async fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        let plaintext = serde_json::to_vec(entries).map_err(CacheError::Serialization)?;
        let sealed = crypto::seal(&self.key, &plaintext, AAD_CONTEXT)?;
        let sealed_json =
            serde_json::to_string_pretty(&sealed).map_err(CacheError::Serialization)?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.cache_file.with_extension("tmp");
        fs::write(&temp_path, sealed_json).await?;

        let file = std::fs::File::open(&temp_path)?;
        file.sync_all()?;

        fs::rename(&temp_path, &self.cache_file).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.cache_file, perms)?;
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl CacheStorage for FileStorage {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _lock = self.acquire_lock()?;

        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _lock = self.acquire_lock()?;

        let mut entries = self.entries.write().await;
        entries.remove(key);
        self.persist(&entries).await
    }

    async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("cache_file", &self.cache_file)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::StaticSecretProvider;
    use tempfile::TempDir;

    async fn create_test_store(dir: &Path) -> FileStorage {
        let secret_provider = Arc::new(StaticSecretProvider::new("test-passphrase"));
        FileStorage::new(dir, secret_provider).await.unwrap()
    }

    #[tokio::test]
    async fn test_roundtrip_across_instances() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = create_test_store(temp_dir.path()).await;
            store.set("account-key", r#"{"some":"record"}"#).await.unwrap();
        }

        let reopened = create_test_store(temp_dir.path()).await;
        assert_eq!(
            reopened.get("account-key").await.as_deref(),
            Some(r#"{"some":"record"}"#)
        );
    }

    #[tokio::test]
    async fn test_wrong_passphrase_is_corrupted_store() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = create_test_store(temp_dir.path()).await;
            store.set("k", "v").await.unwrap();
        }

        let wrong = Arc::new(StaticSecretProvider::new("not-the-passphrase"));
        let result = FileStorage::new(temp_dir.path(), wrong).await;
        assert!(matches!(result, Err(CacheError::CorruptedStore)));
    }

    #[tokio::test]
    async fn test_missing_passphrase_fails_fast() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Arc::new(crate::secret::NoSecretProvider);

        let result = FileStorage::new(temp_dir.path(), provider).await;
        assert!(matches!(result, Err(CacheError::MissingSecret)));
    }

    #[tokio::test]
    async fn test_tampered_file_is_corrupted_store() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = create_test_store(temp_dir.path()).await;
            store.set("k", "v").await.unwrap();
        }

        let cache_file = temp_dir.path().join("cache.json");
        let content = std::fs::read_to_string(&cache_file).unwrap();
        let mut sealed: SealedBlob = serde_json::from_str(&content).unwrap();
        let mut ct = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&sealed.ciphertext)
            .unwrap();
        ct[0] ^= 0xFF;
        sealed.ciphertext = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(ct);
        std::fs::write(&cache_file, serde_json::to_string(&sealed).unwrap()).unwrap();

        let result = create_test_store_result(temp_dir.path()).await;
        assert!(matches!(result, Err(CacheError::CorruptedStore)));
    }

    async fn create_test_store_result(dir: &Path) -> Result<FileStorage> {
        let secret_provider = Arc::new(StaticSecretProvider::new("test-passphrase"));
        FileStorage::new(dir, secret_provider).await
    }

    #[tokio::test]
    async fn test_with_key_skips_passphrase() {
        let temp_dir = TempDir::new().unwrap();
        let key_bytes = [42u8; 32];

        {
            let store =
                FileStorage::with_key(temp_dir.path(), EncryptionKey::from_bytes(key_bytes))
                    .await
                    .unwrap();
            store.set("k", "v").await.unwrap();
        }

        let reopened =
            FileStorage::with_key(temp_dir.path(), EncryptionKey::from_bytes(key_bytes))
                .await
                .unwrap();
        assert_eq!(reopened.get("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_remove_persists() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = create_test_store(temp_dir.path()).await;
            store.set("k", "v").await.unwrap();
            store.remove("k").await.unwrap();
        }

        let reopened = create_test_store(temp_dir.path()).await;
        assert_eq!(reopened.get("k").await, None);
        assert!(reopened.keys().await.is_empty());
    }
}
