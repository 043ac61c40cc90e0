use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng},
};
use argon2::{Argon2, Params};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::error::{CacheError, Result};

/// Salt length for passphrase key derivation
pub const SALT_LEN: usize = 32;

const AAD_PREFIX: &str = "entra-cache";

/// AES-256 key (32 bytes)
#[derive(Clone, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl EncryptionKey {
    /// Generate a new random encryption key
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Create from raw bytes (key custody stays with the caller)
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { key: bytes }
    }

    /// Derive a key from a passphrase with Argon2id (m=64MB, t=3, p=1).
    ///
    /// The same passphrase and salt always derive the same key, so a store
    /// sealed on one run can be opened on the next.
    pub fn derive_from_passphrase(passphrase: &str, salt: &[u8]) -> Result<Self> {
        let params = Params::new(65536, 3, 1, Some(32))
            .map_err(|e| CacheError::Crypto(format!("Invalid Argon2 params: {}", e)))?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut key = [0u8; 32];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| CacheError::Crypto(format!("Key derivation failed: {}", e)))?;

        Ok(Self { key })
    }

    /// Get key bytes (use carefully - sensitive data)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Generate a random salt for passphrase derivation
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Encrypted payload with nonce and authentication tag
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SealedBlob {
    /// Base64url-encoded nonce (12 bytes)
    pub nonce: String,
    /// Base64url-encoded ciphertext + tag
    pub ciphertext: String,
    /// Additional authenticated data version
    pub aad_version: String,
}

/// Encrypt plaintext using AES-256-GCM.
///
/// `context` is bound into the AAD, so a blob sealed for one store cannot be
/// replayed into another.
pub fn seal(key: &EncryptionKey, plaintext: &[u8], context: &str) -> Result<SealedBlob> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad_version = "v1".to_string();
    let aad = format!("{}|{}|{}", AAD_PREFIX, aad_version, context);

    let ciphertext = cipher
        .encrypt(
            nonce,
            aes_gcm::aead::Payload {
                msg: plaintext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|e| CacheError::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(SealedBlob {
        nonce: URL_SAFE_NO_PAD.encode(nonce_bytes),
        ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
        aad_version,
    })
}

/// Decrypt a sealed blob using AES-256-GCM
pub fn open(key: &EncryptionKey, blob: &SealedBlob, context: &str) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let nonce_bytes = URL_SAFE_NO_PAD
        .decode(&blob.nonce)
        .map_err(|_| CacheError::CorruptedStore)?;

    if nonce_bytes.len() != 12 {
        return Err(CacheError::CorruptedStore);
    }

    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = URL_SAFE_NO_PAD
        .decode(&blob.ciphertext)
        .map_err(|_| CacheError::CorruptedStore)?;

    let aad = format!("{}|{}|{}", AAD_PREFIX, blob.aad_version, context);

    cipher
        .decrypt(
            nonce,
            aes_gcm::aead::Payload {
                msg: &ciphertext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| CacheError::CorruptedStore)
}
