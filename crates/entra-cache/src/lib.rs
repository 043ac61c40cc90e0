//! Token cache subsystem for the entra-auth client library
//!
//! This crate owns the persisted side of silent token acquisition: the
//! account/credential entity schema, the deterministic cache-key codec, and
//! the cache manager that answers filtered lookups over a flat key-value
//! store.
//!
//! # Cache Keys
//!
//! Every record is stored under a lowercase, `-`-joined key derived from its
//! semantic fields:
//!
//! - accounts: `<homeAccountId>-<environment>`
//! - credentials: `<homeAccountId>-<environment>-<credentialType>-<clientOrFamilyId>-<realm>-<target>`
//! - app metadata: `<clientId>-<environment>`
//!
//! Keys are stable across releases; persisted caches written by one version
//! stay readable by the next. For refresh tokens the id component is the
//! `familyId` when present, so one family token serves every client in the
//! family.
//!
//! # Storage Backends
//!
//! Backends implement the [`CacheStorage`] trait (get/set/remove/keys over
//! opaque string values):
//!
//! ```
//! use std::sync::Arc;
//! use entra_cache::{AccountFilter, CacheManager, MemoryStorage};
//!
//! # async fn example() -> entra_cache::Result<()> {
//! let cache = CacheManager::new(Arc::new(MemoryStorage::new()));
//! let accounts = cache.get_accounts_filtered_by(&AccountFilter::default()).await;
//! assert!(accounts.is_empty());
//! # Ok(())
//! # }
//! # tokio_test::block_on(example());
//! ```
//!
//! For persistence, [`FileStorage`] seals the whole map into one
//! AES-256-GCM encrypted file, with the key either supplied by the caller or
//! derived from a passphrase:
//!
//! ```no_run
//! use std::sync::Arc;
//! use entra_cache::{FileStorage, StaticSecretProvider};
//!
//! # async fn example() -> entra_cache::Result<()> {
//! let dir = FileStorage::default_storage_dir()?;
//! let provider = Arc::new(StaticSecretProvider::new("passphrase"));
//! let storage = FileStorage::new(dir, provider).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Robustness
//!
//! A record that fails schema validation during a filtered scan is treated
//! as a miss and skipped; corruption of one entry never breaks iteration
//! over the rest. Backend write failures do propagate - silently dropping a
//! token write would just look like "always needs network" to the caller.

pub mod crypto;
pub mod entities;
pub mod error;
pub mod file_store;
pub mod keys;
pub mod manager;
pub mod scopes;
pub mod secret;
pub mod store;

// Re-export main types
pub use crypto::EncryptionKey;
pub use entities::{AccountEntity, AppMetadataEntity, CredentialEntity};
pub use error::{CacheError, Result};
pub use file_store::FileStorage;
pub use keys::{CacheAccountType, CredentialType};
pub use manager::{AccountFilter, CacheManager, CredentialFilter};
pub use scopes::ScopeSet;
pub use secret::{NoSecretProvider, SecretProvider, StaticSecretProvider};
pub use store::{CacheStorage, MemoryStorage};
