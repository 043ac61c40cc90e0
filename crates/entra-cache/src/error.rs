use thiserror::Error;

/// Token cache error types
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Storage backend I/O error: {0}")]
    Backend(#[from] std::io::Error),

    #[error("Failed to serialize cache record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache store is corrupted or was sealed with a different key")]
    CorruptedStore,

    #[error("Could not acquire the cache store lock")]
    LockTimeout,

    #[error("In-memory store lock poisoned")]
    Poisoned,

    #[error("Crypto failure: {0}")]
    Crypto(String),

    #[error("No passphrase available for key derivation")]
    MissingSecret,

    #[error("Invalid storage location: {0}")]
    InvalidLocation(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
