use zeroize::Zeroizing;

/// Trait for providing the passphrase that seals a persistent cache store.
///
/// Implemented by the embedding application, typically as a prompt.
#[async_trait::async_trait]
pub trait SecretProvider: Send + Sync {
    /// Get a passphrase for key derivation.
    ///
    /// Returns None if the user cancels or no passphrase is available.
    /// The returned string is zeroized when dropped.
    async fn get_passphrase(&self, prompt: &str) -> Option<Zeroizing<String>>;
}

/// Secret provider that never yields a passphrase.
///
/// Use this when the application supplies raw key bytes itself (for example
/// from an OS keyring) and a passphrase fallback would be wrong.
#[derive(Debug, Clone, Default)]
pub struct NoSecretProvider;

#[async_trait::async_trait]
impl SecretProvider for NoSecretProvider {
    async fn get_passphrase(&self, _prompt: &str) -> Option<Zeroizing<String>> {
        None
    }
}

/// Static secret provider for testing
#[derive(Debug, Clone)]
pub struct StaticSecretProvider {
    secret: String,
}

impl StaticSecretProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait::async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get_passphrase(&self, _prompt: &str) -> Option<Zeroizing<String>> {
        Some(Zeroizing::new(self.secret.clone()))
    }
}
