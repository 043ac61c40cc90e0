use std::sync::Arc;

use tracing::{debug, warn};

use crate::entities::{AccountEntity, AppMetadataEntity, CredentialEntity};
use crate::error::Result;
use crate::keys::{self, CredentialType};
use crate::scopes::ScopeSet;
use crate::store::CacheStorage;

/// Field-by-field match over stored accounts. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub home_account_id: Option<String>,
    pub environment: Option<String>,
    /// Matched against the account's `tenant_id`
    pub realm: Option<String>,
}

/// Field-by-field match over stored credentials. Unset fields match anything;
/// `target` performs scope-superset matching rather than equality.
#[derive(Debug, Clone, Default)]
pub struct CredentialFilter {
    pub home_account_id: Option<String>,
    pub environment: Option<String>,
    pub credential_type: Option<CredentialType>,
    pub client_id: Option<String>,
    pub family_id: Option<String>,
    pub realm: Option<String>,
    pub target: Option<ScopeSet>,
}

/// Typed cache operations over an arbitrary [`CacheStorage`] backend.
///
/// The manager owns all persisted entity state. Records that fail schema
/// validation during a scan are skipped, never surfaced as errors, so one
/// corrupt entry cannot break iteration over the rest. Writes are upserts:
/// same key, last write wins.
#[derive(Clone)]
pub struct CacheManager {
    storage: Arc<dyn CacheStorage>,
}

impl CacheManager {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub async fn set_account(&self, account: &AccountEntity) -> Result<()> {
        let value = serde_json::to_string(account)?;
        self.storage.set(&account.cache_key(), &value).await
    }

    pub async fn get_account(
        &self,
        home_account_id: &str,
        environment: &str,
    ) -> Option<AccountEntity> {
        let key = keys::account_key(home_account_id, environment);
        let raw = self.storage.get(&key).await?;
        parse_record(&key, &raw)
    }

    pub async fn remove_account(&self, home_account_id: &str, environment: &str) -> Result<()> {
        self.storage
            .remove(&keys::account_key(home_account_id, environment))
            .await
    }

    pub async fn set_credential(&self, credential: &CredentialEntity) -> Result<()> {
        let value = serde_json::to_string(credential)?;
        self.storage.set(&credential.cache_key(), &value).await
    }

    pub async fn get_credential(&self, key: &str) -> Option<CredentialEntity> {
        let raw = self.storage.get(key).await?;
        parse_record(key, &raw)
    }

    pub async fn remove_credential(&self, key: &str) -> Result<()> {
        self.storage.remove(key).await
    }

    pub async fn set_app_metadata(&self, metadata: &AppMetadataEntity) -> Result<()> {
        let value = serde_json::to_string(metadata)?;
        self.storage.set(&metadata.cache_key(), &value).await
    }

    pub async fn get_app_metadata(
        &self,
        client_id: &str,
        environment: &str,
    ) -> Option<AppMetadataEntity> {
        let key = keys::app_metadata_key(client_id, environment);
        let raw = self.storage.get(&key).await?;
        parse_record(&key, &raw)
    }

    /// Linear scan over all stored accounts.
    pub async fn get_accounts_filtered_by(&self, filter: &AccountFilter) -> Vec<AccountEntity> {
        let mut matches = Vec::new();
        for key in self.storage.keys().await {
            // Account keys carry no credential type marker
            if keys::credential_type_of_key(&key).is_some() {
                continue;
            }
            let Some(raw) = self.storage.get(&key).await else {
                continue;
            };
            let Some(account) = parse_record::<AccountEntity>(&key, &raw) else {
                continue;
            };
            if account_matches(&account, filter) {
                matches.push(account);
            }
        }
        matches
    }

    /// Linear scan over all stored credentials.
    pub async fn get_credentials_filtered_by(
        &self,
        filter: &CredentialFilter,
    ) -> Vec<CredentialEntity> {
        let mut matches = Vec::new();
        for key in self.storage.keys().await {
            if keys::credential_type_of_key(&key).is_none() {
                continue;
            }
            let Some(raw) = self.storage.get(&key).await else {
                continue;
            };
            let Some(credential) = parse_record::<CredentialEntity>(&key, &raw) else {
                continue;
            };
            if credential_matches(&credential, filter) {
                matches.push(credential);
            }
        }
        matches
    }

    /// Silent-flow read: the access token for this client/account whose
    /// target covers every requested scope.
    ///
    /// When several records qualify the newest `cached_at` wins; ties fall to
    /// the fewest-scopes record, then key order, so the pick is deterministic.
    pub async fn find_access_token(
        &self,
        home_account_id: &str,
        environment: &str,
        client_id: &str,
        realm: &str,
        scopes: &ScopeSet,
    ) -> Option<CredentialEntity> {
        let filter = CredentialFilter {
            home_account_id: Some(home_account_id.to_string()),
            environment: Some(environment.to_string()),
            credential_type: Some(CredentialType::AccessToken),
            client_id: Some(client_id.to_string()),
            realm: Some(realm.to_string()),
            target: Some(scopes.clone()),
            ..Default::default()
        };

        let mut matches = self.get_credentials_filtered_by(&filter).await;
        matches.sort_by(|a, b| {
            b.cached_at
                .cmp(&a.cached_at)
                .then_with(|| a.target_scopes().len().cmp(&b.target_scopes().len()))
                .then_with(|| a.cache_key().cmp(&b.cache_key()))
        });
        matches.into_iter().next()
    }

    /// Silent-flow read: the refresh token to redeem for this client.
    ///
    /// The family token is preferred when the client is known to participate
    /// in a token family; the client's own token is the fallback.
    pub async fn find_refresh_token(
        &self,
        home_account_id: &str,
        environment: &str,
        client_id: &str,
        family_id: Option<&str>,
    ) -> Option<CredentialEntity> {
        if let Some(family) = family_id {
            let filter = CredentialFilter {
                home_account_id: Some(home_account_id.to_string()),
                environment: Some(environment.to_string()),
                credential_type: Some(CredentialType::RefreshToken),
                family_id: Some(family.to_string()),
                ..Default::default()
            };
            if let Some(token) = self
                .get_credentials_filtered_by(&filter)
                .await
                .into_iter()
                .next()
            {
                debug!("Resolved family refresh token");
                return Some(token);
            }
        }

        let filter = CredentialFilter {
            home_account_id: Some(home_account_id.to_string()),
            environment: Some(environment.to_string()),
            credential_type: Some(CredentialType::RefreshToken),
            client_id: Some(client_id.to_string()),
            ..Default::default()
        };
        self.get_credentials_filtered_by(&filter)
            .await
            .into_iter()
            .next()
    }

    /// Remove an account record together with every credential it owns.
    /// Used on logout.
    pub async fn purge_account(&self, home_account_id: &str, environment: &str) -> Result<()> {
        self.remove_account(home_account_id, environment).await?;

        let filter = CredentialFilter {
            home_account_id: Some(home_account_id.to_string()),
            environment: Some(environment.to_string()),
            ..Default::default()
        };
        for credential in self.get_credentials_filtered_by(&filter).await {
            self.remove_credential(&credential.cache_key()).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager").finish_non_exhaustive()
    }
}

/// Deserialize a stored record, treating malformed values as a miss.
fn parse_record<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(record) => Some(record),
        Err(_) => {
            warn!("Skipping unparsable cache record under key {}", key);
            None
        }
    }
}

fn eq_ci(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn opt_matches(filter: &Option<String>, value: &str) -> bool {
    filter.as_deref().is_none_or(|wanted| eq_ci(wanted, value))
}

fn account_matches(account: &AccountEntity, filter: &AccountFilter) -> bool {
    opt_matches(&filter.home_account_id, &account.home_account_id)
        && opt_matches(&filter.environment, &account.environment)
        && opt_matches(&filter.realm, &account.tenant_id)
}

fn credential_matches(credential: &CredentialEntity, filter: &CredentialFilter) -> bool {
    if let Some(wanted) = filter.credential_type
        && wanted != credential.credential_type
    {
        return false;
    }
    if !opt_matches(&filter.home_account_id, &credential.home_account_id)
        || !opt_matches(&filter.environment, &credential.environment)
        || !opt_matches(&filter.client_id, &credential.client_id)
    {
        return false;
    }
    if let Some(wanted) = &filter.family_id
        && !credential
            .family_id
            .as_deref()
            .is_some_and(|family| eq_ci(family, wanted))
    {
        return false;
    }
    if let Some(wanted) = &filter.realm
        && !credential
            .realm
            .as_deref()
            .is_some_and(|realm| eq_ci(realm, wanted))
    {
        return false;
    }
    if let Some(requested) = &filter.target
        && !credential.target_scopes().is_superset_of(requested)
    {
        return false;
    }
    true
}
