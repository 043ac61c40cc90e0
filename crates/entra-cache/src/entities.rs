use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::keys::{self, CacheAccountType, CredentialType};
use crate::scopes::ScopeSet;

/// A single cached token record.
///
/// Serialized with camelCase field names; the JSON shape is the persisted
/// schema shared with other cache readers and must stay stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEntity {
    pub home_account_id: String,
    pub environment: String,
    pub credential_type: CredentialType,
    pub client_id: String,
    /// The raw token value. Opaque to the cache, never logged.
    pub secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Unix seconds when the token stops being usable. Access tokens only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<i64>,
    /// Unix seconds at write time; the newest record wins silent lookups.
    #[serde(default)]
    pub cached_at: i64,
}

impl CredentialEntity {
    pub fn access_token(
        home_account_id: String,
        environment: String,
        client_id: String,
        realm: String,
        target: &ScopeSet,
        secret: String,
        expires_on: i64,
    ) -> Self {
        Self {
            home_account_id,
            environment,
            credential_type: CredentialType::AccessToken,
            client_id,
            secret,
            family_id: None,
            realm: Some(realm),
            target: Some(target.as_target()),
            expires_on: Some(expires_on),
            cached_at: Utc::now().timestamp(),
        }
    }

    pub fn id_token(
        home_account_id: String,
        environment: String,
        client_id: String,
        realm: String,
        secret: String,
    ) -> Self {
        Self {
            home_account_id,
            environment,
            credential_type: CredentialType::IdToken,
            client_id,
            secret,
            family_id: None,
            realm: Some(realm),
            target: None,
            expires_on: None,
            cached_at: Utc::now().timestamp(),
        }
    }

    pub fn refresh_token(
        home_account_id: String,
        environment: String,
        client_id: String,
        family_id: Option<String>,
        secret: String,
    ) -> Self {
        Self {
            home_account_id,
            environment,
            credential_type: CredentialType::RefreshToken,
            client_id,
            secret,
            family_id,
            realm: None,
            target: None,
            expires_on: None,
            cached_at: Utc::now().timestamp(),
        }
    }

    /// The key this record is stored under. Identical keys identify the same
    /// logical credential; writing replaces.
    pub fn cache_key(&self) -> String {
        keys::credential_key(
            &self.home_account_id,
            &self.environment,
            self.credential_type,
            &self.client_id,
            self.family_id.as_deref(),
            self.realm.as_deref(),
            self.target.as_deref(),
        )
    }

    /// The stored target as a scope set; empty for ID and refresh tokens.
    pub fn target_scopes(&self) -> ScopeSet {
        ScopeSet::parse(self.target.as_deref().unwrap_or_default())
    }
}

/// A cached account record, one per user and environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountEntity {
    pub home_account_id: String,
    pub environment: String,
    /// Tenant the account claims belong to (ID token `tid`).
    pub tenant_id: String,
    /// ID token `preferred_username`.
    pub username: String,
    pub local_account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub authority_type: CacheAccountType,
}

impl AccountEntity {
    pub fn new(
        home_account_id: String,
        environment: String,
        tenant_id: String,
        username: String,
        local_account_id: String,
        name: Option<String>,
        authority_type: CacheAccountType,
    ) -> Self {
        Self {
            home_account_id,
            environment,
            tenant_id,
            username,
            local_account_id,
            name,
            authority_type,
        }
    }

    /// Stable across token refreshes for the same user and environment, so
    /// re-authentication overwrites instead of duplicating.
    pub fn cache_key(&self) -> String {
        keys::account_key(&self.home_account_id, &self.environment)
    }
}

/// Per-application metadata, currently the refresh-token family mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppMetadataEntity {
    pub client_id: String,
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
}

impl AppMetadataEntity {
    pub fn new(client_id: String, environment: String, family_id: Option<String>) -> Self {
        Self {
            client_id,
            environment,
            family_id,
        }
    }

    pub fn cache_key(&self) -> String {
        keys::app_metadata_key(&self.client_id, &self.environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_key_binding() {
        let target = ScopeSet::parse("User.Read openid");
        let entity = CredentialEntity::access_token(
            "uid.utid".into(),
            "login.microsoftonline.com".into(),
            "client-a".into(),
            "utid".into(),
            &target,
            "at-secret".into(),
            1_700_000_000,
        );
        assert_eq!(
            entity.cache_key(),
            "uid.utid-login.microsoftonline.com-accesstoken-client-a-utid-openid user.read"
        );
        assert_eq!(entity.target_scopes(), target);
    }

    #[test]
    fn test_refresh_token_key_uses_family_when_present() {
        let family = CredentialEntity::refresh_token(
            "uid.utid".into(),
            "env".into(),
            "A".into(),
            Some("F".into()),
            "rt".into(),
        );
        let own = CredentialEntity::refresh_token(
            "uid.utid".into(),
            "env".into(),
            "A".into(),
            None,
            "rt".into(),
        );
        assert_eq!(family.cache_key(), "uid.utid-env-refreshtoken-f--");
        assert_eq!(own.cache_key(), "uid.utid-env-refreshtoken-a--");
    }

    #[test]
    fn test_account_key_matches_documented_example() {
        let account = AccountEntity::new(
            "uid.utid".into(),
            "login.microsoftonline.com".into(),
            "utid".into(),
            "a@b.com".into(),
            "uid".into(),
            None,
            CacheAccountType::Mssts,
        );
        assert_eq!(account.cache_key(), "uid.utid-login.microsoftonline.com");
    }

    #[test]
    fn test_persisted_field_names_are_camel_case() {
        let account = AccountEntity::new(
            "uid.utid".into(),
            "env".into(),
            "utid".into(),
            "a@b.com".into(),
            "uid".into(),
            Some("A B".into()),
            CacheAccountType::Mssts,
        );
        let json = serde_json::to_value(&account).unwrap();
        assert!(json.get("homeAccountId").is_some());
        assert!(json.get("tenantId").is_some());
        assert_eq!(json["authorityType"], "MSSTS");

        let rt = CredentialEntity::refresh_token(
            "uid.utid".into(),
            "env".into(),
            "A".into(),
            Some("F".into()),
            "rt".into(),
        );
        let json = serde_json::to_value(&rt).unwrap();
        assert_eq!(json["credentialType"], "RefreshToken");
        assert_eq!(json["familyId"], "F");
        assert!(json.get("realm").is_none());
    }
}
