use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use entra_cache::{
    AccountEntity, AppMetadataEntity, CacheAccountType, CacheManager, CredentialEntity, ScopeSet,
};

use crate::authority::Authority;
use crate::error::{AuthError, Result};
use crate::id_token::{ClientInfo, IdTokenClaims};
use crate::models::ServerTokenResponse;

/// What the pipeline needs to know about the request that produced a response
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub client_id: String,
    pub authority: Authority,
    pub scopes: ScopeSet,
    pub correlation_id: String,
}

/// Account fields exposed to callers, detached from cache state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub home_account_id: String,
    pub environment: String,
    pub tenant_id: String,
    pub username: String,
}

impl From<&AccountEntity> for AccountInfo {
    fn from(entity: &AccountEntity) -> Self {
        Self {
            home_account_id: entity.home_account_id.clone(),
            environment: entity.environment.clone(),
            tenant_id: entity.tenant_id.clone(),
            username: entity.username.clone(),
        }
    }
}

/// Normalized outcome of a successful token request.
///
/// An independent copy of the entities written to the cache; holding on to
/// one does not observe later cache mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResult {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub account: AccountInfo,
    pub scopes: ScopeSet,
    pub expires_on: Option<DateTime<Utc>>,
    pub correlation_id: String,
}

/// Pipeline from a raw token response to cache writes and a normalized result.
///
/// Validation (steps 1-3) completes before the first write, so a response
/// that fails leaves the cache exactly as it was.
pub struct ResponseHandler<'a> {
    cache: &'a CacheManager,
}

impl<'a> ResponseHandler<'a> {
    pub fn new(cache: &'a CacheManager) -> Self {
        Self { cache }
    }

    pub async fn handle(
        &self,
        response: ServerTokenResponse,
        ctx: &RequestContext,
    ) -> Result<AuthenticationResult> {
        // Step 1: Validate
        if let Some(error) = response.error {
            return Err(AuthError::Server {
                error,
                error_description: response.error_description,
                sub_error: response.suberror,
            });
        }
        if response.access_token.is_none() && response.id_token.is_none() {
            return Err(AuthError::InvalidResponse(
                "response carries neither access_token nor id_token".to_string(),
            ));
        }

        // Step 2: Decode the ID token
        let claims = match &response.id_token {
            Some(raw) => Some(IdTokenClaims::decode(raw)?),
            None => None,
        };

        // Step 3: Resolve the home account id
        let client_info = match &response.client_info {
            Some(raw) => Some(ClientInfo::decode(raw)?),
            None => None,
        };
        let home_account_id = client_info
            .as_ref()
            .map(ClientInfo::home_account_id)
            .or_else(|| {
                claims
                    .as_ref()
                    .and_then(IdTokenClaims::local_account_id)
                    .map(str::to_string)
            })
            .ok_or(AuthError::NoAccountIdentity)?;

        let environment = ctx.authority.environment().to_string();
        let realm = claims
            .as_ref()
            .and_then(|claims| claims.tid.clone())
            .unwrap_or_else(|| ctx.authority.tenant().to_string());

        // Step 4: Construct and write entities
        let account = match &claims {
            Some(claims) => {
                let account = AccountEntity::new(
                    home_account_id.clone(),
                    environment.clone(),
                    realm.clone(),
                    claims.preferred_username.clone().unwrap_or_default(),
                    claims
                        .local_account_id()
                        .unwrap_or(home_account_id.as_str())
                        .to_string(),
                    claims.name.clone(),
                    CacheAccountType::Mssts,
                );
                self.cache.set_account(&account).await?;
                Some(account)
            }
            None => None,
        };

        let target = match &response.scope {
            Some(granted) => ScopeSet::parse(granted),
            None => ctx.scopes.clone(),
        };
        let expires_on = response
            .expires_in
            .map(|seconds| Utc::now() + chrono::Duration::seconds(seconds as i64));

        if let Some(token) = &response.access_token {
            let entity = CredentialEntity::access_token(
                home_account_id.clone(),
                environment.clone(),
                ctx.client_id.clone(),
                realm.clone(),
                &target,
                token.clone(),
                expires_on.map(|at| at.timestamp()).unwrap_or_default(),
            );
            self.cache.set_credential(&entity).await?;
        }

        if let Some(token) = &response.id_token {
            let entity = CredentialEntity::id_token(
                home_account_id.clone(),
                environment.clone(),
                ctx.client_id.clone(),
                realm.clone(),
                token.clone(),
            );
            self.cache.set_credential(&entity).await?;
        }

        if let Some(token) = &response.refresh_token {
            let family_id = match &response.foci {
                Some(family) => {
                    // The server told us this client is family-eligible;
                    // remember that for future silent lookups
                    let metadata = AppMetadataEntity::new(
                        ctx.client_id.clone(),
                        environment.clone(),
                        Some(family.clone()),
                    );
                    self.cache.set_app_metadata(&metadata).await?;
                    Some(family.clone())
                }
                None => self
                    .cache
                    .get_app_metadata(&ctx.client_id, &environment)
                    .await
                    .and_then(|metadata| metadata.family_id),
            };

            let entity = CredentialEntity::refresh_token(
                home_account_id.clone(),
                environment.clone(),
                ctx.client_id.clone(),
                family_id,
                token.clone(),
            );
            self.cache.set_credential(&entity).await?;
        }

        debug!("Token response cached for account {}", home_account_id);

        // Step 5: Produce the result
        let account_info = match &account {
            Some(entity) => AccountInfo::from(entity),
            None => AccountInfo {
                home_account_id,
                environment,
                tenant_id: realm,
                username: String::new(),
            },
        };

        Ok(AuthenticationResult {
            access_token: response.access_token,
            id_token: response.id_token,
            account: account_info,
            scopes: target,
            expires_on,
            correlation_id: ctx.correlation_id.clone(),
        })
    }
}

/// Rebuild an [`AuthenticationResult`] from cached entities on a silent hit
pub(crate) fn result_from_cache(
    access_token: &CredentialEntity,
    id_token: Option<&CredentialEntity>,
    account: Option<&AccountEntity>,
    correlation_id: String,
) -> AuthenticationResult {
    let account_info = match account {
        Some(entity) => AccountInfo::from(entity),
        None => AccountInfo {
            home_account_id: access_token.home_account_id.clone(),
            environment: access_token.environment.clone(),
            tenant_id: access_token.realm.clone().unwrap_or_default(),
            username: String::new(),
        },
    };

    AuthenticationResult {
        access_token: Some(access_token.secret.clone()),
        id_token: id_token.map(|entity| entity.secret.clone()),
        account: account_info,
        scopes: access_token.target_scopes(),
        expires_on: access_token
            .expires_on
            .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single()),
        correlation_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use url::Url;

    use entra_cache::{AccountFilter, CredentialFilter, CredentialType, MemoryStorage};
    use serde_json::json;

    use crate::id_token::test_support::{fake_client_info, fake_jwt};

    fn context(cache_scopes: &str) -> RequestContext {
        let authority =
            Authority::parse(&Url::parse("https://login.microsoftonline.com/utid").unwrap())
                .unwrap();
        RequestContext {
            client_id: "client-a".to_string(),
            authority,
            scopes: ScopeSet::parse(cache_scopes),
            correlation_id: "corr-1".to_string(),
        }
    }

    fn full_response() -> ServerTokenResponse {
        ServerTokenResponse {
            token_type: Some("Bearer".into()),
            scope: Some("User.Read openid".into()),
            expires_in: Some(3600),
            access_token: Some("at-secret".into()),
            refresh_token: Some("rt-secret".into()),
            id_token: Some(fake_jwt(&json!({
                "tid": "utid",
                "oid": "uid",
                "preferred_username": "a@b.com",
                "name": "A B"
            }))),
            client_info: Some(fake_client_info("uid", "utid")),
            ..Default::default()
        }
    }

    fn cache() -> CacheManager {
        CacheManager::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_server_error_passes_through() {
        let cache = cache();
        let handler = ResponseHandler::new(&cache);
        let response = ServerTokenResponse {
            error: Some("invalid_grant".into()),
            error_description: Some("AADSTS70000: expired".into()),
            ..Default::default()
        };

        let result = handler.handle(response, &context("user.read")).await;
        match result {
            Err(AuthError::Server { error, .. }) => assert_eq!(error, "invalid_grant"),
            other => panic!("Expected Server error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_missing_both_tokens_is_invalid() {
        let cache = cache();
        let handler = ResponseHandler::new(&cache);
        let response = ServerTokenResponse {
            token_type: Some("Bearer".into()),
            ..Default::default()
        };

        let result = handler.handle(response, &context("user.read")).await;
        assert!(matches!(result, Err(AuthError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_full_response_writes_all_entities() {
        let cache = cache();
        let handler = ResponseHandler::new(&cache);

        let result = handler
            .handle(full_response(), &context("user.read"))
            .await
            .unwrap();

        assert_eq!(result.account.home_account_id, "uid.utid");
        assert_eq!(result.account.username, "a@b.com");
        assert_eq!(result.access_token.as_deref(), Some("at-secret"));
        assert_eq!(result.scopes, ScopeSet::parse("openid user.read"));

        let accounts = cache.get_accounts_filtered_by(&AccountFilter::default()).await;
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].tenant_id, "utid");

        let credentials = cache
            .get_credentials_filtered_by(&CredentialFilter::default())
            .await;
        assert_eq!(credentials.len(), 3);

        let access = cache
            .find_access_token(
                "uid.utid",
                "login.microsoftonline.com",
                "client-a",
                "utid",
                &ScopeSet::parse("user.read"),
            )
            .await
            .unwrap();
        assert_eq!(access.secret, "at-secret");
        assert!(access.expires_on.unwrap() > Utc::now().timestamp());
    }

    #[tokio::test]
    async fn test_client_info_takes_precedence_over_claims() {
        let cache = cache();
        let handler = ResponseHandler::new(&cache);

        let mut response = full_response();
        response.client_info = Some(fake_client_info("other-uid", "other-utid"));

        let result = handler
            .handle(response, &context("user.read"))
            .await
            .unwrap();
        assert_eq!(result.account.home_account_id, "other-uid.other-utid");
    }

    #[tokio::test]
    async fn test_identity_from_claims_when_client_info_absent() {
        let cache = cache();
        let handler = ResponseHandler::new(&cache);

        let mut response = full_response();
        response.client_info = None;

        let result = handler
            .handle(response, &context("user.read"))
            .await
            .unwrap();
        assert_eq!(result.account.home_account_id, "uid");
    }

    #[tokio::test]
    async fn test_no_identity_at_all_is_rejected() {
        let cache = cache();
        let handler = ResponseHandler::new(&cache);

        let response = ServerTokenResponse {
            access_token: Some("at".into()),
            expires_in: Some(3600),
            ..Default::default()
        };

        let result = handler.handle(response, &context("user.read")).await;
        assert!(matches!(result, Err(AuthError::NoAccountIdentity)));
    }

    #[tokio::test]
    async fn test_malformed_id_token_leaves_cache_untouched() {
        let cache = cache();
        let handler = ResponseHandler::new(&cache);

        let mut response = full_response();
        response.id_token = Some("garbage".into());

        let result = handler.handle(response, &context("user.read")).await;
        assert!(matches!(result, Err(AuthError::InvalidIdToken(_))));

        assert!(cache
            .get_credentials_filtered_by(&CredentialFilter::default())
            .await
            .is_empty());
        assert!(cache
            .get_accounts_filtered_by(&AccountFilter::default())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_foci_populates_app_metadata_and_family_id() {
        let cache = cache();
        let handler = ResponseHandler::new(&cache);

        let mut response = full_response();
        response.foci = Some("1".into());

        handler
            .handle(response, &context("user.read"))
            .await
            .unwrap();

        let metadata = cache
            .get_app_metadata("client-a", "login.microsoftonline.com")
            .await
            .unwrap();
        assert_eq!(metadata.family_id.as_deref(), Some("1"));

        let refresh = cache
            .get_credentials_filtered_by(&CredentialFilter {
                credential_type: Some(CredentialType::RefreshToken),
                ..Default::default()
            })
            .await;
        assert_eq!(refresh.len(), 1);
        assert_eq!(refresh[0].family_id.as_deref(), Some("1"));
        assert!(refresh[0].cache_key().contains("-refreshtoken-1-"));
    }

    #[tokio::test]
    async fn test_stored_app_metadata_supplies_family_id() {
        let cache = cache();
        cache
            .set_app_metadata(&entra_cache::AppMetadataEntity::new(
                "client-a".into(),
                "login.microsoftonline.com".into(),
                Some("1".into()),
            ))
            .await
            .unwrap();

        let handler = ResponseHandler::new(&cache);
        handler
            .handle(full_response(), &context("user.read"))
            .await
            .unwrap();

        let refresh = cache
            .get_credentials_filtered_by(&CredentialFilter {
                credential_type: Some(CredentialType::RefreshToken),
                ..Default::default()
            })
            .await;
        assert_eq!(refresh[0].family_id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_requested_scopes_used_when_response_has_none() {
        let cache = cache();
        let handler = ResponseHandler::new(&cache);

        let mut response = full_response();
        response.scope = None;

        let result = handler
            .handle(response, &context("User.Read"))
            .await
            .unwrap();
        assert_eq!(result.scopes, ScopeSet::parse("user.read"));
    }
}
