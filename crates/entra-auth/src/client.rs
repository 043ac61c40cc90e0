use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use entra_cache::{CacheManager, CacheStorage, CredentialFilter, CredentialType, ScopeSet};

use crate::authority::{Authority, AuthorityRegistry};
use crate::config::{ClientConfig, DEFAULT_OIDC_SCOPES};
use crate::error::{AuthError, Result};
use crate::models::{DeviceCodeResponse, ServerTokenResponse};
use crate::pkce::PkcePair;
use crate::response::{AccountInfo, AuthenticationResult, RequestContext, ResponseHandler};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// A silent (cache-first) token request
#[derive(Debug, Clone)]
pub struct SilentRequest {
    pub account: AccountInfo,
    pub scopes: ScopeSet,
    /// Skip the cached access token and go straight to the refresh token
    pub force_refresh: bool,
}

/// Main client for token acquisition.
///
/// Owns the HTTP client, the resolved authority, and the token cache.
/// Every acquire method funnels its response through the same pipeline, so
/// the cache is populated identically no matter which grant produced the
/// tokens.
pub struct AuthClient {
    config: ClientConfig,
    authority: Authority,
    cache: CacheManager,
    http: Client,
}

impl AuthClient {
    /// Create a client trusting the well-known Microsoft authorities
    pub fn new(config: ClientConfig, storage: Arc<dyn CacheStorage>) -> Result<Self> {
        Self::with_registry(config, storage, &AuthorityRegistry::default())
    }

    /// Create a client with an explicit authority registry
    pub fn with_registry(
        config: ClientConfig,
        storage: Arc<dyn CacheStorage>,
        registry: &AuthorityRegistry,
    ) -> Result<Self> {
        let authority = registry.resolve(&config.authority)?;

        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("entra-auth"))
            .build()?;

        Ok(Self {
            config,
            authority,
            cache: CacheManager::new(storage),
            http,
        })
    }

    /// The token cache backing this client
    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    fn request_context(&self, scopes: &ScopeSet) -> RequestContext {
        RequestContext {
            client_id: self.config.client_id.clone(),
            authority: self.authority.clone(),
            scopes: scopes.clone(),
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    /// Requested scopes plus the OIDC defaults, as the wire scope string
    fn wire_scope(&self, scopes: &ScopeSet) -> String {
        scopes
            .union(&ScopeSet::from_parts(DEFAULT_OIDC_SCOPES))
            .as_target()
    }

    /// POST a form to the token endpoint and run the response pipeline
    async fn redeem(
        &self,
        form: &[(&str, &str)],
        ctx: &RequestContext,
    ) -> Result<AuthenticationResult> {
        let response = self
            .http
            .post(self.authority.token_endpoint())
            .header("client-request-id", &ctx.correlation_id)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let parsed: ServerTokenResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            // OAuth failures come back as JSON error bodies; anything else
            // is a transport-level problem
            Err(_) if !status.is_success() => {
                return Err(AuthError::Http {
                    status,
                    body_snippet: body.chars().take(200).collect(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        ResponseHandler::new(&self.cache).handle(parsed, ctx).await
    }

    /// Build the authorization URL for the user to visit (auth-code + PKCE)
    #[instrument(skip(self, pkce))]
    pub fn auth_code_url(
        &self,
        scopes: &ScopeSet,
        state: Option<&str>,
        pkce: &PkcePair,
    ) -> Result<Url> {
        let mut url = self.authority.authorize_endpoint();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &self.wire_scope(scopes))
            .append_pair("code_challenge", pkce.challenge())
            .append_pair("code_challenge_method", PkcePair::METHOD)
            .append_pair("prompt", "select_account");

        if let Some(state) = state {
            url.query_pairs_mut().append_pair("state", state);
        }

        debug!("Built authorize URL: {}", url);
        Ok(url)
    }

    /// Parse the redirect URL and extract the authorization code
    #[instrument(skip(self))]
    pub fn parse_redirect(
        &self,
        redirect_url: &str,
        expected_state: Option<&str>,
    ) -> Result<String> {
        let url = Url::parse(redirect_url)?;
        let params: HashMap<_, _> = url.query_pairs().collect();

        if let Some(error) = params.get("error") {
            if error == "access_denied" {
                return Err(AuthError::UserCancelled);
            }
            return Err(AuthError::InvalidRedirect);
        }

        if let Some(expected) = expected_state {
            match params.get("state") {
                Some(actual) if actual == expected => {}
                _ => return Err(AuthError::StateMismatch),
            }
        }

        params
            .get("code")
            .map(|code| code.to_string())
            .ok_or(AuthError::InvalidRedirect)
    }

    /// Redeem an authorization code obtained via [`AuthClient::auth_code_url`]
    #[instrument(skip(self, code, pkce))]
    pub async fn acquire_token_by_code(
        &self,
        code: &str,
        pkce: &PkcePair,
        scopes: &ScopeSet,
    ) -> Result<AuthenticationResult> {
        let ctx = self.request_context(scopes);
        let scope = self.wire_scope(scopes);

        debug!("Exchanging authorization code for tokens");
        self.redeem(
            &[
                ("client_id", self.config.client_id.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("code_verifier", pkce.verifier()),
            ],
            &ctx,
        )
        .await
    }

    /// Redeem a refresh token
    #[instrument(skip(self, refresh_token))]
    pub async fn acquire_token_by_refresh_token(
        &self,
        refresh_token: &str,
        scopes: &ScopeSet,
    ) -> Result<AuthenticationResult> {
        let ctx = self.request_context(scopes);
        let scope = self.wire_scope(scopes);

        debug!("Redeeming refresh token");
        self.redeem(
            &[
                ("client_id", self.config.client_id.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("scope", scope.as_str()),
            ],
            &ctx,
        )
        .await
    }

    /// Start the device-code flow; show `user_code`/`verification_uri` to the
    /// user, then poll with [`AuthClient::acquire_token_by_device_code`]
    #[instrument(skip(self))]
    pub async fn begin_device_code(&self, scopes: &ScopeSet) -> Result<DeviceCodeResponse> {
        let scope = self.wire_scope(scopes);

        debug!("Requesting device code");
        let response = self
            .http
            .post(self.authority.device_code_endpoint())
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Http {
                status,
                body_snippet: body.chars().take(200).collect(),
            });
        }

        Ok(response.json().await?)
    }

    /// Poll the token endpoint until the user completes device sign-in
    #[instrument(skip(self, device))]
    pub async fn acquire_token_by_device_code(
        &self,
        device: &DeviceCodeResponse,
        scopes: &ScopeSet,
    ) -> Result<AuthenticationResult> {
        let ctx = self.request_context(scopes);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(device.expires_in);
        let mut interval = Duration::from_secs(device.interval.max(1));

        loop {
            tokio::time::sleep(interval).await;
            if tokio::time::Instant::now() >= deadline {
                return Err(AuthError::DeviceCodeExpired);
            }

            let response = self
                .http
                .post(self.authority.token_endpoint())
                .header("client-request-id", &ctx.correlation_id)
                .form(&[
                    ("client_id", self.config.client_id.as_str()),
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("device_code", device.device_code.as_str()),
                ])
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let parsed: ServerTokenResponse = match serde_json::from_str(&body) {
                Ok(parsed) => parsed,
                Err(_) => {
                    return Err(AuthError::Http {
                        status,
                        body_snippet: body.chars().take(200).collect(),
                    });
                }
            };

            match parsed.error.as_deref() {
                Some("authorization_pending") => continue,
                Some("slow_down") => {
                    warn!("Server asked to slow down device-code polling");
                    interval += Duration::from_secs(5);
                    continue;
                }
                Some("authorization_declined") => return Err(AuthError::UserCancelled),
                Some("expired_token") => return Err(AuthError::DeviceCodeExpired),
                _ => return ResponseHandler::new(&self.cache).handle(parsed, &ctx).await,
            }
        }
    }

    /// Acquire a token without user interaction.
    ///
    /// A cached access token still outside the renewal window is returned
    /// with no network call. Otherwise the cached refresh token (family
    /// token first) is redeemed and the cache repopulated; an entry inside
    /// the window is evicted once replaced.
    #[instrument(skip(self, request))]
    pub async fn acquire_token_silent(
        &self,
        request: &SilentRequest,
    ) -> Result<AuthenticationResult> {
        let account = &request.account;

        if !request.force_refresh
            && let Some(entity) = self
                .cache
                .find_access_token(
                    &account.home_account_id,
                    &account.environment,
                    &self.config.client_id,
                    &account.tenant_id,
                    &request.scopes,
                )
                .await
        {
            if self.is_still_fresh(&entity) {
                debug!("Silent request served from cache");
                let id_token = self.cached_id_token(account).await;
                let stored_account = self
                    .cache
                    .get_account(&account.home_account_id, &account.environment)
                    .await;
                return Ok(crate::response::result_from_cache(
                    &entity,
                    id_token.as_ref(),
                    stored_account.as_ref(),
                    Uuid::new_v4().to_string(),
                ));
            }

            // Expired or inside the renewal window: a miss. Evict and fall
            // through to the refresh token.
            debug!("Cached access token is inside the renewal window");
            self.cache.remove_credential(&entity.cache_key()).await?;
        }

        let family_id = self
            .cache
            .get_app_metadata(&self.config.client_id, &account.environment)
            .await
            .and_then(|metadata| metadata.family_id);

        let refresh_token = self
            .cache
            .find_refresh_token(
                &account.home_account_id,
                &account.environment,
                &self.config.client_id,
                family_id.as_deref(),
            )
            .await
            .ok_or(AuthError::NoCachedToken)?;

        self.acquire_token_by_refresh_token(&refresh_token.secret, &request.scopes)
            .await
    }

    /// Accounts present in the cache
    pub async fn accounts(&self) -> Vec<AccountInfo> {
        self.cache
            .get_accounts_filtered_by(&Default::default())
            .await
            .iter()
            .map(AccountInfo::from)
            .collect()
    }

    /// Remove an account and every credential it owns (logout)
    #[instrument(skip(self, account))]
    pub async fn remove_account(&self, account: &AccountInfo) -> Result<()> {
        self.cache
            .purge_account(&account.home_account_id, &account.environment)
            .await
            .map_err(Into::into)
    }

    fn is_still_fresh(&self, entity: &entra_cache::CredentialEntity) -> bool {
        let Some(expires_on) = entity.expires_on else {
            return false;
        };
        let offset = self.config.token_renewal_offset.as_secs() as i64;
        chrono::Utc::now().timestamp() + offset < expires_on
    }

    async fn cached_id_token(
        &self,
        account: &AccountInfo,
    ) -> Option<entra_cache::CredentialEntity> {
        self.cache
            .get_credentials_filtered_by(&CredentialFilter {
                home_account_id: Some(account.home_account_id.clone()),
                environment: Some(account.environment.clone()),
                credential_type: Some(CredentialType::IdToken),
                client_id: Some(self.config.client_id.clone()),
                ..Default::default()
            })
            .await
            .into_iter()
            .next()
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("client_id", &self.config.client_id)
            .field("authority", &self.authority.canonical_authority().as_str())
            .finish_non_exhaustive()
    }
}
