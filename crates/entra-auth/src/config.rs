use std::time::Duration;
use url::Url;

use crate::error::{AuthError, Result};

/// Well-known public-cloud authority
pub const COMMON_AUTHORITY: &str = "https://login.microsoftonline.com/common";

/// Redirect URI for native/desktop applications without a listener
pub const NATIVE_CLIENT_REDIRECT_URI: &str =
    "https://login.microsoftonline.com/common/oauth2/nativeclient";

/// OIDC scopes every interactive request carries in addition to the caller's.
/// `offline_access` is what makes the server issue a refresh token.
pub const DEFAULT_OIDC_SCOPES: &[&str] = &["openid", "profile", "offline_access"];

/// Refresh access tokens this long before their actual expiry
pub const TOKEN_RENEWAL_OFFSET: Duration = Duration::from_secs(300);

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Configuration for [`crate::AuthClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Application (client) ID registered with the authority
    pub client_id: String,

    /// Authority URL, e.g. `https://login.microsoftonline.com/<tenant>`
    pub authority: Url,

    /// OAuth redirect URI for the auth-code flow
    pub redirect_uri: Url,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,

    /// How early an access token counts as expired
    pub token_renewal_offset: Duration,
}

impl ClientConfig {
    /// Create a config for the given client against the given authority.
    ///
    /// Fails fast on an empty client id - a missing mandatory input is a
    /// configuration bug, not something to discover at first network call.
    pub fn new(client_id: impl Into<String>, authority: Url, redirect_uri: Url) -> Result<Self> {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(AuthError::ClientConfig(
                "client_id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client_id,
            authority,
            redirect_uri,
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("entra-auth".to_string()),
            token_renewal_offset: TOKEN_RENEWAL_OFFSET,
        })
    }

    /// Create a config against the public-cloud `common` authority
    pub fn common(client_id: impl Into<String>) -> Result<Self> {
        Self::new(
            client_id,
            Url::parse(COMMON_AUTHORITY).expect("valid authority URL"),
            Url::parse(NATIVE_CLIENT_REDIRECT_URI).expect("valid redirect URI"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_client_id_is_rejected() {
        let result = ClientConfig::common("  ");
        assert!(matches!(result, Err(AuthError::ClientConfig(_))));
    }

    #[test]
    fn test_common_defaults() {
        let config = ClientConfig::common("client-a").unwrap();
        assert_eq!(config.client_id, "client-a");
        assert_eq!(config.token_renewal_offset, TOKEN_RENEWAL_OFFSET);
        assert_eq!(config.authority.host_str(), Some("login.microsoftonline.com"));
    }
}
