use thiserror::Error;

/// Token acquisition error types
#[derive(Error, Debug)]
pub enum AuthError {
    /// The authorization server answered with an OAuth error body.
    /// Surfaced verbatim, never retried here.
    #[error("Server error {error}: {}", .error_description.as_deref().unwrap_or("no description"))]
    Server {
        error: String,
        error_description: Option<String>,
        sub_error: Option<String>,
    },

    #[error("Invalid client configuration: {0}")]
    ClientConfig(String),

    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    #[error("Failed to decode id_token: {0}")]
    InvalidIdToken(String),

    #[error("Failed to decode client_info: {0}")]
    InvalidClientInfo(String),

    #[error("Response carries no resolvable account identity")]
    NoAccountIdentity,

    #[error("No cached token satisfies the request and no refresh token is available")]
    NoCachedToken,

    #[error("Device code expired before sign-in completed")]
    DeviceCodeExpired,

    #[error("User declined the authentication flow")]
    UserCancelled,

    #[error("Invalid redirect URI or missing code")]
    InvalidRedirect,

    #[error("OAuth state mismatch - possible CSRF attack")]
    StateMismatch,

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error(transparent)]
    Cache(#[from] entra_cache::CacheError),
}

impl AuthError {
    /// True for the server's `invalid_grant` answer - the refresh token or
    /// code being redeemed is no longer good.
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, Self::Server { error, .. } if error == "invalid_grant")
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
