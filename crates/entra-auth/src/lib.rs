//! OAuth2/OIDC token acquisition against Microsoft identity authorities
//!
//! This crate implements the client side of token acquisition for desktop
//! and service applications: authorization code + PKCE, device code, refresh
//! token, and silent (cache-only) flows. Tokens land in the [`entra_cache`]
//! token cache, so later requests resolve without a network round-trip.
//!
//! # Acquiring Tokens
//!
//! ```no_run
//! use std::sync::Arc;
//! use entra_auth::{AuthClient, ClientConfig, ScopeSet};
//! use entra_cache::MemoryStorage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::common("your-client-id")?;
//!     let client = AuthClient::new(config, Arc::new(MemoryStorage::new()))?;
//!
//!     let scopes = ScopeSet::parse("User.Read");
//!
//!     // Device code: show the code, then poll until the user signs in
//!     let device = client.begin_device_code(&scopes).await?;
//!     println!("Visit {} and enter {}", device.verification_uri, device.user_code);
//!     let result = client.acquire_token_by_device_code(&device, &scopes).await?;
//!     println!("Signed in as {}", result.account.username);
//!
//!     // Later: silent acquisition, served from cache while the token is fresh
//!     let silent = entra_auth::SilentRequest {
//!         account: result.account.clone(),
//!         scopes,
//!         force_refresh: false,
//!     };
//!     let _again = client.acquire_token_silent(&silent).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Auth Code + PKCE
//!
//! ```no_run
//! use std::sync::Arc;
//! use entra_auth::{AuthClient, ClientConfig, PkcePair, ScopeSet};
//! use entra_cache::MemoryStorage;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ClientConfig::common("your-client-id")?;
//! let client = AuthClient::new(config, Arc::new(MemoryStorage::new()))?;
//!
//! let scopes = ScopeSet::parse("User.Read");
//! let pkce = PkcePair::generate();
//! let url = client.auth_code_url(&scopes, Some("opaque-state"), &pkce)?;
//! println!("Visit: {}", url);
//!
//! // After the user authorizes and you receive the redirect URL...
//! let redirect_url = "https://login.microsoftonline.com/common/oauth2/nativeclient?code=...";
//! let code = client.parse_redirect(redirect_url, Some("opaque-state"))?;
//! let result = client.acquire_token_by_code(&code, &pkce, &scopes).await?;
//! println!("Got token for {}", result.account.username);
//! # Ok(())
//! # }
//! ```
//!
//! # Persistent Cache
//!
//! Hand [`AuthClient::new`] an [`entra_cache::FileStorage`] instead of the
//! in-memory store and sessions survive process restarts; any store
//! implementing [`entra_cache::CacheStorage`] works.
//!
//! # Important Notes
//!
//! - Tokens are secrets: nothing in this crate logs token material
//! - The silent flow treats tokens within 5 minutes of expiry as misses and
//!   refreshes them early
//! - Authority hosts are validated against an [`AuthorityRegistry`] at
//!   client construction, not at first call

pub mod authority;
pub mod client;
pub mod config;
pub mod error;
pub mod id_token;
pub mod models;
pub mod pkce;
pub mod response;

// Re-export main types
pub use authority::{Authority, AuthorityRegistry};
pub use client::{AuthClient, SilentRequest};
pub use config::{ClientConfig, HttpTimeouts, TOKEN_RENEWAL_OFFSET};
pub use error::{AuthError, Result};
pub use id_token::{ClientInfo, IdTokenClaims};
pub use models::{DeviceCodeResponse, ServerTokenResponse};
pub use pkce::PkcePair;
pub use response::{AccountInfo, AuthenticationResult, RequestContext, ResponseHandler};

// The cache's scope type appears throughout the public API
pub use entra_cache::ScopeSet;
