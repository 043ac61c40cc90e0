use serde::Deserialize;

/// Raw token-endpoint response, success and error shapes alike.
///
/// Every field is optional; the response handler decides what a given
/// combination means. The server performs no schema validation on its side,
/// so neither does deserialization here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerTokenResponse {
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub ext_expires_in: Option<u64>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    /// Base64url JSON with the `uid`/`utid` pair
    #[serde(default)]
    pub client_info: Option<String>,
    /// Family-of-client-id marker; presence means the refresh token is shared
    /// across the named family
    #[serde(default)]
    pub foci: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub suberror: Option<String>,
}

/// Device authorization response (RFC 8628)
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_poll_interval() -> u64 {
    5
}
