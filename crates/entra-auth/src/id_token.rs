use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;

use crate::error::{AuthError, Result};

/// Claims extracted from an ID token.
///
/// The payload segment is decoded without signature validation: these claims
/// only feed cache bookkeeping on the client; the protected API is the party
/// that must verify the token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdTokenClaims {
    /// Tenant the token was issued for
    #[serde(default)]
    pub tid: Option<String>,
    /// Object id of the user within the tenant
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl IdTokenClaims {
    /// Decode the payload segment of a compact JWT
    pub fn decode(raw_token: &str) -> Result<Self> {
        let payload = raw_token
            .split('.')
            .nth(1)
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| {
                AuthError::InvalidIdToken("token has no payload segment".to_string())
            })?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| AuthError::InvalidIdToken(format!("payload is not base64url: {}", e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::InvalidIdToken(format!("payload is not valid JSON: {}", e)))
    }

    /// Tenant-local account id: `oid` with `sub` as fallback
    pub fn local_account_id(&self) -> Option<&str> {
        self.oid.as_deref().or(self.sub.as_deref())
    }
}

/// The `uid`/`utid` pair carried in the `client_info` response field
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    pub uid: String,
    pub utid: String,
}

impl ClientInfo {
    pub fn decode(raw: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim_end_matches('='))
            .map_err(|e| AuthError::InvalidClientInfo(format!("not base64url: {}", e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::InvalidClientInfo(format!("not valid JSON: {}", e)))
    }

    /// The stable cross-tenant account identifier `<uid>.<utid>`
    pub fn home_account_id(&self) -> String {
        format!("{}.{}", self.uid, self.utid)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{fake_client_info, fake_jwt};
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_extracts_claims() {
        let token = fake_jwt(&json!({
            "tid": "utid",
            "oid": "object-id",
            "sub": "subject",
            "preferred_username": "a@b.com",
            "name": "A B"
        }));

        let claims = IdTokenClaims::decode(&token).unwrap();
        assert_eq!(claims.tid.as_deref(), Some("utid"));
        assert_eq!(claims.local_account_id(), Some("object-id"));
        assert_eq!(claims.preferred_username.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn test_local_account_id_falls_back_to_sub() {
        let token = fake_jwt(&json!({ "sub": "subject" }));
        let claims = IdTokenClaims::decode(&token).unwrap();
        assert_eq!(claims.local_account_id(), Some("subject"));
    }

    #[test]
    fn test_malformed_token_is_rejected() {
        assert!(matches!(
            IdTokenClaims::decode("no-dots-here"),
            Err(AuthError::InvalidIdToken(_))
        ));
        assert!(matches!(
            IdTokenClaims::decode("a.!!!not-base64!!!.c"),
            Err(AuthError::InvalidIdToken(_))
        ));

        let garbage = format!("a.{}.c", URL_SAFE_NO_PAD.encode("not json"));
        assert!(matches!(
            IdTokenClaims::decode(&garbage),
            Err(AuthError::InvalidIdToken(_))
        ));
    }

    #[test]
    fn test_client_info_round_trip() {
        let info = ClientInfo::decode(&fake_client_info("uid", "utid")).unwrap();
        assert_eq!(info.home_account_id(), "uid.utid");
    }

    #[test]
    fn test_client_info_rejects_garbage() {
        assert!(matches!(
            ClientInfo::decode("!!!"),
            Err(AuthError::InvalidClientInfo(_))
        ));
    }
}
