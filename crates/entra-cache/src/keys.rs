use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used when joining cache key components.
pub const CACHE_KEY_SEPARATOR: &str = "-";

/// Credential discriminator.
///
/// The string values are part of the persisted cache schema and must not be
/// renamed without a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialType {
    IdToken,
    AccessToken,
    RefreshToken,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdToken => "IdToken",
            Self::AccessToken => "AccessToken",
            Self::RefreshToken => "RefreshToken",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authority flavor an account was issued by.
///
/// Like [`CredentialType`], the string values are a storage contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheAccountType {
    #[serde(rename = "MSSTS")]
    Mssts,
    #[serde(rename = "ADFS")]
    Adfs,
    #[serde(rename = "MSA")]
    Msa,
    #[serde(rename = "Generic")]
    Generic,
}

/// Key under which an account record is stored: `<homeAccountId>-<environment>`,
/// lowercased.
///
/// Total over its inputs: empty strings produce a degenerate but valid key.
pub fn account_key(home_account_id: &str, environment: &str) -> String {
    [home_account_id, environment]
        .join(CACHE_KEY_SEPARATOR)
        .to_lowercase()
}

/// Key under which a credential record is stored.
///
/// Three `-`-joined components, the whole key lowercased:
/// the account prefix, `credentialType-<clientOrFamilyId>-<realm or "">`, and
/// the target string. For refresh tokens the id component is the `familyId`
/// when one is set, so a single family token answers for every client in the
/// family; all other credential types always use `clientId`.
pub fn credential_key(
    home_account_id: &str,
    environment: &str,
    credential_type: CredentialType,
    client_id: &str,
    family_id: Option<&str>,
    realm: Option<&str>,
    target: Option<&str>,
) -> String {
    let client_or_family = match (credential_type, family_id) {
        (CredentialType::RefreshToken, Some(family)) if !family.is_empty() => family,
        _ => client_id,
    };

    let account_part = [home_account_id, environment].join(CACHE_KEY_SEPARATOR);
    let credential_part = [
        credential_type.as_str(),
        client_or_family,
        realm.unwrap_or_default(),
    ]
    .join(CACHE_KEY_SEPARATOR);

    [
        account_part.as_str(),
        credential_part.as_str(),
        target.unwrap_or_default(),
    ]
    .join(CACHE_KEY_SEPARATOR)
    .to_lowercase()
}

/// Key under which per-app metadata is stored: `<clientId>-<environment>`,
/// lowercased.
pub fn app_metadata_key(client_id: &str, environment: &str) -> String {
    [client_id, environment]
        .join(CACHE_KEY_SEPARATOR)
        .to_lowercase()
}

/// Determine which credential type a cache key refers to.
///
/// Substring match in fixed priority order AccessToken, IdToken, RefreshToken.
/// This is only sound because none of the three type names is a substring of
/// another; re-verify before adding a credential type.
pub fn credential_type_of_key(key: &str) -> Option<CredentialType> {
    let lowered = key.to_lowercase();
    for credential_type in [
        CredentialType::AccessToken,
        CredentialType::IdToken,
        CredentialType::RefreshToken,
    ] {
        if lowered.contains(&credential_type.as_str().to_lowercase()) {
            return Some(credential_type);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_key_is_lowercased_and_joined() {
        assert_eq!(
            account_key("uid.utid", "Login.Microsoftonline.com"),
            "uid.utid-login.microsoftonline.com"
        );
    }

    #[test]
    fn test_account_key_accepts_empty_inputs() {
        assert_eq!(account_key("", ""), "-");
    }

    #[test]
    fn test_credential_key_is_deterministic() {
        let make = || {
            credential_key(
                "uid.utid",
                "login.microsoftonline.com",
                CredentialType::AccessToken,
                "client-a",
                None,
                Some("utid"),
                Some("user.read"),
            )
        };
        assert_eq!(make(), make());
    }

    #[test]
    fn test_credential_key_ignores_input_case() {
        let lower = credential_key(
            "uid.utid",
            "login.microsoftonline.com",
            CredentialType::AccessToken,
            "client-a",
            None,
            Some("utid"),
            Some("user.read"),
        );
        let mixed = credential_key(
            "uid.utid",
            "Login.Microsoftonline.com",
            CredentialType::AccessToken,
            "Client-A",
            None,
            Some("UTID"),
            Some("User.Read"),
        );
        assert_eq!(lower, mixed);
    }

    #[test]
    fn test_access_token_key_layout() {
        let key = credential_key(
            "uid.utid",
            "login.microsoftonline.com",
            CredentialType::AccessToken,
            "client-a",
            None,
            Some("utid"),
            Some("a b"),
        );
        assert_eq!(
            key,
            "uid.utid-login.microsoftonline.com-accesstoken-client-a-utid-a b"
        );
    }

    #[test]
    fn test_refresh_token_key_prefers_family_id() {
        let family = credential_key(
            "uid.utid",
            "login.microsoftonline.com",
            CredentialType::RefreshToken,
            "A",
            Some("F"),
            None,
            None,
        );
        assert!(family.contains("-refreshtoken-f-"));
        assert!(!family.contains("-refreshtoken-a-"));

        let own = credential_key(
            "uid.utid",
            "login.microsoftonline.com",
            CredentialType::RefreshToken,
            "A",
            None,
            None,
            None,
        );
        assert!(own.contains("-refreshtoken-a-"));
    }

    #[test]
    fn test_family_id_never_applies_to_access_tokens() {
        let key = credential_key(
            "uid.utid",
            "login.microsoftonline.com",
            CredentialType::AccessToken,
            "A",
            Some("F"),
            Some("utid"),
            Some("a"),
        );
        assert!(key.contains("-accesstoken-a-"));
    }

    #[test]
    fn test_credential_type_of_key() {
        let at = credential_key(
            "u",
            "e",
            CredentialType::AccessToken,
            "c",
            None,
            Some("r"),
            Some("t"),
        );
        let idt = credential_key("u", "e", CredentialType::IdToken, "c", None, Some("r"), None);
        let rt = credential_key("u", "e", CredentialType::RefreshToken, "c", None, None, None);

        assert_eq!(credential_type_of_key(&at), Some(CredentialType::AccessToken));
        assert_eq!(credential_type_of_key(&idt), Some(CredentialType::IdToken));
        assert_eq!(credential_type_of_key(&rt), Some(CredentialType::RefreshToken));
        assert_eq!(credential_type_of_key("uid.utid-env"), None);
    }

    #[test]
    fn test_type_names_are_mutually_non_substrings() {
        let names = ["accesstoken", "idtoken", "refreshtoken"];
        for a in names {
            for b in names {
                if a != b {
                    assert!(!a.contains(b), "{b} is a substring of {a}");
                }
            }
        }
    }
}
