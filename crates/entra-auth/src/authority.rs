use url::Url;

use crate::error::{AuthError, Result};

/// Login hosts trusted without any extra configuration
const KNOWN_HOSTS: &[&str] = &[
    "login.microsoftonline.com",
    "login.windows.net",
    "login.microsoft.com",
    "sts.windows.net",
    "login.partner.microsoftonline.cn",
    "login.microsoftonline.us",
];

/// The set of authority hosts a client is willing to talk to.
///
/// An explicit value handed to each client at construction time. Resolving
/// an authority whose host is not in the registry fails before any network
/// or cache interaction.
#[derive(Debug, Clone)]
pub struct AuthorityRegistry {
    hosts: Vec<String>,
}

impl AuthorityRegistry {
    /// Registry seeded with the well-known Microsoft login hosts
    pub fn new() -> Self {
        Self {
            hosts: KNOWN_HOSTS.iter().map(|host| host.to_string()).collect(),
        }
    }

    /// Registry with no trusted hosts; add them with [`AuthorityRegistry::trust`]
    pub fn empty() -> Self {
        Self { hosts: Vec::new() }
    }

    /// Add a host (e.g. a sovereign-cloud or test authority)
    pub fn trust(&mut self, host: impl Into<String>) {
        self.hosts.push(host.into().to_lowercase());
    }

    pub fn is_trusted(&self, host: &str) -> bool {
        self.hosts.iter().any(|known| known.eq_ignore_ascii_case(host))
    }

    /// Parse and validate an authority URL against the registry.
    ///
    /// Trust is decided on the host alone; a test authority on a non-default
    /// port only needs its host registered.
    pub fn resolve(&self, authority_url: &Url) -> Result<Authority> {
        let authority = Authority::parse(authority_url)?;
        let host = authority_url.host_str().unwrap_or_default();
        if !self.is_trusted(host) {
            return Err(AuthError::ClientConfig(format!(
                "Authority host {} is not a trusted authority",
                host
            )));
        }
        Ok(authority)
    }
}

impl Default for AuthorityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed, canonicalized authority.
///
/// Provides the two things the rest of the library needs: the environment
/// (issuing host, part of every cache key) and the endpoint URLs under the
/// canonical authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    canonical: Url,
    environment: String,
    tenant: String,
}

impl Authority {
    /// Parse an authority URL of the form `https://<host>/<tenant>`.
    ///
    /// A missing tenant path defaults to `common`. The canonical form keeps
    /// scheme and port (test authorities run plain HTTP on localhost) and
    /// always ends in `/<tenant>/`.
    pub fn parse(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| {
                AuthError::ClientConfig(format!("Authority {} has no host", url))
            })?
            .to_lowercase();

        let tenant = url
            .path_segments()
            .and_then(|mut segments| segments.find(|segment| !segment.is_empty()))
            .unwrap_or("common")
            .to_lowercase();

        let mut canonical = url.clone();
        canonical.set_path(&format!("/{}/", tenant));
        canonical.set_query(None);
        canonical.set_fragment(None);

        let environment = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        };

        Ok(Self {
            canonical,
            environment,
            tenant,
        })
    }

    /// Issuing host (plus port when non-default); the `environment` field of
    /// every entity cached for this authority
    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn canonical_authority(&self) -> &Url {
        &self.canonical
    }

    pub fn authorize_endpoint(&self) -> Url {
        self.canonical
            .join("oauth2/v2.0/authorize")
            .expect("canonical authority is a valid base")
    }

    pub fn token_endpoint(&self) -> Url {
        self.canonical
            .join("oauth2/v2.0/token")
            .expect("canonical authority is a valid base")
    }

    pub fn device_code_endpoint(&self) -> Url {
        self.canonical
            .join("oauth2/v2.0/devicecode")
            .expect("canonical authority is a valid base")
    }
}
