//! Member cluster credentials
//!
//! The gateway authenticates to every member cluster with its own stored
//! bearer token. Callers' tokens are never forwarded.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::Deserialize;
use zeroize::Zeroizing;

use crate::error::Error;
use crate::Result;

/// Credential entry as written in the configuration file
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSpec {
    /// API server URL, e.g. `https://10.0.0.1:6443`
    pub host: String,
    /// Inline bearer token
    #[serde(default)]
    pub token: Option<String>,
    /// File holding the bearer token (takes precedence over `token`)
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// PEM CA bundle used to verify the API server
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    /// Skip TLS verification (test clusters only)
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

impl std::fmt::Debug for CredentialSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSpec")
            .field("host", &self.host)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_file", &self.token_file)
            .field("ca_file", &self.ca_file)
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .finish()
    }
}

/// Resolved connection parameters for one member cluster
#[derive(Clone)]
pub struct ClusterCredential {
    /// API server URL without trailing slash
    pub host: String,
    /// Bearer token (zeroized on drop)
    pub token: Zeroizing<String>,
    /// PEM CA bundle, if the server is not signed by a public root
    pub ca_cert_pem: Option<Vec<u8>>,
    /// Skip TLS verification
    pub insecure_skip_tls_verify: bool,
}

impl std::fmt::Debug for ClusterCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCredential")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .finish()
    }
}

impl ClusterCredential {
    /// Resolve a credential spec, reading any referenced files
    pub fn from_spec(key: &str, spec: &CredentialSpec) -> Result<Self> {
        let token = match (&spec.token_file, &spec.token) {
            (Some(path), _) => std::fs::read_to_string(path)
                .map(|t| t.trim().to_string())
                .map_err(|e| Error::io(path, e))?,
            (None, Some(token)) => token.clone(),
            (None, None) => {
                return Err(Error::config(key, "credential needs token or tokenFile"));
            }
        };

        let ca_cert_pem = spec
            .ca_file
            .as_ref()
            .map(|path| std::fs::read(path).map_err(|e| Error::io(path, e)))
            .transpose()?;

        Ok(Self {
            host: spec.host.trim_end_matches('/').to_string(),
            token: Zeroizing::new(token),
            ca_cert_pem,
            insecure_skip_tls_verify: spec.insecure_skip_tls_verify,
        })
    }
}

/// Lookup of member credentials by cluster id or tenant key
pub trait CredentialResolver: Send + Sync {
    /// Return connection parameters for `key`, or None if unknown
    fn resolve(&self, key: &str) -> Option<ClusterCredential>;
}

/// Credential store loaded once from configuration
#[derive(Clone, Debug, Default)]
pub struct StaticCredentialStore {
    credentials: HashMap<String, ClusterCredential>,
}

impl StaticCredentialStore {
    /// Resolve every configured credential up front
    pub fn from_specs(specs: &BTreeMap<String, CredentialSpec>) -> Result<Self> {
        let credentials = specs
            .iter()
            .map(|(key, spec)| Ok((key.clone(), ClusterCredential::from_spec(key, spec)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self { credentials })
    }
}

impl CredentialResolver for StaticCredentialStore {
    fn resolve(&self, key: &str) -> Option<ClusterCredential> {
        self.credentials.get(key).cloned()
    }
}
