//! Gateway configuration
//!
//! The gateway is configured from a single YAML document:
//!
//! ```yaml
//! listenAddr: 0.0.0.0:6443
//! memberTimeoutSeconds: 30
//! tls:
//!   certFile: /etc/kubegate/tls.crt
//!   keyFile: /etc/kubegate/tls.key
//! clusters:
//!   prod:
//!     kind: federated
//!     master: prod-us
//!     members: [prod-us, prod-eu]
//!   team-a:
//!     kind: shared
//!     master: shared-1
//!     credential: shared-1/team-a
//! credentials:
//!   prod-us:
//!     host: https://10.0.0.1:6443
//!     tokenFile: /var/run/secrets/prod-us/token
//! ```
//!
//! The registry section is loaded once at startup and never mutated.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::credentials::CredentialSpec;
use crate::error::Error;
use crate::{Result, DEFAULT_GATEWAY_PORT, DEFAULT_MEMBER_TIMEOUT_SECS};

/// Topology backing a cluster id
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ClusterKind {
    /// A single dedicated cluster, proxied as-is
    Isolated,
    /// A multi-tenant cluster reached with a namespace-scoped credential
    Shared,
    /// A virtual cluster backed by several member clusters
    Federated,
}

impl std::fmt::Display for ClusterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClusterKind::Isolated => "isolated",
            ClusterKind::Shared => "shared",
            ClusterKind::Federated => "federated",
        };
        f.write_str(name)
    }
}

/// Registry entry describing how one cluster id is served
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResource {
    /// Topology of this cluster id
    pub kind: ClusterKind,
    /// Member that receives every write
    pub master: String,
    /// Members contributing reads; defaults to just the master
    #[serde(default)]
    pub members: Vec<String>,
    /// Credential store key; defaults to the member id.
    /// Shared clusters point this at a tenant-scoped credential.
    #[serde(default)]
    pub credential: Option<String>,
}

impl ClusterResource {
    /// Members contributing reads, always including the master
    pub fn read_members(&self) -> Vec<&str> {
        if self.members.is_empty() {
            return vec![self.master.as_str()];
        }
        self.members.iter().map(String::as_str).collect()
    }

    /// Credential store key used to reach `member`
    pub fn credential_key<'a>(&'a self, member: &'a str) -> &'a str {
        match (&self.kind, &self.credential) {
            (ClusterKind::Shared, Some(key)) => key,
            _ => member,
        }
    }

    fn validate(&self, id: &str) -> Result<()> {
        if self.master.is_empty() {
            return Err(Error::config(id, "master must not be empty"));
        }
        if !self.members.is_empty() && !self.members.contains(&self.master) {
            return Err(Error::config(
                id,
                format!("master {} is not listed in members", self.master),
            ));
        }
        if self.kind != ClusterKind::Federated && self.members.len() > 1 {
            return Err(Error::config(
                id,
                format!("{} clusters have exactly one member", self.kind),
            ));
        }
        Ok(())
    }
}

/// TLS material for the gateway listener
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// PEM certificate chain
    pub cert_file: PathBuf,
    /// PEM private key
    pub key_file: PathBuf,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_GATEWAY_PORT))
}

fn default_member_timeout() -> u64 {
    DEFAULT_MEMBER_TIMEOUT_SECS
}

/// Top-level gateway configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Address the gateway listens on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Serve HTTPS when set, plain HTTP otherwise
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    /// Timeout for buffered member requests
    #[serde(default = "default_member_timeout")]
    pub member_timeout_seconds: u64,
    /// Cluster registry keyed by cluster id
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterResource>,
    /// Credential store keyed by member id or tenant key
    #[serde(default)]
    pub credentials: BTreeMap<String, CredentialSpec>,
}

impl GatewayConfig {
    /// Load and validate configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config = Self::from_yaml(&raw)?;
        debug!(
            path = %path.display(),
            clusters = config.clusters.len(),
            credentials = config.credentials.len(),
            "Loaded gateway configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: GatewayConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check registry consistency: masters are members and every member has a credential
    pub fn validate(&self) -> Result<()> {
        for (id, cluster) in &self.clusters {
            cluster.validate(id)?;
            for member in cluster.read_members() {
                let key = cluster.credential_key(member);
                if !self.credentials.contains_key(key) {
                    return Err(Error::config(
                        id,
                        format!("no credential {} for member {}", key, member),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
listenAddr: 127.0.0.1:8443
clusters:
  prod:
    kind: federated
    master: prod-us
    members: [prod-us, prod-eu]
  dev:
    kind: isolated
    master: dev-1
  team-a:
    kind: shared
    master: shared-1
    credential: shared-1/team-a
credentials:
  prod-us:
    host: https://10.0.0.1:6443
    token: us-token
  prod-eu:
    host: https://10.0.0.2:6443
    token: eu-token
  dev-1:
    host: https://10.0.0.3:6443
    token: dev-token
  shared-1/team-a:
    host: https://10.0.0.4:6443
    token: team-a-token
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = GatewayConfig::from_yaml(SAMPLE).unwrap();

        assert_eq!(config.listen_addr.port(), 8443);
        assert_eq!(config.member_timeout_seconds, DEFAULT_MEMBER_TIMEOUT_SECS);
        assert!(config.tls.is_none());
        assert_eq!(config.clusters.len(), 3);

        let prod = &config.clusters["prod"];
        assert_eq!(prod.kind, ClusterKind::Federated);
        assert_eq!(prod.read_members(), vec!["prod-us", "prod-eu"]);
    }

    #[test]
    fn test_isolated_members_default_to_master() {
        let config = GatewayConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.clusters["dev"].read_members(), vec!["dev-1"]);
    }

    #[test]
    fn test_shared_cluster_uses_tenant_credential() {
        let config = GatewayConfig::from_yaml(SAMPLE).unwrap();
        let shared = &config.clusters["team-a"];
        assert_eq!(shared.credential_key("shared-1"), "shared-1/team-a");
    }

    #[test]
    fn test_credential_override_ignored_outside_shared() {
        let cluster = ClusterResource {
            kind: ClusterKind::Isolated,
            master: "a".to_string(),
            members: vec![],
            credential: Some("other".to_string()),
        };
        assert_eq!(cluster.credential_key("a"), "a");
    }

    #[test]
    fn test_master_must_be_member() {
        let raw = r#"
clusters:
  prod:
    kind: federated
    master: prod-ap
    members: [prod-us]
credentials:
  prod-us: { host: "https://a", token: t }
"#;
        let err = GatewayConfig::from_yaml(raw).unwrap_err();
        assert!(err.to_string().contains("not listed in members"));
    }

    #[test]
    fn test_missing_credential_rejected() {
        let raw = r#"
clusters:
  dev:
    kind: isolated
    master: dev-1
"#;
        let err = GatewayConfig::from_yaml(raw).unwrap_err();
        assert!(err.to_string().contains("no credential dev-1"));
    }

    #[test]
    fn test_isolated_with_many_members_rejected() {
        let raw = r#"
clusters:
  dev:
    kind: isolated
    master: a
    members: [a, b]
credentials:
  a: { host: "https://a", token: t }
  b: { host: "https://b", token: t }
"#;
        assert!(GatewayConfig::from_yaml(raw).is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let raw = r#"
clusters:
  dev:
    kind: hybrid
    master: a
"#;
        assert!(matches!(
            GatewayConfig::from_yaml(raw).unwrap_err(),
            Error::Yaml(_)
        ));
    }
}
