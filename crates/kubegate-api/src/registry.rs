//! Cluster registry
//!
//! Maps every cluster id to the backend serving it. Built once at startup
//! from `GatewayConfig` and shared read-only across requests.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use kubegate_common::{ClusterCredential, ClusterKind, ClusterResource, CredentialResolver, GatewayConfig};

use crate::backend::{ClusterBackend, FederatedBackend, ProxyBackend};
use crate::client::MemberClient;
use crate::error::{Error, Result};
use crate::federation::{Federation, Member};

/// A registered cluster id
#[derive(Clone)]
pub struct ClusterEntry {
    /// Cluster id callers address
    pub id: String,
    /// Registry entry it was built from
    pub resource: ClusterResource,
    /// Backend serving it
    pub backend: Arc<dyn ClusterBackend>,
}

impl std::fmt::Debug for ClusterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterEntry")
            .field("id", &self.id)
            .field("resource", &self.resource)
            .finish()
    }
}

/// Immutable map of cluster id to backend
#[derive(Clone, Debug, Default)]
pub struct Registry {
    clusters: HashMap<String, ClusterEntry>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cluster id, replacing any previous entry
    pub fn insert(&mut self, id: impl Into<String>, resource: ClusterResource, backend: Arc<dyn ClusterBackend>) {
        let id = id.into();
        self.clusters.insert(
            id.clone(),
            ClusterEntry {
                id,
                resource,
                backend,
            },
        );
    }

    /// Look up a cluster id
    pub fn get(&self, id: &str) -> Result<&ClusterEntry> {
        self.clusters
            .get(id)
            .ok_or_else(|| Error::ClusterNotFound(id.to_string()))
    }

    /// Number of registered cluster ids
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Whether no cluster id is registered
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Build every backend described by `config`.
    ///
    /// `make_client` is called once per credential key; members sharing a
    /// credential share a client (and its connection pool).
    pub fn from_config<F>(
        config: &GatewayConfig,
        credentials: &dyn CredentialResolver,
        mut make_client: F,
    ) -> Result<Self>
    where
        F: FnMut(&str, &ClusterCredential) -> Result<Arc<dyn MemberClient>>,
    {
        let mut clients: HashMap<String, Arc<dyn MemberClient>> = HashMap::new();
        let mut registry = Registry::new();

        for (id, resource) in &config.clusters {
            let mut members = Vec::new();
            for member in resource.read_members() {
                let key = resource.credential_key(member);
                let client = match clients.get(key) {
                    Some(client) => client.clone(),
                    None => {
                        let credential = credentials.resolve(key).ok_or_else(|| {
                            Error::Internal(format!(
                                "cluster {}: no credential {} for member {}",
                                id, key, member
                            ))
                        })?;
                        let client = make_client(member, &credential)?;
                        clients.insert(key.to_string(), client.clone());
                        client
                    }
                };
                members.push(Member::new(member, client));
            }

            let backend: Arc<dyn ClusterBackend> = match resource.kind {
                ClusterKind::Isolated | ClusterKind::Shared => {
                    let target = members
                        .into_iter()
                        .find(|m| m.id == resource.master)
                        .ok_or_else(|| {
                            Error::Internal(format!("cluster {}: master {} missing", id, resource.master))
                        })?;
                    Arc::new(ProxyBackend::new(resource.kind, target))
                }
                ClusterKind::Federated => Arc::new(FederatedBackend::new(Federation::new(
                    members,
                    &resource.master,
                )?)),
            };

            info!(
                cluster = %id,
                kind = %resource.kind,
                master = %resource.master,
                members = resource.read_members().len(),
                "Registered cluster"
            );
            registry.insert(id.clone(), resource.clone(), backend);
        }

        Ok(registry)
    }
}
