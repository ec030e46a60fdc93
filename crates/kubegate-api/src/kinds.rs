//! Resource kinds served natively by the gateway
//!
//! Each kind statically declares the verbs it implements. Any other
//! `(kind, verb)` pair, and every kind not listed here, is proxied.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kubegate_common::CLUSTER_ID_ANNOTATION;

use crate::request::Verb;

/// API group of the gateway's own virtual resources
pub const GATEWAY_GROUP: &str = "kubegate.io";

const READ_VERBS: &[Verb] = &[Verb::List, Verb::ListAsTable, Verb::Get, Verb::GetAsTable];

const CRUD_VERBS: &[Verb] = &[
    Verb::List,
    Verb::ListAsTable,
    Verb::Get,
    Verb::GetAsTable,
    Verb::Create,
    Verb::Update,
    Verb::Patch,
    Verb::Delete,
];

const POD_VERBS: &[Verb] = &[
    Verb::List,
    Verb::ListAsTable,
    Verb::Get,
    Verb::GetAsTable,
    Verb::Create,
    Verb::Update,
    Verb::Patch,
    Verb::Delete,
    Verb::Watch,
    Verb::GetLogs,
    Verb::Exec,
];

/// Kinds with a native handler
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `v1` pods
    Pod,
    /// `apps/v1` deployments
    Deployment,
    /// `apps/v1` statefulsets
    StatefulSet,
    /// `v1` services
    Service,
    /// `v1` configmaps
    ConfigMap,
    /// `v1` secrets
    Secret,
    /// `v1` events
    Event,
    /// `kubegate.io/v1` clustermetas, describing the members behind a cluster id
    ClusterMeta,
}

impl ResourceKind {
    /// Map API coordinates to a kind
    pub fn from_resource(group: &str, version: &str, resource: &str) -> Option<Self> {
        if version != "v1" {
            return None;
        }
        let kind = match (group, resource) {
            ("", "pods") => ResourceKind::Pod,
            ("apps", "deployments") => ResourceKind::Deployment,
            ("apps", "statefulsets") => ResourceKind::StatefulSet,
            ("", "services") => ResourceKind::Service,
            ("", "configmaps") => ResourceKind::ConfigMap,
            ("", "secrets") => ResourceKind::Secret,
            ("", "events") => ResourceKind::Event,
            (GATEWAY_GROUP, "clustermetas") => ResourceKind::ClusterMeta,
            _ => return None,
        };
        Some(kind)
    }

    /// Verbs this kind implements
    pub fn verbs(self) -> &'static [Verb] {
        match self {
            ResourceKind::Pod => POD_VERBS,
            ResourceKind::Deployment
            | ResourceKind::StatefulSet
            | ResourceKind::Service
            | ResourceKind::ConfigMap
            | ResourceKind::Secret => CRUD_VERBS,
            ResourceKind::Event | ResourceKind::ClusterMeta => READ_VERBS,
        }
    }

    /// Whether the handler implements `verb`, optionally on a subresource.
    ///
    /// Only patches target arbitrary subresources; logs and exec carry their
    /// own. Reads and replaces of subresources (status, scale) are proxied.
    pub fn supports(self, verb: Verb, subresource: Option<&str>) -> bool {
        let subresource_ok = match (verb, subresource) {
            (_, None) => !matches!(verb, Verb::GetLogs | Verb::Exec),
            (Verb::Patch, Some(_)) => true,
            (Verb::GetLogs, Some("log")) => true,
            (Verb::Exec, Some("exec" | "attach")) => true,
            _ => false,
        };
        subresource_ok && self.verbs().contains(&verb)
    }
}

/// Typed Kubernetes object the federated handlers can serve
pub trait KindObject:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> KindObject for K where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Stamp the member an object was read from onto its annotations
pub fn tag_object<K: Resource>(object: &mut K, member: &str) {
    object
        .meta_mut()
        .annotations
        .get_or_insert_with(Default::default)
        .insert(CLUSTER_ID_ANNOTATION.to_string(), member.to_string());
}

/// Same as [`tag_object`] for an untyped object. Values without `metadata`
/// are left alone.
pub fn tag_value(object: &mut Value, member: &str) {
    let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    let annotations = metadata
        .entry("annotations")
        .or_insert_with(|| Value::Object(Default::default()));
    if annotations.is_null() {
        *annotations = Value::Object(Default::default());
    }
    if let Some(map) = annotations.as_object_mut() {
        map.insert(
            CLUSTER_ID_ANNOTATION.to_string(),
            Value::String(member.to_string()),
        );
    }
}

/// Generic list wire type (`{Kind}List`)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList<K> {
    /// List API version
    #[serde(default)]
    pub api_version: String,
    /// List kind, e.g. `PodList`
    #[serde(default)]
    pub kind: String,
    /// List metadata (continue token, remaining count)
    #[serde(default)]
    pub metadata: ListMeta,
    /// Items
    #[serde(default = "Vec::new")]
    pub items: Vec<K>,
}

impl<K: KindObject> ResourceList<K> {
    /// Empty list carrying the kind's own TypeMeta
    pub fn empty() -> Self {
        Self {
            api_version: K::api_version(&()).into_owned(),
            kind: format!("{}List", K::kind(&())),
            metadata: ListMeta::default(),
            items: Vec::new(),
        }
    }
}
