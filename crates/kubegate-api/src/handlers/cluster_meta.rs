//! `kubegate.io/v1` ClusterMeta, a virtual read-only kind
//!
//! Describes the topology behind a cluster id. It is answered from the
//! registry for every topology and never reaches a member.

use axum::body::Body;
use axum::http::Response;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ListMeta, ObjectMeta};
use serde::Serialize;
use serde_json::json;

use kubegate_common::ClusterResource;

use crate::error::{Error, Result};
use crate::kinds::GATEWAY_GROUP;
use crate::render::{json_response, table_response};
use crate::request::{RequestContext, Verb};
use crate::table::{Table, TableColumnDefinition, TableRow};

const RESOURCE: &str = "clustermetas";

/// Topology of one cluster id
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMeta {
    /// `kubegate.io/v1`
    pub api_version: String,
    /// `ClusterMeta`
    pub kind: String,
    /// Name is the cluster id
    pub metadata: ObjectMeta,
    /// Topology details
    pub spec: ClusterMetaSpec,
}

/// ClusterMeta spec
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetaSpec {
    /// `isolated`, `shared` or `federated`
    pub kind: String,
    /// Member receiving writes
    pub master: String,
    /// Members contributing reads
    pub members: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterMetaList {
    api_version: String,
    kind: String,
    metadata: ListMeta,
    items: Vec<ClusterMeta>,
}

impl ClusterMeta {
    /// Describe `cluster_id`
    pub fn new(cluster_id: &str, resource: &ClusterResource) -> Self {
        Self {
            api_version: format!("{}/v1", GATEWAY_GROUP),
            kind: "ClusterMeta".to_string(),
            metadata: ObjectMeta {
                name: Some(cluster_id.to_string()),
                ..Default::default()
            },
            spec: ClusterMetaSpec {
                kind: resource.kind.to_string(),
                master: resource.master.clone(),
                members: resource
                    .read_members()
                    .into_iter()
                    .map(String::from)
                    .collect(),
            },
        }
    }

    fn table_row(&self) -> TableRow {
        TableRow {
            cells: vec![
                json!(self.metadata.name),
                json!(self.spec.kind),
                json!(self.spec.master),
                json!(self.spec.members.join(",")),
            ],
            conditions: None,
            object: serde_json::to_value(self).ok(),
        }
    }
}

fn column(name: &str, format: &str, description: &str) -> TableColumnDefinition {
    TableColumnDefinition {
        name: name.to_string(),
        type_: "string".to_string(),
        format: format.to_string(),
        description: description.to_string(),
        priority: 0,
    }
}

fn table(rows: Vec<TableRow>) -> Table {
    Table {
        column_definitions: vec![
            column("Name", "name", "Cluster id"),
            column("Kind", "", "Topology"),
            column("Master", "", "Member receiving writes"),
            column("Members", "", "Members contributing reads"),
        ],
        rows,
        ..Default::default()
    }
}

fn lookup<'a>(meta: &'a ClusterMeta, cluster_id: &str, ctx: &RequestContext) -> Result<&'a ClusterMeta> {
    match ctx.name()? {
        name if name == cluster_id => Ok(meta),
        name => Err(Error::not_found(RESOURCE, name)),
    }
}

/// Serve a ClusterMeta request for `cluster_id`. Only reads exist.
pub fn serve(
    cluster_id: &str,
    resource: &ClusterResource,
    ctx: &RequestContext,
) -> Result<Response<Body>> {
    let meta = ClusterMeta::new(cluster_id, resource);

    match ctx.verb {
        Verb::List => json_response(&ClusterMetaList {
            api_version: meta.api_version.clone(),
            kind: "ClusterMetaList".to_string(),
            metadata: ListMeta::default(),
            items: vec![meta.clone()],
        }),
        Verb::ListAsTable => table_response(table(vec![meta.table_row()])),
        Verb::Get => json_response(lookup(&meta, cluster_id, ctx)?),
        Verb::GetAsTable => table_response(table(vec![lookup(&meta, cluster_id, ctx)?.table_row()])),
        other => Err(Error::MethodNotAllowed(other.to_string())),
    }
}
