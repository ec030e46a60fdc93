//! Request dispatcher
//!
//! Entry point for every `/clusters/{id}/...` request. Resolves the cluster
//! id, parses the Kubernetes request info and hands the request to the
//! cluster's backend, or to its fallback proxy when the backend does not
//! serve it natively.
//!
//! Transparent backends (isolated and shared clusters) skip request context
//! construction entirely: their member sees the query and method exactly as
//! the caller sent them, malformed or not.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Request, Response};
use serde::Deserialize;
use tracing::debug;

use crate::error::Error;
use crate::handlers::cluster_meta;
use crate::kinds::ResourceKind;
use crate::proxy;
use crate::request::{RequestContext, ResourceInfo};
use crate::routing::strip_cluster_prefix;
use crate::server::AppState;

/// Path parameters for cluster routes
#[derive(Debug, Deserialize)]
pub struct ClusterPath {
    /// Cluster id
    pub cluster_id: String,
    /// Remainder of the path (e.g., "api/v1/pods")
    #[serde(default)]
    pub path: String,
}

/// Handle any request addressed to `/clusters/{cluster_id}`
pub async fn dispatch_handler(
    State(state): State<AppState>,
    Path(params): Path<ClusterPath>,
    request: Request<Body>,
) -> Result<Response<Body>, Error> {
    let cluster_id = params.cluster_id.as_str();
    let entry = state.registry.get(cluster_id)?;
    let backend = &entry.backend;

    let full_path = request.uri().path().to_string();
    let api_path = strip_cluster_prefix(&full_path, cluster_id);

    debug!(
        cluster = %cluster_id,
        topology = %backend.topology(),
        method = %request.method(),
        path = %api_path,
        "Dispatching request"
    );

    let Some(info) = ResourceInfo::parse(api_path) else {
        debug!(cluster = %cluster_id, path = %api_path, "Non-resource path, proxying");
        return proxy::forward(backend.fallback(), api_path, request).await;
    };

    let kind = ResourceKind::from_resource(&info.group, &info.version, &info.resource);
    if backend.is_transparent() && kind != Some(ResourceKind::ClusterMeta) {
        return proxy::forward(backend.fallback(), api_path, request).await;
    }

    let ctx = RequestContext::new(cluster_id, api_path, info, request)?;

    if ctx.kind == Some(ResourceKind::ClusterMeta) {
        return cluster_meta::serve(cluster_id, &entry.resource, &ctx);
    }

    if backend.handles(&ctx) {
        return backend.serve(ctx).await;
    }

    debug!(
        cluster = %cluster_id,
        verb = %ctx.verb,
        resource = %ctx.info.resource,
        member = %backend.fallback().id,
        "Not served natively, proxying to fallback"
    );
    let api_path = ctx.api_path.clone();
    proxy::forward(backend.fallback(), &api_path, ctx.into_request()).await
}
