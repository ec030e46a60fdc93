//! Topology backends
//!
//! Every cluster id is served by one `ClusterBackend`. Isolated and shared
//! clusters are transparent and proxy everything to their single member
//! without decoding it; federated clusters
//! serve the natively handled `(kind, verb)` pairs and leave the rest to the
//! dispatcher's fallback proxy.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Response;

use kubegate_common::ClusterKind;

use crate::error::Result;
use crate::federation::{Federation, Member};
use crate::handlers;
use crate::kinds::ResourceKind;
use crate::proxy;
use crate::request::{RequestContext, Verb};

/// How a cluster id is served
///
/// The dispatcher only depends on this trait, so topologies can be added
/// without touching request parsing.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Topology served by this backend
    fn topology(&self) -> ClusterKind;

    /// Whether every request except `ClusterMeta` goes to `fallback`
    /// untouched, before the gateway parses its query or method
    fn is_transparent(&self) -> bool {
        false
    }

    /// Whether `serve` implements this request. Requests it does not
    /// implement are proxied to `fallback`.
    fn handles(&self, ctx: &RequestContext) -> bool;

    /// Member receiving proxied requests
    fn fallback(&self) -> &Member;

    /// Serve a request `handles` accepted
    async fn serve(&self, ctx: RequestContext) -> Result<Response<Body>>;
}

/// Backend for isolated and shared clusters: a reverse proxy to one member
pub struct ProxyBackend {
    topology: ClusterKind,
    target: Member,
}

impl ProxyBackend {
    /// Proxy every request for a cluster id to `target`
    pub fn new(topology: ClusterKind, target: Member) -> Self {
        Self { topology, target }
    }
}

#[async_trait]
impl ClusterBackend for ProxyBackend {
    fn topology(&self) -> ClusterKind {
        self.topology
    }

    fn is_transparent(&self) -> bool {
        true
    }

    fn handles(&self, _ctx: &RequestContext) -> bool {
        true
    }

    fn fallback(&self) -> &Member {
        &self.target
    }

    async fn serve(&self, ctx: RequestContext) -> Result<Response<Body>> {
        let api_path = ctx.api_path.clone();
        proxy::forward(&self.target, &api_path, ctx.into_request()).await
    }
}

/// Backend for federated clusters
pub struct FederatedBackend {
    federation: Federation,
}

impl FederatedBackend {
    /// Serve a cluster id from `federation`
    pub fn new(federation: Federation) -> Self {
        Self { federation }
    }
}

#[async_trait]
impl ClusterBackend for FederatedBackend {
    fn topology(&self) -> ClusterKind {
        ClusterKind::Federated
    }

    fn handles(&self, ctx: &RequestContext) -> bool {
        let Some(kind) = ctx.kind else {
            return false;
        };
        // Member watch streams are not tables; let the master render them
        if ctx.verb == Verb::Watch && ctx.wants_table {
            return false;
        }
        kind != ResourceKind::ClusterMeta && kind.supports(ctx.verb, ctx.info.subresource.as_deref())
    }

    fn fallback(&self) -> &Member {
        self.federation.master()
    }

    async fn serve(&self, ctx: RequestContext) -> Result<Response<Body>> {
        handlers::serve(&self.federation, ctx).await
    }
}
