//! Resource-kind handlers for federated clusters
//!
//! One generic handler serves every typed kind; the `ResourceKind` match
//! picks the k8s-openapi type. Handlers are stateless: everything they need
//! arrives in the `RequestContext`.

pub mod cluster_meta;

use axum::body::Body;
use axum::http::{Response, StatusCode};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Event, Pod, Secret, Service};
use tracing::debug;

use crate::error::{Error, Result};
use crate::federation::Federation;
use crate::kinds::{KindObject, ResourceKind};
use crate::proxy;
use crate::render::{json_response, table_response, watch_response};
use crate::request::{RequestContext, Verb};
use crate::status::Status;

/// Serve a request for a natively handled kind against a federation
pub async fn serve(federation: &Federation, ctx: RequestContext) -> Result<Response<Body>> {
    match ctx.kind {
        Some(ResourceKind::Pod) => serve_kind::<Pod>(federation, ctx).await,
        Some(ResourceKind::Deployment) => serve_kind::<Deployment>(federation, ctx).await,
        Some(ResourceKind::StatefulSet) => serve_kind::<StatefulSet>(federation, ctx).await,
        Some(ResourceKind::Service) => serve_kind::<Service>(federation, ctx).await,
        Some(ResourceKind::ConfigMap) => serve_kind::<ConfigMap>(federation, ctx).await,
        Some(ResourceKind::Secret) => serve_kind::<Secret>(federation, ctx).await,
        Some(ResourceKind::Event) => serve_kind::<Event>(federation, ctx).await,
        Some(ResourceKind::ClusterMeta) | None => Err(Error::Internal(format!(
            "no federated handler for {}",
            ctx.info.resource
        ))),
    }
}

async fn serve_kind<K: KindObject>(
    federation: &Federation,
    mut ctx: RequestContext,
) -> Result<Response<Body>> {
    let namespace = ctx.info.namespace.clone();
    let ns = namespace.as_deref();

    debug!(
        cluster = %ctx.cluster_id,
        verb = %ctx.verb,
        resource = %ctx.info.resource,
        namespace = ?ns,
        name = ?ctx.info.name,
        "Serving federated request"
    );

    match ctx.verb {
        Verb::List => json_response(&federation.list::<K>(ns, &ctx.options).await?),
        Verb::ListAsTable => {
            table_response(federation.list_table::<K>(ns, &ctx.options, &ctx.accept).await?)
        }
        Verb::Get => json_response(&federation.get::<K>(ns, ctx.name()?, &ctx.options).await?),
        Verb::GetAsTable => table_response(
            federation
                .get_table::<K>(ns, ctx.name()?, &ctx.options, &ctx.accept)
                .await?,
        ),
        Verb::Create => {
            let body = ctx.read_body().await?;
            let object: K = serde_json::from_slice(&body)?;
            json_response(&federation.create(ns, &object, &ctx.options).await?)
        }
        Verb::Update => {
            let body = ctx.read_body().await?;
            let object: K = serde_json::from_slice(&body)?;
            json_response(
                &federation
                    .update(ns, ctx.name()?, &object, &ctx.options)
                    .await?,
            )
        }
        Verb::Patch => {
            let patch_type = ctx.patch_type.ok_or_else(|| unsupported_patch(&ctx))?;
            let body = ctx.read_body().await?;
            let patched = federation
                .patch::<K>(
                    ns,
                    ctx.name()?,
                    ctx.info.subresource.as_deref(),
                    patch_type,
                    body.to_vec(),
                    &ctx.options,
                )
                .await?;
            json_response(&patched)
        }
        Verb::Delete => {
            let body = ctx.read_body().await?;
            let deleted = federation
                .delete::<K>(ns, ctx.name()?, body.to_vec(), &ctx.options)
                .await?;
            json_response(&deleted)
        }
        Verb::Watch => {
            let name = ctx.info.name.as_deref();
            watch_response(federation.watch::<K>(ns, name, &ctx.options).await?)
        }
        Verb::GetLogs | Verb::Exec => {
            let (member, _) = federation
                .locate::<K>(ns, ctx.name()?, &ctx.options)
                .await?;
            debug!(member = %member.id, verb = %ctx.verb, "Handing stream to owning member");
            let member = member.clone();
            let api_path = ctx.api_path.clone();
            proxy::forward(&member, &api_path, ctx.into_request()).await
        }
        Verb::DeleteCollection => Err(Error::MethodNotAllowed(ctx.verb.to_string())),
    }
}

fn unsupported_patch(ctx: &RequestContext) -> Error {
    let content_type = ctx
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    Error::Api(Box::new(Status::failure(
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        "UnsupportedMediaType",
        format!("the body of the request was in an unknown format - accepted media types include: application/json-patch+json, application/merge-patch+json, application/apply-patch+yaml; got {:?}", content_type),
    )))
}
