//! Per-request context
//!
//! A `RequestContext` is built once per inbound request by the dispatcher and
//! consumed by whichever backend or handler serves it.

mod info;
mod options;

pub use info::ResourceInfo;
pub use options::RequestOptions;

use axum::body::{Body, Bytes};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{Method, Request};

use crate::error::Error;
use crate::kinds::ResourceKind;

/// Maximum request body size (10 MB, matching the API server's default)
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Default Accept when the caller sends none
pub const DEFAULT_ACCEPT: &str = "application/json";

/// Operation requested on a resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    /// List a collection
    List,
    /// List a collection as a `Table`
    ListAsTable,
    /// Read one object
    Get,
    /// Read one object as a `Table`
    GetAsTable,
    /// Create an object
    Create,
    /// Replace an object
    Update,
    /// Patch an object or subresource
    Patch,
    /// Delete one object
    Delete,
    /// Delete a collection
    DeleteCollection,
    /// Stream changes
    Watch,
    /// Read pod logs
    GetLogs,
    /// Exec into or attach to a pod
    Exec,
}

impl Verb {
    /// Kubernetes verb name
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::List => "list",
            Verb::ListAsTable => "listAsTable",
            Verb::Get => "get",
            Verb::GetAsTable => "getAsTable",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Patch => "patch",
            Verb::Delete => "delete",
            Verb::DeleteCollection => "deletecollection",
            Verb::Watch => "watch",
            Verb::GetLogs => "getLogs",
            Verb::Exec => "exec",
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Patch flavour, selected by the request `Content-Type`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchType {
    /// RFC 6902 JSON patch
    Json,
    /// RFC 7386 merge patch
    Merge,
    /// Kubernetes strategic merge patch
    StrategicMerge,
    /// Server-side apply
    Apply,
}

impl PatchType {
    /// Parse from a Content-Type header value
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let media_type = content_type.split(';').next()?.trim();
        match media_type {
            "application/json-patch+json" => Some(PatchType::Json),
            "application/merge-patch+json" => Some(PatchType::Merge),
            "application/strategic-merge-patch+json" => Some(PatchType::StrategicMerge),
            "application/apply-patch+yaml" | "application/apply-patch+cbor" => {
                Some(PatchType::Apply)
            }
            _ => None,
        }
    }

    /// Content-Type sent to the member cluster
    pub fn content_type(self) -> &'static str {
        match self {
            PatchType::Json => "application/json-patch+json",
            PatchType::Merge => "application/merge-patch+json",
            PatchType::StrategicMerge => "application/strategic-merge-patch+json",
            PatchType::Apply => "application/apply-patch+yaml",
        }
    }
}

/// Whether an Accept header negotiates the `Table` representation
pub fn accepts_table(accept: &str) -> bool {
    accept
        .split(',')
        .any(|media| media.split(';').any(|param| param.trim() == "as=Table"))
}

fn resolve_verb(
    method: &Method,
    info: &ResourceInfo,
    options: &RequestOptions,
    wants_table: bool,
) -> Result<Verb, Error> {
    let pod_subresource = match (info.group.as_str(), info.resource.as_str()) {
        ("", "pods") => info.subresource.as_deref(),
        _ => None,
    };

    if matches!(pod_subresource, Some("exec") | Some("attach")) {
        return Ok(Verb::Exec);
    }

    let verb = match *method {
        Method::GET | Method::HEAD => {
            if pod_subresource == Some("log") {
                Verb::GetLogs
            } else if info.legacy_watch || options.is_watch() {
                Verb::Watch
            } else {
                match (info.name.is_some(), wants_table) {
                    (true, true) => Verb::GetAsTable,
                    (true, false) => Verb::Get,
                    (false, true) => Verb::ListAsTable,
                    (false, false) => Verb::List,
                }
            }
        }
        Method::POST => Verb::Create,
        Method::PUT => Verb::Update,
        Method::PATCH => Verb::Patch,
        Method::DELETE if info.name.is_some() => Verb::Delete,
        Method::DELETE => Verb::DeleteCollection,
        ref other => return Err(Error::MethodNotAllowed(other.to_string())),
    };
    Ok(verb)
}

/// Immutable per-request value handed from the dispatcher to a backend
#[derive(Debug)]
pub struct RequestContext {
    /// Cluster id from the request path
    pub cluster_id: String,
    /// Kubernetes API path with the cluster prefix removed
    pub api_path: String,
    /// Resolved verb
    pub verb: Verb,
    /// Parsed resource coordinates
    pub info: ResourceInfo,
    /// Resource kind, if the gateway knows it
    pub kind: Option<ResourceKind>,
    /// Decoded query options
    pub options: RequestOptions,
    /// Negotiated Accept header
    pub accept: String,
    /// Accept asked for `as=Table`
    pub wants_table: bool,
    /// Patch flavour for PATCH requests
    pub patch_type: Option<PatchType>,
    parts: Parts,
    body: Body,
}

impl RequestContext {
    /// Build a context from a request addressed to `cluster_id`
    pub fn new(
        cluster_id: &str,
        api_path: &str,
        info: ResourceInfo,
        request: Request<Body>,
    ) -> Result<Self, Error> {
        let (parts, body) = request.into_parts();

        let options = RequestOptions::from_uri(&parts.uri)?;
        let accept = header_str(&parts, ACCEPT.as_str())
            .unwrap_or(DEFAULT_ACCEPT)
            .to_string();
        let wants_table = accepts_table(&accept);
        let patch_type = header_str(&parts, CONTENT_TYPE.as_str()).and_then(PatchType::from_content_type);
        let verb = resolve_verb(&parts.method, &info, &options, wants_table)?;
        let kind = ResourceKind::from_resource(&info.group, &info.version, &info.resource);

        Ok(Self {
            cluster_id: cluster_id.to_string(),
            api_path: api_path.to_string(),
            verb,
            info,
            kind,
            options,
            accept,
            wants_table,
            patch_type,
            parts,
            body,
        })
    }

    /// Object name; verbs that address one object require it
    pub fn name(&self) -> Result<&str, Error> {
        self.info
            .name
            .as_deref()
            .ok_or_else(|| Error::BadRequest(format!("{} requires a resource name", self.verb)))
    }

    /// Request headers
    pub fn headers(&self) -> &axum::http::HeaderMap {
        &self.parts.headers
    }

    /// Read the request body, up to `MAX_BODY_SIZE`. The body can be read once.
    pub async fn read_body(&mut self) -> Result<Bytes, Error> {
        let body = std::mem::replace(&mut self.body, Body::empty());
        axum::body::to_bytes(body, MAX_BODY_SIZE)
            .await
            .map_err(|e| Error::BadRequest(format!("failed to read request body: {}", e)))
    }

    /// Give the raw request back, e.g. to proxy it
    pub fn into_request(self) -> Request<Body> {
        Request::from_parts(self.parts, self.body)
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}
