//! HTTP client abstraction for member clusters
//!
//! Federation and the fallback proxy only talk to members through the
//! `MemberClient` trait, so tests can inject fakes without real clusters.
//!
//! # Security
//!
//! Implementations must never forward the caller's `Authorization` header.
//! They authenticate with the credential stored for the member instead.

mod remote;

pub use remote::ReqwestMemberClient;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};

/// Request to a member API server, addressed by path relative to its host
#[derive(Clone, Debug)]
pub struct MemberRequest {
    /// HTTP method
    pub method: Method,
    /// Path and query, e.g. `/api/v1/pods?labelSelector=app%3Dweb`
    pub path_and_query: String,
    /// Headers to send (authorization is always replaced)
    pub headers: HeaderMap,
    /// Request body
    pub body: Vec<u8>,
}

impl MemberRequest {
    /// Build a request without headers or body
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Adopt a request built by `kube::core::Request`
    pub fn from_http(request: axum::http::Request<Vec<u8>>) -> Self {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        Self {
            method: parts.method,
            path_and_query,
            headers: parts.headers,
            body,
        }
    }

    /// Set the Accept header
    pub fn with_accept(mut self, accept: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(accept) {
            self.headers.insert(ACCEPT, value);
        }
        self
    }

    /// Set the body and its Content-Type
    pub fn with_body(mut self, content_type: &'static str, body: Vec<u8>) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.body = body;
        self
    }
}

/// Buffered member response
#[derive(Clone, Debug)]
pub struct MemberResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl MemberResponse {
    /// Turn a non-2xx response into an API error
    pub fn into_result(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(Error::from_member_response(self.status, &self.body))
        }
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            Error::BadRequest(format!("failed to decode member response: {}", e))
        })
    }
}

/// Member response whose body is consumed incrementally (watch, log follow)
pub struct StreamingResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Body chunks
    pub stream: BoxStream<'static, std::result::Result<Bytes, std::io::Error>>,
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Raw byte stream of an upgraded connection
pub trait UpgradedIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> UpgradedIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Member answer to an HTTP upgrade request
pub struct UpgradeResponse {
    /// HTTP status, `101 Switching Protocols` on success
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Upgraded connection, present only on `101`
    pub io: Option<Box<dyn UpgradedIo>>,
    /// Response body when the upgrade was refused
    pub body: Bytes,
}

/// Trait for making HTTP requests to a member API server
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemberClient: Send + Sync {
    /// Make a buffered request
    async fn send(&self, req: MemberRequest) -> Result<MemberResponse>;

    /// Make a request whose response body is streamed
    async fn send_streaming(&self, req: MemberRequest) -> Result<StreamingResponse>;

    /// Make an HTTP/1.1 upgrade request (exec, attach, portforward)
    async fn send_upgrade(&self, req: MemberRequest) -> Result<UpgradeResponse>;
}
