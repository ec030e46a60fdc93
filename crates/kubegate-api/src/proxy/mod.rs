//! Transparent reverse proxy to a single member cluster
//!
//! Used for every request the gateway does not serve natively: unknown
//! kinds, unsupported verbs, non-resource paths, and the streaming pod
//! subresources (logs, exec, attach, portforward) once the owning member is
//! known.
//!
//! # Security
//!
//! The caller's `Authorization` header and any user-supplied impersonation
//! headers are stripped before the request leaves the gateway. The member
//! client then authenticates with the gateway's stored token.

mod upgrade;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::{Request, Response};
use tracing::debug;

use crate::client::{MemberRequest, MemberResponse, StreamingResponse};
use crate::error::{Error, Result};
use crate::federation::Member;
use crate::request::MAX_BODY_SIZE;
use crate::routing::upstream_uri;

/// Header set by SPDY stream clients (kubectl exec/attach/port-forward)
const STREAM_PROTOCOL_HEADER: &str = "x-stream-protocol-version";

/// Connection-scoped headers that never cross the proxy
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Forward a request to `member` and relay its response unchanged.
///
/// Member error responses are passed through as-is so clients see exactly
/// what the member said.
pub async fn forward(member: &Member, api_path: &str, request: Request<Body>) -> Result<Response<Body>> {
    let request = strip_caller_credentials(request);
    let path_and_query = upstream_uri(api_path, request.uri());

    if is_upgrade_request(request.headers()) {
        debug!(member = %member.id, path = %path_and_query, "Proxying upgrade request");
        return upgrade::proxy_upgrade(member, path_and_query, request).await;
    }

    let streaming = request.uri().query().is_some_and(is_streaming_query);
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_BODY_SIZE)
        .await
        .map_err(|e| Error::BadRequest(format!("Failed to read request body: {}", e)))?;

    let member_request = MemberRequest {
        method: parts.method,
        path_and_query,
        headers: request_headers(&parts.headers, false),
        body: body.to_vec(),
    };

    debug!(
        member = %member.id,
        method = %member_request.method,
        path = %member_request.path_and_query,
        streaming,
        "Proxying to member cluster"
    );

    if streaming {
        let response = member.client.send_streaming(member_request).await?;
        build_streaming_response(response)
    } else {
        let response = member.client.send(member_request).await?;
        build_buffered_response(response)
    }
}

/// Strip the caller's credentials and impersonation headers
pub fn strip_caller_credentials(request: Request<Body>) -> Request<Body> {
    let (mut parts, body) = request.into_parts();

    parts.headers.remove(header::AUTHORIZATION);

    let impersonation: Vec<_> = parts
        .headers
        .keys()
        .filter(|k| k.as_str().starts_with("impersonate-"))
        .cloned()
        .collect();
    for key in impersonation {
        parts.headers.remove(&key);
    }

    Request::from_parts(parts, body)
}

/// Whether the request asks for a protocol upgrade (SPDY or WebSocket)
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    if headers.contains_key(STREAM_PROTOCOL_HEADER) {
        return true;
    }

    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    connection_upgrade && headers.contains_key(header::UPGRADE)
}

/// Whether the query asks for a long-lived response (watch or log follow)
pub fn is_streaming_query(query: &str) -> bool {
    form_urlencoded::parse(query.as_bytes()).any(|(key, value)| {
        matches!(key.as_ref(), "watch" | "follow") && matches!(value.as_ref(), "true" | "1")
    })
}

/// Headers forwarded to the member. Upgrade requests keep `Connection` and
/// `Upgrade` so the member can switch protocols.
fn request_headers(headers: &HeaderMap, keep_upgrade: bool) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let upgrade_header = *name == header::CONNECTION || *name == header::UPGRADE;
        let dropped = *name == header::HOST
            || *name == header::CONTENT_LENGTH
            || *name == header::AUTHORIZATION
            || (is_hop_by_hop(name) && !(keep_upgrade && upgrade_header));
        if !dropped {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

fn response_builder(status: axum::http::StatusCode, headers: &HeaderMap) -> axum::http::response::Builder {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        if *name == header::CONTENT_LENGTH || is_hop_by_hop(name) {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder
}

fn build_buffered_response(response: MemberResponse) -> Result<Response<Body>> {
    debug!(
        status = response.status.as_u16(),
        body_len = response.body.len(),
        "Relaying member response"
    );

    response_builder(response.status, &response.headers)
        .body(Body::from(response.body))
        .map_err(|e| Error::Internal(format!("Failed to build response: {}", e)))
}

fn build_streaming_response(response: StreamingResponse) -> Result<Response<Body>> {
    debug!(status = response.status.as_u16(), "Relaying streaming member response");

    response_builder(response.status, &response.headers)
        .body(Body::from_stream(response.stream))
        .map_err(|e| Error::Internal(format!("Failed to build streaming response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Bytes;
    use axum::http::{HeaderValue, Method, StatusCode};

    use crate::client::{MockMemberClient, UpgradeResponse};

    fn make_request_with_headers(uri: &str, headers: Vec<(&str, &str)>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_strip_caller_credentials() {
        let request = make_request_with_headers(
            "/x",
            vec![
                ("Authorization", "Bearer caller"),
                ("Impersonate-User", "admin"),
                ("Impersonate-Extra-scopes", "all"),
                ("Accept", "application/json"),
            ],
        );

        let stripped = strip_caller_credentials(request);

        assert!(stripped.headers().get("Authorization").is_none());
        assert!(stripped.headers().get("Impersonate-User").is_none());
        assert!(stripped.headers().get("Impersonate-Extra-scopes").is_none());
        assert!(stripped.headers().get("Accept").is_some());
    }

    #[test]
    fn test_is_upgrade_request() {
        let spdy = make_request_with_headers(
            "/x",
            vec![("Connection", "Upgrade"), ("Upgrade", "SPDY/3.1")],
        );
        assert!(is_upgrade_request(spdy.headers()));

        let ws = make_request_with_headers(
            "/x",
            vec![("Connection", "keep-alive, Upgrade"), ("Upgrade", "websocket")],
        );
        assert!(is_upgrade_request(ws.headers()));

        let stream = make_request_with_headers(
            "/x",
            vec![("X-Stream-Protocol-Version", "v4.channel.k8s.io")],
        );
        assert!(is_upgrade_request(stream.headers()));

        let plain = make_request_with_headers("/x", vec![("Connection", "keep-alive")]);
        assert!(!is_upgrade_request(plain.headers()));
    }

    #[test]
    fn test_is_streaming_query() {
        assert!(is_streaming_query("watch=true"));
        assert!(is_streaming_query("labelSelector=a&watch=1"));
        assert!(is_streaming_query("follow=true&container=app"));
        assert!(!is_streaming_query("watch=false"));
        assert!(!is_streaming_query("limit=10"));
        assert!(!is_streaming_query("labelSelector=watch%3Dtrue"));
    }

    #[test]
    fn test_request_headers_drop_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("SPDY/3.1"));
        headers.insert(header::HOST, HeaderValue::from_static("gateway"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let plain = request_headers(&headers, false);
        assert!(plain.get(header::CONNECTION).is_none());
        assert!(plain.get(header::UPGRADE).is_none());
        assert!(plain.get(header::HOST).is_none());
        assert!(plain.get(header::ACCEPT).is_some());

        let upgrade = request_headers(&headers, true);
        assert!(upgrade.get(header::CONNECTION).is_some());
        assert!(upgrade.get(header::UPGRADE).is_some());
    }

    #[tokio::test]
    async fn test_forward_relays_member_error_unchanged() {
        let mut client = MockMemberClient::new();
        client
            .expect_send()
            .withf(|req| {
                req.method == Method::GET
                    && req.path_and_query == "/api/v1/nodes?limit=1"
                    && req.headers.get(header::AUTHORIZATION).is_none()
            })
            .returning(|_| {
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Ok(MemberResponse {
                    status: StatusCode::FORBIDDEN,
                    headers,
                    body: Bytes::from_static(b"{\"kind\":\"Status\",\"code\":403}"),
                })
            });

        let member = Member::new("eu", Arc::new(client));
        let request = make_request_with_headers(
            "/clusters/c/api/v1/nodes?limit=1",
            vec![("Authorization", "Bearer caller")],
        );

        let response = forward(&member, "/api/v1/nodes", request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"{\"kind\":\"Status\",\"code\":403}");
    }

    #[tokio::test]
    async fn test_forward_watch_streams() {
        let mut client = MockMemberClient::new();
        client.expect_send().never();
        client.expect_send_streaming().returning(|_| {
            let chunks: Vec<std::result::Result<Bytes, std::io::Error>> =
                vec![Ok(Bytes::from_static(b"{\"type\":\"ADDED\"}\n"))];
            Ok(StreamingResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                stream: Box::pin(futures::stream::iter(chunks)),
            })
        });

        let member = Member::new("eu", Arc::new(client));
        let request = make_request_with_headers("/clusters/c/api/v1/nodes?watch=true", vec![]);

        let response = forward(&member, "/api/v1/nodes", request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"{\"type\":\"ADDED\"}\n");
    }

    fn exec_request() -> Request<Body> {
        make_request_with_headers(
            "/clusters/c/api/v1/namespaces/d/pods/p/exec?command=sh&stdin=true",
            vec![
                ("Authorization", "Bearer caller"),
                ("Connection", "Upgrade"),
                ("Upgrade", "SPDY/3.1"),
                ("X-Stream-Protocol-Version", "v4.channel.k8s.io"),
            ],
        )
    }

    fn keeps_upgrade_headers(req: &MemberRequest) -> bool {
        req.path_and_query == "/api/v1/namespaces/d/pods/p/exec?command=sh&stdin=true"
            && req.headers.get(header::AUTHORIZATION).is_none()
            && req.headers.get(header::CONNECTION).is_some_and(|v| v == "Upgrade")
            && req.headers.get(header::UPGRADE).is_some_and(|v| v == "SPDY/3.1")
            && req.headers.contains_key(STREAM_PROTOCOL_HEADER)
    }

    #[tokio::test]
    async fn test_refused_upgrade_relayed_unchanged() {
        const REFUSAL: &[u8] = b"{\"kind\":\"Status\",\"code\":403,\"reason\":\"Forbidden\"}";

        let mut client = MockMemberClient::new();
        client.expect_send().never();
        client
            .expect_send_upgrade()
            .withf(keeps_upgrade_headers)
            .times(1)
            .returning(|_| {
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Ok(UpgradeResponse {
                    status: StatusCode::FORBIDDEN,
                    headers,
                    io: None,
                    body: Bytes::from_static(REFUSAL),
                })
            });

        let member = Member::new("eu", Arc::new(client));
        let response = forward(&member, "/api/v1/namespaces/d/pods/p/exec", exec_request())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], REFUSAL);
    }

    #[tokio::test]
    async fn test_accepted_upgrade_switches_protocols() {
        let mut client = MockMemberClient::new();
        client
            .expect_send_upgrade()
            .withf(keeps_upgrade_headers)
            .times(1)
            .returning(|_| {
                let (upstream, _member_side) = tokio::io::duplex(64);
                let mut headers = HeaderMap::new();
                headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
                headers.insert(header::UPGRADE, HeaderValue::from_static("SPDY/3.1"));
                headers.insert(STREAM_PROTOCOL_HEADER, HeaderValue::from_static("v4.channel.k8s.io"));
                Ok(UpgradeResponse {
                    status: StatusCode::SWITCHING_PROTOCOLS,
                    headers,
                    io: Some(Box::new(upstream)),
                    body: Bytes::new(),
                })
            });

        let member = Member::new("eu", Arc::new(client));
        let response = forward(&member, "/api/v1/namespaces/d/pods/p/exec", exec_request())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(response.headers().get(header::UPGRADE).unwrap(), "SPDY/3.1");
        assert_eq!(
            response.headers().get(STREAM_PROTOCOL_HEADER).unwrap(),
            "v4.channel.k8s.io"
        );
    }
}
