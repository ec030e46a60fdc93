//! Transparent HTTP upgrade proxying
//!
//! The upgrade handshake is forwarded to the member and, on `101`, the two
//! upgraded connections are bridged byte for byte. Frames are never parsed,
//! so SPDY and WebSocket both work.

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use tracing::{debug, error, info};

use super::{request_headers, response_builder};
use crate::client::MemberRequest;
use crate::error::{Error, Result};
use crate::federation::Member;

pub(super) async fn proxy_upgrade(
    member: &Member,
    path_and_query: String,
    request: Request<Body>,
) -> Result<Response<Body>> {
    let method = request.method().clone();
    let headers = request_headers(request.headers(), true);

    // Takes ownership of the client connection once the 101 is sent
    let incoming_upgrade = hyper::upgrade::on(request);

    let response = member
        .client
        .send_upgrade(MemberRequest {
            method,
            path_and_query,
            headers,
            body: Vec::new(),
        })
        .await?;

    let Some(mut upstream) = response.io else {
        debug!(
            member = %member.id,
            status = response.status.as_u16(),
            "Member refused upgrade"
        );
        return response_builder(response.status, &response.headers)
            .body(Body::from(response.body))
            .map_err(|e| Error::Internal(format!("Failed to build response: {}", e)));
    };

    let mut builder = Response::builder().status(StatusCode::SWITCHING_PROTOCOLS);
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }

    let member_id = member.id.clone();
    tokio::spawn(async move {
        match incoming_upgrade.await {
            Ok(incoming_upgraded) => {
                let mut incoming = hyper_util::rt::TokioIo::new(incoming_upgraded);
                match tokio::io::copy_bidirectional(&mut incoming, &mut upstream).await {
                    Ok((from_client, from_member)) => {
                        info!(member = %member_id, from_client, from_member, "Upgraded session ended");
                    }
                    Err(e) => {
                        debug!(member = %member_id, error = %e, "Upgraded session bridge error");
                    }
                }
            }
            Err(e) => {
                error!(member = %member_id, error = %e, "Failed to upgrade incoming connection");
            }
        }
    });

    builder
        .body(Body::empty())
        .map_err(|e| Error::Internal(format!("Failed to build upgrade response: {}", e)))
}
