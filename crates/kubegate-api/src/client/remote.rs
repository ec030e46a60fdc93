//! reqwest-backed member client

use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::{AUTHORIZATION, HOST};
use axum::http::StatusCode;
use futures::{StreamExt, TryStreamExt};
use tracing::debug;
use zeroize::Zeroizing;

use kubegate_common::ClusterCredential;

use super::{MemberClient, MemberRequest, MemberResponse, StreamingResponse, UpgradeResponse};
use crate::error::{Error, Result};

/// Member client authenticating with a stored bearer token
pub struct ReqwestMemberClient {
    name: String,
    host: String,
    token: Zeroizing<String>,
    /// Buffered requests, bounded by the member timeout
    client: reqwest::Client,
    /// Streams and upgrades: HTTP/1.1 only, connect timeout only
    streaming: reqwest::Client,
}

impl ReqwestMemberClient {
    /// Build a client for one member. `name` labels errors and logs.
    pub fn new(name: &str, credential: &ClusterCredential, timeout: Duration) -> Result<Self> {
        let client = client_builder(credential)?
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let streaming = client_builder(credential)?
            .http1_only()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create streaming client: {}", e)))?;

        Ok(Self {
            name: name.to_string(),
            host: credential.host.clone(),
            token: credential.token.clone(),
            client,
            streaming,
        })
    }

    fn build_request(
        &self,
        client: &reqwest::Client,
        req: MemberRequest,
    ) -> Result<reqwest::Request> {
        let url = format!("{}{}", self.host, req.path_and_query);

        let mut headers = req.headers;
        headers.remove(AUTHORIZATION);
        headers.remove(HOST);

        let mut builder = client
            .request(req.method, &url)
            .headers(headers)
            .bearer_auth(self.token.as_str());

        if !req.body.is_empty() {
            builder = builder.body(req.body);
        }

        builder
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build request: {}", e)))
    }

    async fn execute(
        &self,
        client: &reqwest::Client,
        req: MemberRequest,
    ) -> Result<reqwest::Response> {
        let request = self.build_request(client, req)?;
        debug!(
            member = %self.name,
            method = %request.method(),
            url = %request.url(),
            "Sending request to member cluster"
        );

        client.execute(request).await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    member: self.name.clone(),
                }
            } else {
                Error::Proxy(format!("Failed to reach member {}: {}", self.name, e))
            }
        })
    }
}

fn client_builder(credential: &ClusterCredential) -> Result<reqwest::ClientBuilder> {
    let mut builder = reqwest::Client::builder().no_proxy();

    if let Some(pem) = &credential.ca_cert_pem {
        let cert = reqwest::Certificate::from_pem(pem)
            .map_err(|e| Error::Internal(format!("Invalid CA certificate: {}", e)))?;
        builder = builder.add_root_certificate(cert);
    }

    if credential.insecure_skip_tls_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder)
}

#[async_trait]
impl MemberClient for ReqwestMemberClient {
    async fn send(&self, req: MemberRequest) -> Result<MemberResponse> {
        let response = self.execute(&self.client, req).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    member: self.name.clone(),
                }
            } else {
                Error::Proxy(format!("Failed to read member response: {}", e))
            }
        })?;

        debug!(
            member = %self.name,
            status = status.as_u16(),
            body_len = body.len(),
            "Received response from member cluster"
        );

        Ok(MemberResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_streaming(&self, req: MemberRequest) -> Result<StreamingResponse> {
        let response = self.execute(&self.streaming, req).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let stream = response.bytes_stream().map_err(std::io::Error::other).boxed();

        Ok(StreamingResponse {
            status,
            headers,
            stream,
        })
    }

    async fn send_upgrade(&self, req: MemberRequest) -> Result<UpgradeResponse> {
        let response = self.execute(&self.streaming, req).await?;

        let status = response.status();
        let headers = response.headers().clone();

        if status != StatusCode::SWITCHING_PROTOCOLS {
            let body = response.bytes().await.unwrap_or_default();
            return Ok(UpgradeResponse {
                status,
                headers,
                io: None,
                body,
            });
        }

        let upgraded = response
            .upgrade()
            .await
            .map_err(|e| Error::Proxy(format!("Failed to upgrade member connection: {}", e)))?;

        Ok(UpgradeResponse {
            status,
            headers,
            io: Some(Box::new(upgraded)),
            body: Default::default(),
        })
    }
}
