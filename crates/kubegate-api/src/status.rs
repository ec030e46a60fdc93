//! Kubernetes `Status` wire type
//!
//! Every error the gateway returns uses this shape so kubectl and client
//! libraries render it exactly like a native API server error.

use axum::http::StatusCode;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ListMeta, StatusDetails};
use serde::{Deserialize, Serialize};

/// `meta.k8s.io/v1` Status object
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Always `v1`
    #[serde(default)]
    pub api_version: String,
    /// Always `Status`
    #[serde(default)]
    pub kind: String,
    /// Empty list metadata
    #[serde(default)]
    pub metadata: ListMeta,
    /// `Success` or `Failure`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Machine-readable reason, e.g. `NotFound`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Extended data about the failing object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<StatusDetails>,
    /// HTTP status code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl Status {
    /// Build a failure status with the given code, reason and message
    pub fn failure(code: StatusCode, reason: &str, message: impl Into<String>) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Status".to_string(),
            metadata: ListMeta::default(),
            status: Some("Failure".to_string()),
            message: Some(message.into()),
            reason: Some(reason.to_string()),
            details: None,
            code: Some(code.as_u16()),
        }
    }

    /// Attach the failing object's name and kind
    pub fn with_details(mut self, kind: &str, name: &str) -> Self {
        self.details = Some(StatusDetails {
            kind: Some(kind.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        });
        self
    }

    /// HTTP status for this object, falling back to 500 if the code is missing or invalid
    pub fn http_status(&self) -> StatusCode {
        self.code
            .and_then(|c| StatusCode::from_u16(c).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Kubernetes `StatusReason` for an HTTP status code
pub fn reason_for_code(code: StatusCode) -> &'static str {
    match code {
        StatusCode::BAD_REQUEST => "BadRequest",
        StatusCode::UNAUTHORIZED => "Unauthorized",
        StatusCode::FORBIDDEN => "Forbidden",
        StatusCode::NOT_FOUND => "NotFound",
        StatusCode::METHOD_NOT_ALLOWED => "MethodNotAllowed",
        StatusCode::NOT_ACCEPTABLE => "NotAcceptable",
        StatusCode::CONFLICT => "AlreadyExists",
        StatusCode::GONE => "Expired",
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "UnsupportedMediaType",
        StatusCode::UNPROCESSABLE_ENTITY => "Invalid",
        StatusCode::TOO_MANY_REQUESTS => "TooManyRequests",
        StatusCode::SERVICE_UNAVAILABLE => "ServiceUnavailable",
        StatusCode::GATEWAY_TIMEOUT => "Timeout",
        _ => "InternalError",
    }
}
