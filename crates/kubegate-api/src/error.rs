//! Error types for the gateway
//!
//! The `IntoResponse` impl is the only place errors become client-visible:
//! every variant renders as a Kubernetes `Status`. Typed errors keep their
//! code and reason; anything else becomes `400 Bad Request`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::status::{reason_for_code, Status};

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A member cluster (or the gateway itself) returned a Kubernetes API error
    #[error("{}", .0.message.as_deref().unwrap_or("api error"))]
    Api(Box<Status>),

    /// Cluster id not present in the registry
    #[error("clusters \"{0}\" not found")]
    ClusterNotFound(String),

    /// HTTP method not valid for the requested path
    #[error("the server does not allow method {0} on the requested resource")]
    MethodNotAllowed(String),

    /// A member did not answer within the caller's timeout
    #[error("request to member cluster {member} timed out")]
    Timeout {
        /// Member cluster id
        member: String,
    },

    /// Malformed body, options or path
    #[error("{0}")]
    BadRequest(String),

    /// Transport failure talking to a member cluster
    #[error("proxy error: {0}")]
    Proxy(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// NotFound API error for an object
    pub fn not_found(resource: &str, name: &str) -> Self {
        Error::Api(Box::new(
            Status::failure(
                StatusCode::NOT_FOUND,
                "NotFound",
                format!("{} \"{}\" not found", resource, name),
            )
            .with_details(resource, name),
        ))
    }

    /// Interpret a non-success member response as an API error.
    ///
    /// Members normally answer with a `Status` body; anything else is wrapped
    /// in a synthetic `Status` carrying the member's HTTP code.
    pub fn from_member_response(status: StatusCode, body: &[u8]) -> Self {
        if let Ok(mut parsed) = serde_json::from_slice::<Status>(body) {
            if parsed.kind == "Status" {
                if parsed.code.is_none() {
                    parsed.code = Some(status.as_u16());
                }
                return Error::Api(Box::new(parsed));
            }
        }

        let message = String::from_utf8_lossy(body).trim().to_string();
        let message = if message.is_empty() {
            format!("member cluster returned {}", status)
        } else {
            message
        };
        Error::Api(Box::new(Status::failure(
            status,
            reason_for_code(status),
            message,
        )))
    }

    /// Whether this error is a NotFound API error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api(status) if status.code == Some(StatusCode::NOT_FOUND.as_u16()))
    }

    /// Render as a Kubernetes Status
    pub fn to_status(&self) -> Status {
        match self {
            Error::Api(status) => {
                let mut status = (**status).clone();
                status.api_version = "v1".to_string();
                status.kind = "Status".to_string();
                status
            }
            Error::ClusterNotFound(name) => {
                Status::failure(StatusCode::NOT_FOUND, "NotFound", self.to_string())
                    .with_details("clusters", name)
            }
            Error::MethodNotAllowed(_) => Status::failure(
                StatusCode::METHOD_NOT_ALLOWED,
                "MethodNotAllowed",
                self.to_string(),
            ),
            Error::Timeout { .. } => {
                Status::failure(StatusCode::GATEWAY_TIMEOUT, "Timeout", self.to_string())
            }
            Error::BadRequest(_) | Error::Proxy(_) | Error::Internal(_) => {
                Status::failure(StatusCode::BAD_REQUEST, "BadRequest", self.to_string())
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_status();
        let code = status.http_status();

        debug!(code = code.as_u16(), error = %self, "Returning error status");

        (code, axum::Json(status)).into_response()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::BadRequest(format!("failed to decode object: {}", e))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Proxy(e.to_string())
    }
}

impl From<kube::core::request::Error> for Error {
    fn from(e: kube::core::request::Error) -> Self {
        Error::BadRequest(e.to_string())
    }
}

impl From<axum::http::Error> for Error {
    fn from(e: axum::http::Error) -> Self {
        Error::Internal(format!("failed to build request: {}", e))
    }
}
