//! Common types for kubegate: configuration, credentials, telemetry and errors

#![deny(missing_docs)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod telemetry;

pub use config::{ClusterKind, ClusterResource, GatewayConfig, TlsConfig};
pub use credentials::{ClusterCredential, CredentialResolver, StaticCredentialStore};
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default port for the gateway HTTPS listener
pub const DEFAULT_GATEWAY_PORT: u16 = 6443;

/// Default timeout for buffered requests to a member cluster, in seconds
pub const DEFAULT_MEMBER_TIMEOUT_SECS: u64 = 30;

/// Annotation stamped on every object served from a federated cluster,
/// naming the member cluster the object was read from
pub const CLUSTER_ID_ANNOTATION: &str = "kubegate.io/cluster-id";
