//! kubegate API gateway
//!
//! Presents isolated, shared and federated Kubernetes clusters behind a single
//! Kubernetes-API-compatible endpoint.
//!
//! # Architecture
//!
//! ```text
//! kubectl ──► Dispatcher ──► ClusterBackend ──► Handler ──► Federation ──► members
//!                 │               (isolated/shared)                 │
//!                 └──────────────► proxy::forward ◄─────────────────┘
//!                                (fallback, exec, logs)
//! ```
//!
//! # Endpoints
//!
//! - `* /clusters/{id}/api/*` - Kubernetes core API of a cluster id
//! - `* /clusters/{id}/apis/*` - Kubernetes API groups of a cluster id
//! - `GET /healthz` - Health check

#![deny(missing_docs)]

pub mod backend;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod federation;
pub mod handlers;
pub mod kinds;
pub mod pagination;
pub mod proxy;
pub mod registry;
pub mod render;
pub mod request;
pub mod routing;
pub mod server;
pub mod status;
pub mod table;

pub use backend::{ClusterBackend, FederatedBackend, ProxyBackend};
pub use client::{MemberClient, ReqwestMemberClient};
pub use error::{Error, Result};
pub use federation::{Federation, Member};
pub use kinds::ResourceKind;
pub use registry::{ClusterEntry, Registry};
pub use request::{RequestContext, Verb};
pub use server::{router, start_server, AppState, ServerConfig};
pub use status::Status;
