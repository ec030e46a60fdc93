//! Path utilities for cluster-addressed requests
//!
//! Callers address a cluster id with a `/clusters/{id}` prefix; everything
//! after the prefix is a native Kubernetes API path.

use axum::http::Uri;

/// Prefix every cluster-addressed path starts with
pub const CLUSTER_PATH_PREFIX: &str = "/clusters/";

/// Strip `/clusters/{cluster_id}` from a path to get the Kubernetes API path.
///
/// # Examples
///
/// ```
/// use kubegate_api::routing::strip_cluster_prefix;
///
/// assert_eq!(
///     strip_cluster_prefix("/clusters/prod/api/v1/pods", "prod"),
///     "/api/v1/pods"
/// );
/// assert_eq!(strip_cluster_prefix("/clusters/prod", "prod"), "/");
/// ```
pub fn strip_cluster_prefix<'a>(full_path: &'a str, cluster_id: &str) -> &'a str {
    let rest = full_path
        .strip_prefix(CLUSTER_PATH_PREFIX)
        .and_then(|p| p.strip_prefix(cluster_id));

    match rest {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => full_path,
    }
}

/// Rebuild the upstream request target: the API path plus the original query
pub fn upstream_uri(api_path: &str, uri: &Uri) -> String {
    match uri.query() {
        Some(q) if !q.is_empty() => format!("{}?{}", api_path, q),
        _ => api_path.to_string(),
    }
}
