//! Kubernetes request-info parsing
//!
//! Splits an API path into group, version, namespace, resource, name and
//! subresource following the API server's own conventions:
//!
//! ```text
//! /api/{version}/[watch/][namespaces/{ns}/]{resource}[/{name}[/{subresource}]]
//! /apis/{group}/{version}/[watch/][namespaces/{ns}/]{resource}[/{name}[/{subresource}]]
//! ```

/// Resource addressed by an API path
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceInfo {
    /// API group, empty for the core group
    pub group: String,
    /// API version, e.g. `v1`
    pub version: String,
    /// Plural resource name, e.g. `pods`
    pub resource: String,
    /// Namespace, if the path is namespaced
    pub namespace: Option<String>,
    /// Object name
    pub name: Option<String>,
    /// Subresource, e.g. `log`, `exec`, `status`
    pub subresource: Option<String>,
    /// Path used the deprecated `/watch/` prefix
    pub legacy_watch: bool,
}

impl ResourceInfo {
    /// Parse an API path. Returns None for non-resource paths such as
    /// `/version`, `/api`, `/apis/apps/v1` or `/openapi/v2`.
    pub fn parse(api_path: &str) -> Option<Self> {
        let segments: Vec<&str> = api_path.trim_matches('/').split('/').collect();

        let (group, version, mut rest) = match segments.as_slice() {
            ["api", version, rest @ ..] if !rest.is_empty() => ("", *version, rest),
            ["apis", group, version, rest @ ..] if !rest.is_empty() => (*group, *version, rest),
            _ => return None,
        };

        let mut info = ResourceInfo {
            group: group.to_string(),
            version: version.to_string(),
            ..Default::default()
        };

        if rest[0] == "watch" {
            info.legacy_watch = true;
            rest = &rest[1..];
            if rest.is_empty() {
                return None;
            }
        }

        // `namespaces/{ns}` alone addresses the namespace object itself
        if rest[0] == "namespaces" && rest.len() >= 2 {
            info.namespace = Some(rest[1].to_string());
            if rest.len() > 2 {
                rest = &rest[2..];
            }
        }

        if rest.iter().any(|s| s.is_empty()) {
            return None;
        }

        info.resource = rest[0].to_string();
        info.name = rest.get(1).map(|s| s.to_string());
        info.subresource = rest.get(2).map(|s| s.to_string());
        Some(info)
    }
}
