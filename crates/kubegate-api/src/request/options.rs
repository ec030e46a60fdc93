//! Query-string options understood by the gateway

use std::time::Duration;

use axum::extract::Query;
use axum::http::Uri;
use kube::core::params::{ListParams, PostParams};
use serde::Deserialize;

use crate::error::Error;

/// Decoded list/watch/write options
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Label selector
    pub label_selector: Option<String>,
    /// Field selector
    pub field_selector: Option<String>,
    /// Page size
    pub limit: Option<u32>,
    /// Continuation token from a previous page
    #[serde(rename = "continue")]
    pub continue_token: Option<String>,
    /// Resource version to list or watch from
    pub resource_version: Option<String>,
    /// Server-side timeout; also bounds each member call
    pub timeout_seconds: Option<u32>,
    /// `true` or `1` turns a list into a watch
    pub watch: Option<String>,
    /// Request bookmark events on watches
    pub allow_watch_bookmarks: Option<String>,
    /// Field manager for writes
    pub field_manager: Option<String>,
    /// `All` for a dry run
    pub dry_run: Option<String>,
    /// Force apply-patch conflicts
    pub force: Option<String>,
}

fn truthy(value: Option<&str>) -> bool {
    matches!(value, Some("true") | Some("1"))
}

impl RequestOptions {
    /// Decode options from a request URI; malformed values are a bad request
    pub fn from_uri(uri: &Uri) -> Result<Self, Error> {
        if uri.query().is_none() {
            return Ok(Self::default());
        }
        Query::<RequestOptions>::try_from_uri(uri)
            .map(|Query(options)| options)
            .map_err(|e| Error::BadRequest(format!("invalid query parameters: {}", e)))
    }

    /// Whether `watch=true` was requested
    pub fn is_watch(&self) -> bool {
        truthy(self.watch.as_deref())
    }

    /// Whether bookmark events were requested
    pub fn bookmarks(&self) -> bool {
        truthy(self.allow_watch_bookmarks.as_deref())
    }

    /// Whether this is a dry run
    pub fn is_dry_run(&self) -> bool {
        self.dry_run.as_deref() == Some("All")
    }

    /// Per-member deadline derived from `timeoutSeconds`
    pub fn member_timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .filter(|t| *t > 0)
            .map(|t| Duration::from_secs(u64::from(t)))
    }

    /// Member list parameters. Paging is done by the gateway over the merged
    /// result, so `limit` and `continue` are never forwarded.
    pub fn member_list_params(&self) -> ListParams {
        ListParams {
            label_selector: self.label_selector.clone(),
            field_selector: self.field_selector.clone(),
            timeout: self.timeout_seconds,
            ..Default::default()
        }
    }

    /// Query string for a member watch.
    ///
    /// A watch on a named object narrows the field selector to that name.
    /// `timeoutSeconds` is only sent when the caller set it, so members apply
    /// their own request timeout otherwise.
    pub fn member_watch_query(&self, name: Option<&str>) -> String {
        let field_selector = match (self.field_selector.as_deref(), name) {
            (Some(fields), Some(name)) if !fields.is_empty() => {
                Some(format!("{},metadata.name={}", fields, name))
            }
            (_, Some(name)) => Some(format!("metadata.name={}", name)),
            (fields, None) => fields.filter(|f| !f.is_empty()).map(String::from),
        };

        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("watch", "true");
        query.append_pair(
            "resourceVersion",
            self.resource_version.as_deref().unwrap_or("0"),
        );
        if let Some(labels) = self.label_selector.as_deref().filter(|l| !l.is_empty()) {
            query.append_pair("labelSelector", labels);
        }
        if let Some(fields) = &field_selector {
            query.append_pair("fieldSelector", fields);
        }
        if let Some(timeout) = self.timeout_seconds {
            query.append_pair("timeoutSeconds", &timeout.to_string());
        }
        if self.bookmarks() {
            query.append_pair("allowWatchBookmarks", "true");
        }
        query.finish()
    }

    /// Parameters for create and replace
    pub fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: self.is_dry_run(),
            field_manager: self.field_manager.clone(),
        }
    }

    /// Query string for patch and delete requests
    pub fn write_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if self.is_dry_run() {
            query.append_pair("dryRun", "All");
        }
        if let Some(manager) = &self.field_manager {
            query.append_pair("fieldManager", manager);
        }
        if truthy(self.force.as_deref()) {
            query.append_pair("force", "true");
        }
        query.finish()
    }
}
