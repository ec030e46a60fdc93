//! Federated aggregator
//!
//! A federated cluster id is backed by several member clusters. Reads fan
//! out to every member and are merged; writes go to the master only, so
//! members never diverge through the gateway.
//!
//! # Failure policy
//!
//! Fan-out is fail-fast: one failing or timed-out member aborts the whole
//! list, get or table call. A partial result would silently hide a cluster's
//! workloads from the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use futures::future::try_join_all;
use futures::{StreamExt, TryStreamExt};
use kube::core::params::GetParams;
use serde_json::Value;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::client::{MemberClient, MemberRequest};
use crate::error::{Error, Result};
use crate::kinds::{tag_object, tag_value, KindObject, ResourceList};
use crate::pagination::paginate;
use crate::render::{WatchEvent, WatchStream};
use crate::request::{PatchType, RequestOptions};
use crate::table::{merge_tables, Table};

/// Longest watch event line accepted from a member (matches the API server's
/// request size limit)
const MAX_WATCH_LINE: usize = 10 * 1024 * 1024;

/// One member cluster and the client used to reach it
#[derive(Clone)]
pub struct Member {
    /// Member cluster id
    pub id: String,
    /// Authenticated client for the member's API server
    pub client: Arc<dyn MemberClient>,
}

impl Member {
    /// Pair a member id with its client
    pub fn new(id: impl Into<String>, client: Arc<dyn MemberClient>) -> Self {
        Self {
            id: id.into(),
            client,
        }
    }
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member").field("id", &self.id).finish()
    }
}

/// Members of one federated cluster id
#[derive(Clone, Debug)]
pub struct Federation {
    members: Vec<Member>,
    master: usize,
}

impl Federation {
    /// Build a federation. `master_id` must name one of `members`.
    pub fn new(members: Vec<Member>, master_id: &str) -> Result<Self> {
        let master = members
            .iter()
            .position(|m| m.id == master_id)
            .ok_or_else(|| {
                Error::Internal(format!("master {} is not a federation member", master_id))
            })?;
        Ok(Self { members, master })
    }

    /// Members in read order
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Member receiving all writes
    pub fn master(&self) -> &Member {
        &self.members[self.master]
    }

    /// List from every member and concatenate, then page the merged items.
    pub async fn list<K: KindObject>(
        &self,
        namespace: Option<&str>,
        options: &RequestOptions,
    ) -> Result<ResourceList<K>> {
        let request = kube::core::Request::new(K::url_path(&(), namespace))
            .list(&options.member_list_params())?;
        let request = MemberRequest::from_http(request);
        let deadline = options.member_timeout();

        let lists = try_join_all(self.members.iter().map(|member| {
            let request = request.clone();
            bounded(member, deadline, async move {
                let list: ResourceList<K> =
                    member.client.send(request).await?.into_result()?.json()?;
                Ok::<_, Error>((member, list))
            })
        }))
        .await?;

        let mut merged = ResourceList::<K>::empty();
        let mut items = Vec::new();
        for (member, list) in lists {
            debug!(member = %member.id, count = list.items.len(), "Member list");
            items.extend(list.items.into_iter().map(|mut item| {
                tag_object(&mut item, &member.id);
                item
            }));
        }

        let page = paginate(
            items,
            options.limit,
            options.continue_token.as_deref(),
        );
        merged.items = page.items;
        if !page.continue_token.is_empty() {
            merged.metadata.continue_ = Some(page.continue_token);
        }
        merged.metadata.remaining_item_count = page.remaining;
        Ok(merged)
    }

    /// Table from every member with the caller's Accept, merged and paged.
    pub async fn list_table<K: KindObject>(
        &self,
        namespace: Option<&str>,
        options: &RequestOptions,
        accept: &str,
    ) -> Result<Table> {
        let request = kube::core::Request::new(K::url_path(&(), namespace))
            .list(&options.member_list_params())?;
        let request = MemberRequest::from_http(request).with_accept(accept);
        let deadline = options.member_timeout();

        let tables = try_join_all(self.members.iter().map(|member| {
            let request = request.clone();
            bounded(member, deadline, async move {
                let table: Table = member.client.send(request).await?.into_result()?.json()?;
                Ok::<_, Error>((member.id.clone(), table))
            })
        }))
        .await?;

        let mut merged = merge_tables(tables);
        let page = paginate(
            std::mem::take(&mut merged.rows),
            options.limit,
            options.continue_token.as_deref(),
        );
        merged.rows = page.items;
        if !page.continue_token.is_empty() {
            merged.metadata.continue_ = Some(page.continue_token);
        }
        merged.metadata.remaining_item_count = page.remaining;
        Ok(merged)
    }

    /// First member holding the object, with the object
    pub async fn locate<K: KindObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
        options: &RequestOptions,
    ) -> Result<(&Member, K)> {
        let request = kube::core::Request::new(K::url_path(&(), namespace))
            .get(name, &GetParams::default())?;
        let request = MemberRequest::from_http(request);

        let (member, response) = self.probe(request, options).await?.ok_or_else(|| {
            Error::not_found(&K::plural(&()), name)
        })?;
        let mut object: K = response.json()?;
        tag_object(&mut object, &member.id);
        Ok((member, object))
    }

    /// Get from the first member holding the object
    pub async fn get<K: KindObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
        options: &RequestOptions,
    ) -> Result<K> {
        self.locate(namespace, name, options)
            .await
            .map(|(_, object)| object)
    }

    /// Table for one object from the first member holding it
    pub async fn get_table<K: KindObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
        options: &RequestOptions,
        accept: &str,
    ) -> Result<Table> {
        let request = kube::core::Request::new(K::url_path(&(), namespace))
            .get(name, &GetParams::default())?;
        let request = MemberRequest::from_http(request).with_accept(accept);

        let (member, response) = self.probe(request, options).await?.ok_or_else(|| {
            Error::not_found(&K::plural(&()), name)
        })?;
        let table: Table = response.json()?;
        Ok(merge_tables(vec![(member.id.clone(), table)]))
    }

    /// Watch the first member that accepts the watch.
    ///
    /// Only that member's events are delivered, in its own order. A `name`
    /// restricts the watch to that object.
    pub async fn watch<K: KindObject>(
        &self,
        namespace: Option<&str>,
        name: Option<&str>,
        options: &RequestOptions,
    ) -> Result<WatchStream> {
        let request = MemberRequest::new(
            Method::GET,
            format!(
                "{}?{}",
                K::url_path(&(), namespace),
                options.member_watch_query(name)
            ),
        );

        let mut last_error = None;
        for member in &self.members {
            match self.watch_member(member, request.clone()).await {
                Ok(stream) => {
                    info!(member = %member.id, "Watching member cluster");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(member = %member.id, error = %e, "Watch handshake failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Internal("federation has no members".into())))
    }

    async fn watch_member(&self, member: &Member, request: MemberRequest) -> Result<WatchStream> {
        let response = member.client.send_streaming(request).await?;

        if !response.status.is_success() {
            let body = response
                .stream
                .try_fold(Vec::new(), |mut acc, chunk| async move {
                    acc.extend_from_slice(&chunk);
                    Ok(acc)
                })
                .await
                .unwrap_or_default();
            return Err(Error::from_member_response(response.status, &body));
        }

        let member_id = member.id.clone();
        let lines = FramedRead::new(
            StreamReader::new(response.stream),
            LinesCodec::new_with_max_length(MAX_WATCH_LINE),
        );

        let events = lines
            .try_filter(|line| futures::future::ready(!line.trim().is_empty()))
            .map(move |line| -> Result<WatchEvent<Value>> {
                let line = line.map_err(|e| Error::Proxy(format!("watch stream error: {}", e)))?;
                let mut event: WatchEvent<Value> = serde_json::from_str(&line)?;
                if event.event_type != "ERROR" {
                    tag_value(&mut event.object, &member_id);
                }
                Ok(event)
            })
            .boxed();

        Ok(events)
    }

    /// Create on the master
    pub async fn create<K: KindObject>(
        &self,
        namespace: Option<&str>,
        object: &K,
        options: &RequestOptions,
    ) -> Result<K> {
        let request = kube::core::Request::new(K::url_path(&(), namespace))
            .create(&options.post_params(), serde_json::to_vec(object)?)?;
        self.write(MemberRequest::from_http(request), options).await?.json()
    }

    /// Replace on the master
    pub async fn update<K: KindObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
        object: &K,
        options: &RequestOptions,
    ) -> Result<K> {
        let request = kube::core::Request::new(K::url_path(&(), namespace))
            .replace(name, &options.post_params(), serde_json::to_vec(object)?)?;
        self.write(MemberRequest::from_http(request), options).await?.json()
    }

    /// Patch an object or subresource on the master. The body is passed
    /// through untouched.
    pub async fn patch<K: KindObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
        subresource: Option<&str>,
        patch_type: PatchType,
        body: Vec<u8>,
        options: &RequestOptions,
    ) -> Result<Value> {
        let path = object_path::<K>(namespace, name, subresource);
        let request = MemberRequest::new(Method::PATCH, with_query(path, &options.write_query()))
            .with_body(patch_type.content_type(), body);
        self.write(request, options).await?.json()
    }

    /// Delete on the master. Returns the deleted object or a `Status`.
    pub async fn delete<K: KindObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
        body: Vec<u8>,
        options: &RequestOptions,
    ) -> Result<Value> {
        let path = object_path::<K>(namespace, name, None);
        let mut request = MemberRequest::new(Method::DELETE, with_query(path, &options.write_query()));
        if !body.is_empty() {
            request = request.with_body("application/json", body);
        }
        self.write(request, options).await?.json()
    }

    async fn write(
        &self,
        request: MemberRequest,
        options: &RequestOptions,
    ) -> Result<crate::client::MemberResponse> {
        let master = self.master();
        debug!(
            member = %master.id,
            method = %request.method,
            path = %request.path_and_query,
            "Writing to master"
        );
        bounded(master, options.member_timeout(), async move {
            master.client.send(request).await?.into_result()
        })
        .await
    }

    /// Ask members in order; the first success wins. NotFound moves on to
    /// the next member, any other error aborts. `None` if every member
    /// reported NotFound.
    async fn probe(
        &self,
        request: MemberRequest,
        options: &RequestOptions,
    ) -> Result<Option<(&Member, crate::client::MemberResponse)>> {
        let deadline = options.member_timeout();
        for member in &self.members {
            let request = request.clone();
            let result = bounded(member, deadline, async move {
                member.client.send(request).await?.into_result()
            })
            .await;

            match result {
                Ok(response) => return Ok(Some((member, response))),
                Err(e) if e.is_not_found() => {
                    debug!(member = %member.id, "Object not found on member");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

/// Bound a member call by the caller's timeout, if any
async fn bounded<T>(
    member: &Member,
    deadline: Option<Duration>,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout(deadline, call)
            .await
            .map_err(|_| Error::Timeout {
                member: member.id.clone(),
            })?,
        None => call.await,
    }
}

fn object_path<K: KindObject>(namespace: Option<&str>, name: &str, subresource: Option<&str>) -> String {
    let base = K::url_path(&(), namespace);
    match subresource {
        Some(sub) => format!("{}/{}/{}", base, name, sub),
        None => format!("{}/{}", base, name),
    }
}

fn with_query(path: String, query: &str) -> String {
    if query.is_empty() {
        path
    } else {
        format!("{}?{}", path, query)
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
