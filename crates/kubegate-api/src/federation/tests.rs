use super::*;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kubegate_common::CLUSTER_ID_ANNOTATION;
use serde_json::json;

use crate::client::{MemberResponse, MockMemberClient, StreamingResponse, UpgradeResponse};

const TABLE_ACCEPT: &str = "application/json;as=Table;v=v1;g=meta.k8s.io";

// ============================================================================
// Helpers
// ============================================================================

fn response(status: StatusCode, value: Value) -> Result<MemberResponse> {
    Ok(MemberResponse {
        status,
        headers: HeaderMap::new(),
        body: Bytes::from(serde_json::to_vec(&value).unwrap()),
    })
}

fn ok_json(value: Value) -> Result<MemberResponse> {
    response(StatusCode::OK, value)
}

fn status_body(code: u16, reason: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("member said {}", reason),
        "reason": reason,
        "code": code
    })
}

fn pod_list(names: &[&str]) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "PodList",
        "metadata": {"resourceVersion": "7"},
        "items": names
            .iter()
            .map(|n| json!({"metadata": {"name": n, "namespace": "default"}}))
            .collect::<Vec<_>>()
    })
}

fn pod_table(names: &[&str]) -> Value {
    json!({
        "kind": "Table",
        "apiVersion": "meta.k8s.io/v1",
        "columnDefinitions": [
            {"name": "Name", "type": "string", "format": "name"},
            {"name": "Status", "type": "string", "format": ""}
        ],
        "rows": names
            .iter()
            .map(|n| json!({"cells": [n, "Running"], "object": {"metadata": {"name": n}}}))
            .collect::<Vec<_>>()
    })
}

fn federation(members: Vec<(&str, MockMemberClient)>) -> Federation {
    let master = members[0].0.to_string();
    let members = members
        .into_iter()
        .map(|(id, client)| Member::new(id, Arc::new(client)))
        .collect();
    Federation::new(members, &master).unwrap()
}

fn listing(names: &'static [&'static str]) -> MockMemberClient {
    let mut client = MockMemberClient::new();
    client
        .expect_send()
        .returning(move |_| ok_json(pod_list(names)));
    client
}

fn provenance(pod: &Pod) -> &str {
    pod.metadata.annotations.as_ref().unwrap()[CLUSTER_ID_ANNOTATION].as_str()
}

/// Client that never answers in time
struct SlowClient;

#[async_trait]
impl MemberClient for SlowClient {
    async fn send(&self, _req: MemberRequest) -> Result<MemberResponse> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        ok_json(pod_list(&[]))
    }

    async fn send_streaming(&self, _req: MemberRequest) -> Result<StreamingResponse> {
        Err(Error::Proxy("not used".into()))
    }

    async fn send_upgrade(&self, _req: MemberRequest) -> Result<UpgradeResponse> {
        Err(Error::Proxy("not used".into()))
    }
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_master_must_be_member() {
    let members = vec![Member::new("us", Arc::new(MockMemberClient::new()))];
    assert!(Federation::new(members, "eu").is_err());
}

#[test]
fn test_master_selection() {
    let fed = federation(vec![
        ("us", MockMemberClient::new()),
        ("eu", MockMemberClient::new()),
    ]);
    assert_eq!(fed.master().id, "us");
    assert_eq!(fed.members().len(), 2);
}

// ============================================================================
// List
// ============================================================================

#[tokio::test]
async fn test_list_is_union_with_provenance() {
    let fed = federation(vec![
        ("us", listing(&["a", "b"])),
        ("eu", listing(&["c"])),
        ("ap", listing(&["d", "e"])),
    ]);

    let list: ResourceList<Pod> = fed
        .list(Some("default"), &RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(list.kind, "PodList");
    assert_eq!(list.api_version, "v1");
    assert_eq!(list.items.len(), 5);
    assert_eq!(list.metadata.resource_version, None);
    assert_eq!(list.metadata.continue_, None);

    let tagged: Vec<(String, &str)> = list
        .items
        .iter()
        .map(|p| (p.metadata.name.clone().unwrap(), provenance(p)))
        .collect();
    assert_eq!(
        tagged,
        vec![
            ("a".to_string(), "us"),
            ("b".to_string(), "us"),
            ("c".to_string(), "eu"),
            ("d".to_string(), "ap"),
            ("e".to_string(), "ap"),
        ]
    );
}

#[tokio::test]
async fn test_list_fails_fast_on_member_error() {
    let mut broken = MockMemberClient::new();
    broken.expect_send().returning(|_| {
        response(
            StatusCode::INTERNAL_SERVER_ERROR,
            status_body(500, "InternalError"),
        )
    });

    let fed = federation(vec![
        ("us", listing(&["a"])),
        ("eu", broken),
        ("ap", listing(&["b"])),
    ]);

    let err = fed
        .list::<Pod>(None, &RequestOptions::default())
        .await
        .unwrap_err();

    let status = err.to_status();
    assert_eq!(status.code, Some(500));
    assert_eq!(status.reason.as_deref(), Some("InternalError"));
}

#[tokio::test(start_paused = true)]
async fn test_list_member_timeout_aborts() {
    let members = vec![
        Member::new("us", Arc::new(listing(&["a"]))),
        Member::new("slow", Arc::new(SlowClient)),
    ];
    let fed = Federation::new(members, "us").unwrap();
    let options = RequestOptions {
        timeout_seconds: Some(5),
        ..Default::default()
    };

    let err = fed.list::<Pod>(None, &options).await.unwrap_err();

    assert!(matches!(err, Error::Timeout { ref member } if member == "slow"));
    assert_eq!(err.to_status().code, Some(504));
}

#[tokio::test]
async fn test_list_pages_merged_result() {
    let mut us = MockMemberClient::new();
    us.expect_send()
        .withf(|req| {
            !req.path_and_query.contains("limit=") && !req.path_and_query.contains("continue=")
        })
        .returning(|_| ok_json(pod_list(&["a", "b", "c"])));
    let mut eu = MockMemberClient::new();
    eu.expect_send()
        .withf(|req| !req.path_and_query.contains("limit="))
        .returning(|_| ok_json(pod_list(&["d", "e"])));
    let fed = federation(vec![("us", us), ("eu", eu)]);

    let first: ResourceList<Pod> = fed
        .list(
            None,
            &RequestOptions {
                limit: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.metadata.remaining_item_count, Some(3));
    let token = first.metadata.continue_.clone().unwrap();

    let second: ResourceList<Pod> = fed
        .list(
            None,
            &RequestOptions {
                limit: Some(2),
                continue_token: Some(token),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let names: Vec<_> = second
        .items
        .iter()
        .map(|p| p.metadata.name.clone().unwrap())
        .collect();
    assert_eq!(names, vec!["c", "d"]);
}

#[tokio::test]
async fn test_list_forwards_selectors() {
    let mut client = MockMemberClient::new();
    client
        .expect_send()
        .withf(|req| {
            req.path_and_query.starts_with("/api/v1/namespaces/prod/configmaps?")
                && req.path_and_query.contains("labelSelector=app%3Dweb")
        })
        .returning(|_| {
            ok_json(json!({"apiVersion": "v1", "kind": "ConfigMapList", "metadata": {}, "items": []}))
        });
    let fed = federation(vec![("us", client)]);

    let options = RequestOptions {
        label_selector: Some("app=web".into()),
        ..Default::default()
    };
    let list: ResourceList<ConfigMap> = fed.list(Some("prod"), &options).await.unwrap();
    assert!(list.items.is_empty());
    assert_eq!(list.kind, "ConfigMapList");
}

// ============================================================================
// Get
// ============================================================================

#[tokio::test]
async fn test_get_probes_members_in_order() {
    let mut us = MockMemberClient::new();
    us.expect_send()
        .times(1)
        .returning(|_| response(StatusCode::NOT_FOUND, status_body(404, "NotFound")));
    let mut eu = MockMemberClient::new();
    eu.expect_send()
        .times(1)
        .withf(|req| req.path_and_query.starts_with("/api/v1/namespaces/default/pods/web"))
        .returning(|_| ok_json(json!({"metadata": {"name": "web", "namespace": "default"}})));
    let mut ap = MockMemberClient::new();
    ap.expect_send().never();

    let fed = federation(vec![("us", us), ("eu", eu), ("ap", ap)]);

    let pod: Pod = fed
        .get(Some("default"), "web", &RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(provenance(&pod), "eu");
}

#[tokio::test]
async fn test_get_not_found_everywhere() {
    let not_found = || {
        let mut client = MockMemberClient::new();
        client
            .expect_send()
            .returning(|_| response(StatusCode::NOT_FOUND, status_body(404, "NotFound")));
        client
    };
    let fed = federation(vec![("us", not_found()), ("eu", not_found())]);

    let err = fed
        .get::<Pod>(Some("default"), "ghost", &RequestOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(
        err.to_status().message.as_deref(),
        Some("pods \"ghost\" not found")
    );
}

#[tokio::test]
async fn test_get_other_error_aborts_lookup() {
    let mut us = MockMemberClient::new();
    us.expect_send()
        .returning(|_| response(StatusCode::FORBIDDEN, status_body(403, "Forbidden")));
    let mut eu = MockMemberClient::new();
    eu.expect_send().never();
    let fed = federation(vec![("us", us), ("eu", eu)]);

    let err = fed
        .get::<Pod>(Some("default"), "web", &RequestOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_status().code, Some(403));
}

#[tokio::test]
async fn test_locate_returns_owner() {
    let mut us = MockMemberClient::new();
    us.expect_send()
        .returning(|_| response(StatusCode::NOT_FOUND, status_body(404, "NotFound")));
    let mut eu = MockMemberClient::new();
    eu.expect_send()
        .returning(|_| ok_json(json!({"metadata": {"name": "web"}})));
    let fed = federation(vec![("us", us), ("eu", eu)]);

    let (member, _pod) = fed
        .locate::<Pod>(Some("default"), "web", &RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(member.id, "eu");
}

// ============================================================================
// Tables
// ============================================================================

#[tokio::test]
async fn test_list_table_merges_columns_and_rows() {
    let table_client = |names: &'static [&'static str]| {
        let mut client = MockMemberClient::new();
        client
            .expect_send()
            .withf(|req| req.headers.get(ACCEPT).is_some_and(|a| a == TABLE_ACCEPT))
            .returning(move |_| ok_json(pod_table(names)));
        client
    };
    let fed = federation(vec![
        ("us", table_client(&["a", "b"])),
        ("eu", table_client(&["c"])),
        ("ap", table_client(&["d", "e", "f"])),
    ]);

    let table = fed
        .list_table::<Pod>(None, &RequestOptions::default(), TABLE_ACCEPT)
        .await
        .unwrap();

    assert_eq!(table.column_definitions.len(), 3);
    assert_eq!(table.column_definitions[0].name, "Cluster Id");
    assert_eq!(table.rows.len(), 6);
    assert_eq!(table.rows[2].cells[0], json!("eu"));
    assert_eq!(table.rows[2].cells[1], json!("c"));
}

#[tokio::test]
async fn test_get_table_single_owner() {
    let mut us = MockMemberClient::new();
    us.expect_send()
        .returning(|_| response(StatusCode::NOT_FOUND, status_body(404, "NotFound")));
    let mut eu = MockMemberClient::new();
    eu.expect_send().returning(|_| ok_json(pod_table(&["web"])));
    let fed = federation(vec![("us", us), ("eu", eu)]);

    let table = fed
        .get_table::<Pod>(Some("default"), "web", &RequestOptions::default(), TABLE_ACCEPT)
        .await
        .unwrap();
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0].cells[0], json!("eu"));
}

// ============================================================================
// Writes
// ============================================================================

#[tokio::test]
async fn test_create_targets_master_only() {
    let mut master = MockMemberClient::new();
    master
        .expect_send()
        .times(1)
        .withf(|req| {
            req.method == Method::POST
                && req.path_and_query.starts_with("/api/v1/namespaces/default/configmaps")
        })
        .returning(|req| {
            let mut created: Value = serde_json::from_slice(&req.body).unwrap();
            created["metadata"]["uid"] = json!("1234");
            response(StatusCode::CREATED, created)
        });
    let mut replica = MockMemberClient::new();
    replica.expect_send().never();
    let fed = federation(vec![("us", master), ("eu", replica)]);

    let mut cm = ConfigMap::default();
    cm.metadata.name = Some("settings".into());
    let created = fed
        .create(Some("default"), &cm, &RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(created.metadata.uid.as_deref(), Some("1234"));
}

#[tokio::test]
async fn test_update_targets_master_only() {
    let mut master = MockMemberClient::new();
    master
        .expect_send()
        .withf(|req| {
            req.method == Method::PUT
                && req.path_and_query.starts_with("/api/v1/namespaces/default/configmaps/settings")
        })
        .returning(|req| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            ok_json(body)
        });
    let mut replica = MockMemberClient::new();
    replica.expect_send().never();
    let fed = federation(vec![("us", master), ("eu", replica)]);

    let mut cm = ConfigMap::default();
    cm.metadata.name = Some("settings".into());
    let updated = fed
        .update(Some("default"), "settings", &cm, &RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(updated.metadata.name.as_deref(), Some("settings"));
}

#[tokio::test]
async fn test_patch_subresource_passes_bytes_through() {
    let mut master = MockMemberClient::new();
    master
        .expect_send()
        .withf(|req| {
            req.method == Method::PATCH
                && req.path_and_query
                    == "/apis/apps/v1/namespaces/default/deployments/web/scale?fieldManager=kubectl"
                && req.headers[CONTENT_TYPE] == "application/merge-patch+json"
                && req.body == br#"{"spec":{"replicas":3}}"#
        })
        .returning(|_| ok_json(json!({"kind": "Scale", "spec": {"replicas": 3}})));
    let fed = federation(vec![("us", master)]);

    let options = RequestOptions {
        field_manager: Some("kubectl".into()),
        ..Default::default()
    };
    let scaled = fed
        .patch::<Deployment>(
            Some("default"),
            "web",
            Some("scale"),
            PatchType::Merge,
            br#"{"spec":{"replicas":3}}"#.to_vec(),
            &options,
        )
        .await
        .unwrap();
    assert_eq!(scaled["kind"], "Scale");
}

#[tokio::test]
async fn test_delete_returns_status_or_object() {
    let mut master = MockMemberClient::new();
    master
        .expect_send()
        .withf(|req| {
            req.method == Method::DELETE
                && req.path_and_query == "/api/v1/namespaces/default/secrets/token?dryRun=All"
        })
        .returning(|_| {
            ok_json(json!({"kind": "Status", "apiVersion": "v1", "status": "Success", "code": 200}))
        });
    let mut replica = MockMemberClient::new();
    replica.expect_send().never();
    let fed = federation(vec![("us", master), ("eu", replica)]);

    let options = RequestOptions {
        dry_run: Some("All".into()),
        ..Default::default()
    };
    let result = fed
        .delete::<k8s_openapi::api::core::v1::Secret>(Some("default"), "token", Vec::new(), &options)
        .await
        .unwrap();
    assert_eq!(result["status"], "Success");
}

#[tokio::test]
async fn test_write_error_keeps_member_status() {
    let mut master = MockMemberClient::new();
    master
        .expect_send()
        .returning(|_| response(StatusCode::CONFLICT, status_body(409, "AlreadyExists")));
    let fed = federation(vec![("us", master)]);

    let err = fed
        .create(Some("default"), &ConfigMap::default(), &RequestOptions::default())
        .await
        .unwrap_err();
    let status = err.to_status();
    assert_eq!(status.code, Some(409));
    assert_eq!(status.reason.as_deref(), Some("AlreadyExists"));
}

// ============================================================================
// Watch
// ============================================================================

fn chunks(parts: &[&'static str]) -> StreamingResponse {
    let items: Vec<std::result::Result<Bytes, std::io::Error>> = parts
        .iter()
        .map(|p| Ok(Bytes::from_static(p.as_bytes())))
        .collect();
    StreamingResponse {
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        stream: futures::stream::iter(items).boxed(),
    }
}

#[tokio::test]
async fn test_watch_uses_first_member_with_handshake() {
    let mut us = MockMemberClient::new();
    us.expect_send_streaming().returning(|_| {
        let mut refused = chunks(&[r#"{"kind":"Status","code":403,"reason":"Forbidden"}"#]);
        refused.status = StatusCode::FORBIDDEN;
        Ok(refused)
    });
    let mut eu = MockMemberClient::new();
    eu.expect_send_streaming()
        .withf(|req| req.path_and_query.contains("watch=true"))
        .returning(|_| {
            Ok(chunks(&[
                "{\"type\":\"ADDED\",\"object\":{\"metadata\":{\"name\":\"a\"}}}\n{\"type\":\"MOD",
                "IFIED\",\"object\":{\"metadata\":{\"name\":\"a\"}}}\n\n",
            ]))
        });
    let mut ap = MockMemberClient::new();
    ap.expect_send_streaming().never();
    let fed = federation(vec![("us", us), ("eu", eu), ("ap", ap)]);

    let events: Vec<_> = fed
        .watch::<Pod>(Some("default"), None, &RequestOptions::default())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    let first = events[0].as_ref().unwrap();
    let second = events[1].as_ref().unwrap();
    assert_eq!(first.event_type, "ADDED");
    assert_eq!(second.event_type, "MODIFIED");
    assert_eq!(
        first.object["metadata"]["annotations"][CLUSTER_ID_ANNOTATION],
        "eu"
    );
}

#[tokio::test]
async fn test_watch_named_object_narrows_member_watch() {
    let mut us = MockMemberClient::new();
    us.expect_send_streaming()
        .withf(|req| {
            req.path_and_query.starts_with("/api/v1/namespaces/default/pods?")
                && req.path_and_query.contains("fieldSelector=metadata.name%3Dweb-0")
                && !req.path_and_query.contains("timeoutSeconds")
        })
        .times(1)
        .returning(|_| {
            Ok(chunks(&[
                "{\"type\":\"ADDED\",\"object\":{\"metadata\":{\"name\":\"web-0\"}}}\n",
            ]))
        });
    let fed = federation(vec![("us", us)]);

    let events: Vec<_> = fed
        .watch::<Pod>(Some("default"), Some("web-0"), &RequestOptions::default())
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].as_ref().unwrap().object["metadata"]["name"], "web-0");
}

#[tokio::test]
async fn test_watch_all_members_refuse() {
    let refusing = || {
        let mut client = MockMemberClient::new();
        client.expect_send_streaming().returning(|_| {
            let mut refused =
                chunks(&[r#"{"kind":"Status","code":403,"reason":"Forbidden"}"#]);
            refused.status = StatusCode::FORBIDDEN;
            Ok(refused)
        });
        client
    };
    let fed = federation(vec![("us", refusing()), ("eu", refusing())]);

    let err = match fed.watch::<Pod>(None, None, &RequestOptions::default()).await {
        Err(e) => e,
        Ok(_) => panic!("watch should fail"),
    };
    assert_eq!(err.to_status().code, Some(403));
}

#[tokio::test]
async fn test_watch_malformed_line_is_error_item() {
    let mut us = MockMemberClient::new();
    us.expect_send_streaming()
        .returning(|_| Ok(chunks(&["not json\n"])));
    let fed = federation(vec![("us", us)]);

    let events: Vec<_> = fed
        .watch::<Pod>(None, None, &RequestOptions::default())
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(events.len(), 1);
    assert!(events[0].is_err());
}
