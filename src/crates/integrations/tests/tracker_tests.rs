//! Tracker and directory clients against in-process fake services.

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use integrations::{
    ActivityQuery, ActivitySource, DateRange, DirectorySettings, DirectorySource,
    HttpDirectoryClient, IntegrationError, JiraActivitySource, SourceFlavor, TrackerSettings,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use transport::{ClientConfig, RetryPolicy};

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn transport_profile() -> ClientConfig {
    ClientConfig::new("http://placeholder")
        .with_timeout(Duration::from_secs(5))
        .with_retry(RetryPolicy::new(1).with_initial_delay(Duration::from_millis(5)).with_jitter(false))
}

fn issue(key: &str, assignee: &str) -> Value {
    json!({
        "key": key,
        "fields": {
            "summary": format!("Work on {}", key),
            "status": {"name": "Done"},
            "assignee": {"name": assignee, "displayName": assignee.to_uppercase()},
            "issuetype": {"name": "Story"},
            "project": {"key": "PROJ", "name": "Project"},
            "customfield_10007": "EPIC-1"
        }
    })
}

#[derive(Default)]
struct TrackerLog {
    searches: Vec<HashMap<String, String>>,
    auth: Vec<String>,
}

/// Tracker with `count` story issues and one epic, paging honestly.
fn tracker(count: usize, log: Arc<Mutex<TrackerLog>>) -> Router {
    let search_log = Arc::clone(&log);
    Router::new()
        .route(
            "/rest/api/2/search",
            get(move |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| {
                let log = Arc::clone(&search_log);
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    {
                        let mut log = log.lock();
                        log.searches.push(params.clone());
                        log.auth.push(auth);
                    }

                    let jql = params.get("jql").cloned().unwrap_or_default();
                    if jql.starts_with("key in") {
                        return Json(json!({
                            "startAt": 0,
                            "total": 1,
                            "issues": [{
                                "key": "EPIC-1",
                                "fields": {
                                    "summary": "Identity platform",
                                    "issuetype": {"name": "Epic"},
                                    "status": {"name": "Open"},
                                    "labels": ["outcome: fewer logins"]
                                }
                            }]
                        }));
                    }

                    let start: usize = params.get("startAt").and_then(|v| v.parse().ok()).unwrap_or(0);
                    let max: usize = params.get("maxResults").and_then(|v| v.parse().ok()).unwrap_or(50);
                    let issues: Vec<Value> = (start..(start + max).min(count))
                        .map(|i| issue(&format!("PROJ-{}", i + 1), if i % 2 == 0 { "alice" } else { "bob" }))
                        .collect();
                    Json(json!({ "startAt": start, "maxResults": max, "total": count, "issues": issues }))
                }
            }),
        )
        .route(
            "/rest/api/2/myself",
            get(|| async { Json(json!({ "name": "me", "displayName": "Me" })) }),
        )
}

fn query(members: &[&str]) -> ActivityQuery {
    ActivityQuery::new(
        members.iter().map(|m| m.to_string()).collect(),
        DateRange::parse("2024-01-01", "2024-01-08").unwrap(),
    )
}

#[tokio::test]
async fn test_fetch_pages_until_total() {
    let log = Arc::new(Mutex::new(TrackerLog::default()));
    let base = spawn_server(tracker(5, Arc::clone(&log))).await;
    let source = JiraActivitySource::new(
        TrackerSettings::new(&base, "token")
            .with_username("me@example.com")
            .with_page_size(2)
            .with_hierarchy(false, 0),
        transport_profile(),
    )
    .unwrap();

    let records = source.fetch_activities(&query(&["alice", "bob"])).await.unwrap();

    assert_eq!(records.len(), 5);
    assert_eq!(records[0].id, "PROJ-1");
    assert_eq!(records[1].assignee_username.as_deref(), Some("bob"));
    assert!(records.iter().all(|r| r.hierarchy.is_none()));

    let log = log.lock();
    let starts: Vec<&str> = log.searches.iter().map(|s| s["startAt"].as_str()).collect();
    assert_eq!(starts, vec!["0", "2", "4"]);
    assert!(log.searches[0]["jql"].starts_with("assignee in (\"alice\",\"bob\")"));
    assert_eq!(log.searches[0]["expand"], "changelog");
    assert!(log.searches[0]["fields"].contains("comment"));
    assert!(log.auth.iter().all(|a| a.starts_with("Basic ")));
    assert_eq!(source.metrics().total_requests, 3);
}

#[tokio::test]
async fn test_max_results_caps_fetch() {
    let log = Arc::new(Mutex::new(TrackerLog::default()));
    let base = spawn_server(tracker(10, Arc::clone(&log))).await;
    let source = JiraActivitySource::new(
        TrackerSettings::new(&base, "token")
            .with_page_size(4)
            .with_hierarchy(false, 0),
        transport_profile(),
    )
    .unwrap();

    let records = source
        .fetch_activities(&query(&["alice"]).with_max_results(6))
        .await
        .unwrap();

    assert_eq!(records.len(), 6);
    let log = log.lock();
    assert_eq!(log.searches[1]["maxResults"], "2");
}

#[tokio::test]
async fn test_hierarchy_context_attached() {
    let log = Arc::new(Mutex::new(TrackerLog::default()));
    let base = spawn_server(tracker(2, Arc::clone(&log))).await;
    let source = JiraActivitySource::new(
        TrackerSettings::new(&base, "pat").with_flavor(SourceFlavor::RedHat),
        transport_profile(),
    )
    .unwrap();

    let records = source.fetch_activities(&query(&["alice"])).await.unwrap();

    let context = records[0].hierarchy.as_ref().unwrap();
    assert_eq!(context.path, vec!["EPIC-1", "PROJ-1"]);
    assert_eq!(context.epic.as_ref().unwrap().title, "Identity platform");
    assert_eq!(context.outcomes, vec!["fewer logins"]);

    let log = log.lock();
    // one activity page plus one ancestor batch shared by both stories
    assert_eq!(log.searches.len(), 2);
    assert_eq!(log.searches[1]["jql"], "key in (\"EPIC-1\")");
    assert!(log.auth.iter().all(|a| a == "Bearer pat"));
}

#[tokio::test]
async fn test_invalid_query_is_rejected_before_any_request() {
    let log = Arc::new(Mutex::new(TrackerLog::default()));
    let base = spawn_server(tracker(1, Arc::clone(&log))).await;
    let source = JiraActivitySource::new(TrackerSettings::new(&base, "token"), transport_profile()).unwrap();

    let err = source.fetch_activities(&query(&[])).await.unwrap_err();
    assert!(matches!(err, IntegrationError::InvalidQuery(_)));
    assert!(log.lock().searches.is_empty());
}

#[tokio::test]
async fn test_validate_connection_and_close() {
    let log = Arc::new(Mutex::new(TrackerLog::default()));
    let base = spawn_server(tracker(0, log)).await;
    let source = JiraActivitySource::new(TrackerSettings::new(&base, "token"), transport_profile()).unwrap();

    source.validate_connection().await.unwrap();
    assert!(source.close().await);
    assert!(!source.close().await);
    assert!(source.validate_connection().await.is_err());
}

#[tokio::test]
async fn test_unauthorized_tracker_surfaces_authentication_error() {
    let router = Router::new().route(
        "/rest/api/2/myself",
        get(|| async { (StatusCode::UNAUTHORIZED, "bad token").into_response() }),
    );
    let base = spawn_server(router).await;
    let source = JiraActivitySource::new(TrackerSettings::new(&base, "token"), transport_profile()).unwrap();

    let err = source.validate_connection().await.unwrap_err();
    assert_eq!(err.kind(), transport::ErrorKind::Authentication);
}

fn directory() -> Router {
    let people = vec![
        json!({"uid": "boss", "email": "boss@example.com", "display_name": "The Boss"}),
        json!({"uid": "alice", "display_name": "Alice", "manager_uid": "boss", "title": "Engineer"}),
        json!({"uid": "bob", "display_name": "Bob", "manager_uid": "boss"}),
        json!({"uid": "carol", "display_name": "Carol", "manager_uid": "alice"}),
    ];
    Router::new().route(
        "/people",
        get(move |Query(params): Query<HashMap<String, String>>| {
            let people = people.clone();
            async move {
                let matches: Vec<Value> = if let Some(mail) = params.get("mail") {
                    people.into_iter().filter(|p| p["email"] == mail.as_str()).collect()
                } else if let Some(uid) = params.get("uid") {
                    people.into_iter().filter(|p| p["uid"] == uid.as_str()).collect()
                } else if let Some(managers) = params.get("manager") {
                    let managers: Vec<&str> = managers.split(',').collect();
                    people
                        .into_iter()
                        .filter(|p| p["manager_uid"].as_str().map(|m| managers.contains(&m)).unwrap_or(false))
                        .collect()
                } else {
                    people.into_iter().take(1).collect()
                };
                Json(json!({ "people": matches }))
            }
        }),
    )
}

#[tokio::test]
async fn test_directory_expands_manager() {
    let base = spawn_server(directory()).await;
    let client = HttpDirectoryClient::new(DirectorySettings::new(&base), transport_profile()).unwrap();

    let expansion = client.expand_manager("boss@example.com", 3).await.unwrap();
    let mut names = expansion.usernames();
    names.sort();
    assert_eq!(names, vec!["alice", "bob", "boss", "carol"]);
    assert_eq!(expansion.tree.parent("carol").unwrap().id, "alice");
    assert!(expansion.warnings.is_empty());

    // lookup + one report query per level (boss, alice/bob, carol)
    assert_eq!(client.metrics().total_requests, 4);
}

#[tokio::test]
async fn test_directory_identity_mapping() {
    let base = spawn_server(directory()).await;
    let client = HttpDirectoryClient::new(DirectorySettings::new(&base), transport_profile()).unwrap();

    let known = client.map_identity("alice").await;
    assert_eq!(known.username, "alice");
    assert!(!known.is_fallback());

    let unknown = client.map_identity("zed@example.com").await;
    assert_eq!(unknown.username, "zed");
    assert!(unknown.is_fallback());

    client.validate_connection().await.unwrap();
}
