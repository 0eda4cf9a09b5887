use std::collections::HashMap;

use activity_export::client::ApiClient;
use activity_export::config::Config;
use activity_export::paginate::{collect_all, fetch_all};
use activity_export::window::TimeWindow;
use envconfig::Envconfig;
use futures::StreamExt;
use httpmock::prelude::*;
use serde_json::json;

fn client_for(server: &MockServer, per_page: u32) -> ApiClient {
    let env = HashMap::from([
        ("GITLAB_URL".to_string(), server.url("/api/v4")),
        ("ACCESS_TOKEN".to_string(), "token".to_string()),
        ("PER_PAGE".to_string(), per_page.to_string()),
    ]);
    let config = Config::init_from_hashmap(&env).unwrap();
    ApiClient::new(&config).unwrap()
}

fn page_mock<'a>(
    server: &'a MockServer,
    page: u32,
    body: serde_json::Value,
) -> httpmock::Mock<'a> {
    server.mock(|when, then| {
        when.method(GET)
            .path("/api/v4/users")
            .query_param("page", page.to_string())
            .query_param("per_page", "2");
        then.status(200).json_body(body);
    })
}

#[tokio::test]
async fn test_stops_on_empty_page_without_requesting_next() {
    let server = MockServer::start();
    let client = client_for(&server, 2);

    let first = page_mock(&server, 1, json!([{"id": 1}, {"id": 2}]));
    let second = page_mock(&server, 2, json!([{"id": 3}, {"id": 4}]));
    let third = page_mock(&server, 3, json!([]));
    let fourth = page_mock(&server, 4, json!([{"id": 5}]));

    let items = collect_all(&client, client.url("/users")).await;

    let ids: Vec<_> = items.iter().filter_map(|u| u["id"].as_i64()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    first.assert();
    second.assert();
    third.assert();
    assert_eq!(fourth.hits(), 0);
}

#[tokio::test]
async fn test_failed_page_truncates_the_stream() {
    let server = MockServer::start();
    let client = client_for(&server, 2);

    page_mock(&server, 1, json!([{"id": 1}, {"id": 2}]));
    let failing = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v4/users")
            .query_param("page", "2");
        then.status(502).body("bad gateway");
    });
    let after = page_mock(&server, 3, json!([{"id": 9}]));

    let items = collect_all(&client, client.url("/users")).await;

    assert_eq!(items.len(), 2);
    failing.assert();
    assert_eq!(after.hits(), 0);
}

#[tokio::test]
async fn test_object_body_ends_pagination_and_is_dropped() {
    let server = MockServer::start();
    let client = client_for(&server, 2);

    page_mock(&server, 1, json!({"message": "403 Forbidden"}));
    let second = page_mock(&server, 2, json!([{"id": 1}]));

    let items = collect_all(&client, client.url("/users")).await;

    assert!(items.is_empty());
    assert_eq!(second.hits(), 0);
}

#[tokio::test]
async fn test_window_params_are_kept_on_every_page() {
    let server = MockServer::start();
    let client = client_for(&server, 2);

    let first = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v4/projects/3/pipelines")
            .query_param("updated_after", "2024-01-01T00:00:00Z")
            .query_param("page", "1");
        then.status(200).json_body(json!([{"id": 10}, {"id": 11}]));
    });
    let second = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v4/projects/3/pipelines")
            .query_param("updated_after", "2024-01-01T00:00:00Z")
            .query_param("page", "2");
        then.status(200).json_body(json!([]));
    });

    let url = format!(
        "{}?updated_after=2024-01-01T00:00:00Z",
        client.url("/projects/3/pipelines")
    );
    let count = fetch_all(&client, url).count().await;

    assert_eq!(count, 2);
    first.assert();
    second.assert();
}

#[tokio::test]
async fn test_offset_bounds_reach_the_server_intact() {
    let server = MockServer::start();
    let client = client_for(&server, 2);

    let first = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v4/audit_events")
            .query_param("created_after", "2024-01-01T08:00:00+08:00")
            .query_param("page", "1");
        then.status(200).json_body(json!([{"id": 1}]));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/api/v4/audit_events")
            .query_param("page", "2");
        then.status(200).json_body(json!([]));
    });

    let window = TimeWindow::new(Some("2024-01-01T08:00:00+08:00"), None).unwrap();
    let url = window.render_query(&client.url("/audit_events"), "created_after", "created_before");
    let items = collect_all(&client, url).await;

    assert_eq!(items.len(), 1);
    first.assert();
}
