//! End-to-end integration tests for Tessera Server
//!
//! Drives the full router: query compilation, document assembly with access
//! decisions, writes, relationship mutations and protocol errors.

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

use tessera_common::ApiConfig;
use tessera_resource::{
    ContentItem, FieldDefinition, MemoryStore, Operation, ResourceDefinition, RoleDefinition,
};
use tessera_server::{create_router, AppState, ServerConfig};

const EDITOR: &[(&str, &str)] = &[("x-account-id", "1"), ("x-account-roles", "editor")];
const GUEST: &[(&str, &str)] = &[("x-account-id", "2"), ("x-account-roles", "guest")];

fn resources() -> Vec<ResourceDefinition> {
    vec![
        ResourceDefinition::new("node", "article")
            .label("title")
            .field(FieldDefinition::attribute("title").required().max_length(40))
            .field(FieldDefinition::attribute("body"))
            .field(FieldDefinition::attribute("secret"))
            .field(FieldDefinition::attribute("rank"))
            .field(FieldDefinition::attribute("status"))
            .field(FieldDefinition::relationship("uid", ["user--user"]).alias("author"))
            .field(
                FieldDefinition::relationship("field_tags", ["taxonomy_term--tags"])
                    .alias("tags")
                    .multiple(),
            ),
        ResourceDefinition::new("user", "user")
            .label("name")
            .field(FieldDefinition::attribute("name"))
            .field(FieldDefinition::attribute("mail")),
        ResourceDefinition::new("taxonomy_term", "tags")
            .label("name")
            .field(FieldDefinition::attribute("name")),
    ]
}

fn roles() -> Vec<RoleDefinition> {
    vec![
        RoleDefinition::new("anonymous")
            .grant("node--article", vec![Operation::View])
            .grant("user--user", vec![Operation::ViewLabel])
            .grant("taxonomy_term--tags", vec![Operation::View])
            .hide_field("node--article.secret"),
        RoleDefinition::new("editor")
            .grant(
                "node--article",
                vec![
                    Operation::View,
                    Operation::Create,
                    Operation::Update,
                    Operation::Delete,
                ],
            )
            .grant("user--user", vec![Operation::View])
            .grant("taxonomy_term--tags", vec![Operation::View])
            .with_view_unpublished(),
        RoleDefinition::new("guest").grant("user--user", vec![Operation::ViewLabel]),
    ]
}

fn items() -> Vec<ContentItem> {
    vec![
        ContentItem::new("user", "user", "u1")
            .with_value("name", "Ada")
            .with_value("mail", "ada@example.com"),
        ContentItem::new("user", "user", "u2").with_value("name", "Grace"),
        ContentItem::new("taxonomy_term", "tags", "t1").with_value("name", "rust"),
        ContentItem::new("taxonomy_term", "tags", "t2").with_value("name", "web"),
        ContentItem::new("node", "article", "a1")
            .with_value("title", "Rust basics")
            .with_value("body", "Ownership first.")
            .with_value("secret", "hunter2")
            .with_value("rank", 3)
            .with_value("status", true)
            .with_reference("uid", "user", "u1")
            .with_reference("field_tags", "taxonomy_term", "t1")
            .with_reference("field_tags", "taxonomy_term", "t2"),
        ContentItem::new("node", "article", "a2")
            .with_value("title", "Advanced Rust")
            .with_value("rank", 1)
            .with_value("status", true)
            .with_reference("uid", "user", "u2")
            .with_reference("field_tags", "taxonomy_term", "t1"),
        ContentItem::new("node", "article", "a3")
            .with_value("title", "Cooking")
            .with_value("rank", 2)
            .with_value("status", true)
            .with_reference("uid", "user", "u1"),
    ]
}

fn app_with(api: ApiConfig) -> axum::Router {
    let config = ServerConfig::default()
        .with_api(api.with_base_url("http://example.com"))
        .with_resources(resources())
        .with_roles(roles());
    let store = MemoryStore::with_items(items()).unwrap();
    create_router(AppState::with_store(config, Arc::new(store)).unwrap())
}

fn app() -> axum::Router {
    app_with(ApiConfig::default())
}

/// Send a request and return status, headers and the JSON body.
async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/vnd.api+json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, headers, json)
}

async fn get(app: &axum::Router, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, HeaderMap, Value) {
    send(app, "GET", uri, headers, None).await
}

fn ids(json: &Value) -> Vec<&str> {
    json["data"]
        .as_array()
        .map(|data| data.iter().filter_map(|r| r["id"].as_str()).collect())
        .unwrap_or_default()
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn test_entry_point() {
    let app = app();
    let (status, headers, json) = get(&app, "/jsonapi", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "application/vnd.api+json");
    assert_eq!(json["jsonapi"]["version"], "1.0");
    assert_eq!(
        json["links"]["node--article"]["href"],
        "http://example.com/jsonapi/node--article"
    );
}

#[tokio::test]
async fn test_collection_pagination_boundary() {
    let app = app();

    let (status, _, json) = get(&app, "/jsonapi/node--article?sort=title&page%5Bsize%5D=2", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec!["a2", "a3"]);
    let next = json["links"]["next"]["href"].as_str().unwrap();
    assert!(next.contains("page%5Boffset%5D=2"));
    assert!(json["links"].get("prev").is_none());

    let (_, _, json) = get(&app, "/jsonapi/node--article?sort=title&page%5Boffset%5D=2&page%5Bsize%5D=2", &[]).await;
    assert_eq!(ids(&json), vec!["a1"]);
    assert!(json["links"].get("next").is_none());
    assert!(json["links"].get("prev").is_some());

    let (_, _, json) = get(&app, "/jsonapi/node--article?filter%5Brank%5D%5Bvalue%5D=1&filter%5Brank%5D%5Boperator%5D=%3E&page%5Bsize%5D=2", &[]).await;
    assert_eq!(ids(&json).len(), 2);
    assert!(json["links"].get("next").is_none());
}

#[tokio::test]
async fn test_collection_filter_through_relationship() {
    let app = app();
    let (status, _, json) = get(&app, "/jsonapi/node--article?filter%5Bauthor.name%5D=Ada&sort=-rank", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec!["a1", "a3"]);
}

#[tokio::test]
async fn test_sparse_fieldsets_and_include() {
    let app = app();
    let (status, headers, json) = get(
        &app,
        "/jsonapi/node--article?sort=rank&include=tags,author&fields%5Bnode--article%5D=title",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let first = &json["data"][0];
    assert_eq!(first["attributes"].as_object().unwrap().len(), 1);
    assert!(first["relationships"]["author"].is_object());

    let included: Vec<String> = json["included"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| format!("{}:{}", r["type"].as_str().unwrap(), r["id"].as_str().unwrap()))
        .collect();
    assert_eq!(included.len(), 4);
    assert_eq!(included[0], "user--user:u2");
    assert!(included.contains(&"taxonomy_term--tags:t1".to_string()));

    let tags = headers.get("x-cache-tags").unwrap().to_str().unwrap();
    assert!(tags.contains("node_list"));
    assert!(tags.contains("node:a1"));
    assert!(tags.contains("taxonomy_term:t2"));
    let contexts = headers.get("x-cache-contexts").unwrap().to_str().unwrap();
    assert!(contexts.contains("user.roles"));
}

#[tokio::test]
async fn test_partial_access_renders_null_attribute() {
    let app = app();
    let (status, _, json) = get(&app, "/jsonapi/node--article/a1", &[]).await;
    assert_eq!(status, StatusCode::OK);
    let attributes = json["data"]["attributes"].as_object().unwrap();
    assert_eq!(attributes.len(), 5);
    assert_eq!(attributes["secret"], Value::Null);
    assert_eq!(attributes["title"], "Rust basics");
    assert!(json.get("errors").is_none());

    let (_, _, json) = get(&app, "/jsonapi/node--article/a1", EDITOR).await;
    assert_eq!(json["data"]["attributes"]["secret"], "hunter2");
}

#[tokio::test]
async fn test_label_only_and_inline_errors() {
    let app = app();

    let (_, _, json) = get(&app, "/jsonapi/node--article/a1?include=author", &[]).await;
    assert_eq!(json["included"][0]["meta"]["projection"], "label");
    assert!(json["included"][0]["attributes"].get("mail").is_none());

    let (status, _, json) = get(&app, "/jsonapi/node--article", GUEST).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().map(Vec::len), Some(0));
    assert_eq!(json["meta"]["errors"].as_array().map(Vec::len), Some(3));

    let (status, _, json) = get(&app, "/jsonapi/node--article/a1", GUEST).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["errors"][0]["status"], "403");
    assert_eq!(json["errors"][0]["source"]["pointer"], "/data");
}

#[tokio::test]
async fn test_related_and_relationship_documents() {
    let app = app();

    let (status, _, json) = get(&app, "/jsonapi/node--article/a1/author", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["id"], "u1");

    let (_, _, json) = get(&app, "/jsonapi/node--article/a3/tags", &[]).await;
    assert_eq!(json["data"], json!([]));

    let (status, _, json) = get(&app, "/jsonapi/node--article/a1/relationships/tags", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["data"],
        json!([
            {"type": "taxonomy_term--tags", "id": "t1"},
            {"type": "taxonomy_term--tags", "id": "t2"}
        ])
    );
    assert_eq!(
        json["links"]["related"]["href"],
        "http://example.com/jsonapi/node--article/a1/tags"
    );
}

#[tokio::test]
async fn test_request_level_errors() {
    let app = app();

    let (status, _, json) = get(&app, "/jsonapi/node--article?filter%5Bx%5D%5Bcondition%5D%5Bpath%5D=title&filter%5Bx%5D%5Bcondition%5D%5Bvalue%5D=a&filter%5Bx%5D%5Bcondition%5D%5BmemberOf%5D=missing", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["errors"][0]["status"], "400");

    let (status, _, _) = get(&app, "/jsonapi/node--article?include=body", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = get(&app, "/jsonapi/node--article?filter%5Bauthor.nope%5D=x", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = get(&app, "/jsonapi/node--article?bogus=1", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = get(&app, "/jsonapi/node--page", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, headers, _) = get(&app, "/jsonapi/node--article/zzz", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers.get("cache-control").unwrap(), "no-cache, private");
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_create_update_delete_flow() {
    let app = app();
    let body = json!({"data": {
        "type": "node--article",
        "attributes": {"title": "Fresh"},
        "relationships": {"author": {"data": {"type": "user--user", "id": "u2"}}}
    }});

    let (status, headers, json) = send(&app, "POST", "/jsonapi/node--article", EDITOR, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = json["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(
        headers.get("location").unwrap().to_str().unwrap(),
        format!("http://example.com/jsonapi/node--article/{}", id)
    );

    let uri = format!("/jsonapi/node--article/{}", id);
    let patch = json!({"data": {"type": "node--article", "id": id, "attributes": {"body": "Now with body"}}});
    let (status, _, json) = send(&app, "PATCH", &uri, EDITOR, Some(patch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["attributes"]["title"], "Fresh");
    assert_eq!(json["data"]["attributes"]["body"], "Now with body");

    let (status, _, _) = send(&app, "DELETE", &uri, EDITOR, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = get(&app, &uri, EDITOR).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_write_failures() {
    let app = app();

    let invalid = json!({"data": {
        "type": "node--article",
        "attributes": {"body": "no title"},
        "relationships": {"author": {"data": {"type": "user--user", "id": "ghost"}}}
    }});
    let (status, _, json) = send(&app, "POST", "/jsonapi/node--article", EDITOR, Some(invalid)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["errors"].as_array().map(Vec::len), Some(2));

    let existing = json!({"data": {"type": "node--article", "id": "a1", "attributes": {"title": "Dup"}}});
    let (status, _, _) = send(&app, "POST", "/jsonapi/node--article", EDITOR, Some(existing)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let mismatch = json!({"data": {"type": "node--article", "id": "a2", "attributes": {}}});
    let (status, _, _) = send(&app, "PATCH", "/jsonapi/node--article/a1", EDITOR, Some(mismatch)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let anonymous = json!({"data": {"type": "node--article", "attributes": {"title": "Nope"}}});
    let (status, _, _) = send(&app, "POST", "/jsonapi/node--article", &[], Some(anonymous)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(&app, "DELETE", "/jsonapi/node--article/a1", &[], None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_relationship_mutations() {
    let app = app();
    let uri = "/jsonapi/node--article/a3/relationships/tags";

    let add = json!({"data": [{"type": "taxonomy_term--tags", "id": "t2"}]});
    let (status, _, _) = send(&app, "POST", uri, EDITOR, Some(add)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let add = json!({"data": [{"type": "taxonomy_term--tags", "id": "t1"}, {"type": "taxonomy_term--tags", "id": "t2"}]});
    let (status, _, json) = send(&app, "POST", uri, EDITOR, Some(add)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec!["t2", "t1"]);

    let remove = json!({"data": [{"type": "taxonomy_term--tags", "id": "t2"}]});
    let (status, _, _) = send(&app, "DELETE", uri, EDITOR, Some(remove)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, _, json) = get(&app, uri, EDITOR).await;
    assert_eq!(ids(&json), vec!["t1"]);

    let replace = json!({"data": {"type": "user--user", "id": "u2"}});
    let (status, _, _) = send(&app, "PATCH", "/jsonapi/node--article/a3/relationships/author", EDITOR, Some(replace)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, _, json) = get(&app, "/jsonapi/node--article/a3/author", EDITOR).await;
    assert_eq!(json["data"]["id"], "u2");
}

// =============================================================================
// Protocol
// =============================================================================

#[tokio::test]
async fn test_media_type_parameters_rejected() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/jsonapi/node--article")
        .header("content-type", "application/vnd.api+json; charset=utf-8")
        .header("x-account-id", "1")
        .header("x-account-roles", "editor")
        .body(Body::from(r#"{"data":{"type":"node--article","attributes":{"title":"x"}}}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_read_only_rejects_writes() {
    let api = ApiConfig {
        read_only: true,
        ..ApiConfig::default()
    };
    let app = app_with(api);
    let body = json!({"data": {"type": "node--article", "attributes": {"title": "x"}}});
    let (status, _, json) = send(&app, "POST", "/jsonapi/node--article", EDITOR, Some(body)).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json["errors"][0]["status"], "405");

    let (status, _, _) = get(&app, "/jsonapi/node--article", &[]).await;
    assert_eq!(status, StatusCode::OK);
}
