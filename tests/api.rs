//! HTTP API tests driving the router in-process.

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{OWNER, TestTree};
use treestore::server::extract::{TOKEN_HEADER, USER_HEADER};
use treestore::server::{AppState, create_router};

struct TestApp {
    // Keeps the temp directory alive.
    _temp_dir: tempfile::TempDir,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let TestTree { temp_dir, tree, .. } = TestTree::new();
        Self {
            _temp_dir: temp_dir,
            router: create_router(Arc::new(AppState::new(tree))),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        };
        (status, body)
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        self.send(request).await
    }

    async fn create_project(&self, name: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/projects",
                Some(OWNER),
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"].clone()
    }

    async fn root_id(&self, project_id: &str) -> String {
        let (_, body) = self
            .call(
                Method::GET,
                &format!("/api/v1/projects/{project_id}/tree"),
                Some(OWNER),
                None,
            )
            .await;
        body["data"]
            .as_array()
            .and_then(|entries| entries.iter().find(|e| e["path"] == "/"))
            .and_then(|e| e["id"].as_str())
            .expect("root entry")
            .to_string()
    }
}

#[tokio::test]
async fn health_check() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
}

#[tokio::test]
async fn requests_without_user_are_unauthorized() {
    let app = TestApp::new();
    let (status, body) = app
        .call(Method::POST, "/api/v1/projects", None, Some(json!({ "name": "x" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["data"], Value::Null);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn project_lifecycle() {
    let app = TestApp::new();
    let project = app.create_project("thesis").await;
    let id = project["id"].as_str().unwrap();
    assert_eq!(project["owner_id"], OWNER);
    assert_eq!(project["public_access_level"], "private");

    let (status, body) = app
        .call(Method::GET, &format!("/api/v1/projects/{id}"), Some(OWNER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["access"]["privilege_level"], "owner");

    let (status, body) = app
        .call(Method::GET, "/api/v1/projects", Some(OWNER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/v1/projects/{id}"), Some(OWNER), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/projects/{id}/restore"),
            Some(OWNER),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn strangers_get_not_found() {
    let app = TestApp::new();
    let project = app.create_project("private").await;
    let id = project["id"].as_str().unwrap();

    let (status, body) = app
        .call(Method::GET, &format!("/api/v1/projects/{id}/tree"), Some("stranger"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"], Value::Null);

    let (status, _) = app
        .call(
            Method::GET,
            "/api/v1/projects/does-not-exist/tree",
            Some(OWNER),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn folder_and_doc_operations() {
    let app = TestApp::new();
    let project = app.create_project("paper").await;
    let id = project["id"].as_str().unwrap();
    let root = app.root_id(id).await;

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/projects/{id}/folders"),
            Some(OWNER),
            Some(json!({ "parent_id": root, "name": "figures" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let folder_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/projects/{id}/docs"),
            Some(OWNER),
            Some(json!({ "parent_id": folder_id, "name": "fig1.tex" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["path"], "/figures/fig1.tex");

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/projects/{id}/docs"),
            Some(OWNER),
            Some(json!({ "parent_id": folder_id, "name": "fig1.tex" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/projects/{id}/folders/{folder_id}/rename"),
            Some(OWNER),
            Some(json!({ "name": "images" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["path"], "/images/");

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/v1/projects/{id}/tree/lookup?path=/images/fig1.tex"),
            Some(OWNER),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["kind"], "doc");

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/projects/{id}/folders/{folder_id}/move"),
            Some(OWNER),
            Some(json!({ "parent_id": folder_id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/projects/{id}/folders"),
            Some(OWNER),
            Some(json!({ "parent_id": root, "name": "a/b" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn ensure_doc_is_idempotent() {
    let app = TestApp::new();
    let project = app.create_project("ensure").await;
    let id = project["id"].as_str().unwrap();
    let root = app.root_id(id).await;
    let request = json!({ "parent_id": root, "name": "main.tex", "snapshot": "hello" });

    let (status, first) = app
        .call(
            Method::PUT,
            &format!("/api/v1/projects/{id}/docs"),
            Some(OWNER),
            Some(request.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, second) = app
        .call(
            Method::PUT,
            &format!("/api/v1/projects/{id}/docs"),
            Some(OWNER),
            Some(request),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["doc_id"], second["data"]["doc_id"]);
}

#[tokio::test]
async fn file_upload_and_download() {
    let app = TestApp::new();
    let project = app.create_project("files").await;
    let id = project["id"].as_str().unwrap();
    let root = app.root_id(id).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!(
            "/api/v1/projects/{id}/files?parent_id={root}&name=logo.png"
        ))
        .header(USER_HEADER, OWNER)
        .body(Body::from(&b"\x89PNG data"[..]))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let file_id = body["data"]["file_id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .uri(format!("/api/v1/projects/{id}/files/{file_id}"))
        .header(USER_HEADER, OWNER)
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"\x89PNG data");

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/v1/projects/{id}/files/{file_id}"),
            Some(OWNER),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/v1/projects/{id}/files/{file_id}"),
            Some(OWNER),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn token_sharing_over_http() {
    let app = TestApp::new();
    let project = app.create_project("shared").await;
    let id = project["id"].as_str().unwrap();

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/v1/projects/{id}/public-access"),
            Some(OWNER),
            Some(json!({ "public_access_level": "tokenBased" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app
        .call(Method::GET, &format!("/api/v1/projects/{id}/tokens"), Some(OWNER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let read_only = body["data"]["read_only"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(Method::GET, &format!("/api/v1/projects/{id}/tokens"), Some("someone"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = Request::builder()
        .uri(format!("/api/v1/projects/{id}/authorization"))
        .header(TOKEN_HEADER, &read_only)
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["privilege_level"], "readOnly");
    assert_eq!(body["data"]["is_token_member"], true);

    let request = Request::builder()
        .uri(format!("/api/v1/projects/{id}/tree"))
        .header(TOKEN_HEADER, "zzzzzzzzzzzz")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn joining_through_a_sharing_link() {
    let app = TestApp::new();
    let project = app.create_project("linked").await;
    let id = project["id"].as_str().unwrap();

    app.call(
        Method::PUT,
        &format!("/api/v1/projects/{id}/public-access"),
        Some(OWNER),
        Some(json!({ "public_access_level": "tokenBased" })),
    )
    .await;
    let (_, body) = app
        .call(Method::GET, &format!("/api/v1/projects/{id}/tokens"), Some(OWNER), None)
        .await;
    let read_and_write = body["data"]["read_and_write"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/tokens/{read_and_write}/join"),
            Some("bob"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["id"], id);
    assert_eq!(body["data"]["access"]["privilege_level"], "readAndWrite");

    let (status, body) = app
        .call(Method::GET, &format!("/api/v1/projects/{id}/tree"), Some("bob"), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = app
        .call(Method::POST, "/api/v1/tokens/zzzzzzzzzzzz/join", Some("bob"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn member_management() {
    let app = TestApp::new();
    let project = app.create_project("team").await;
    let id = project["id"].as_str().unwrap();

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/projects/{id}/members"),
            Some(OWNER),
            Some(json!({ "user_id": "alice", "privilege_level": "readAndWrite" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let epoch = body["data"]["epoch"].as_i64().unwrap();
    assert!(epoch > project["epoch"].as_i64().unwrap());

    let (status, body) = app
        .call(Method::GET, &format!("/api/v1/projects/{id}/members"), Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/v1/projects/{id}/members/alice"),
            Some("alice"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .call(
            Method::DELETE,
            &format!("/api/v1/projects/{id}/members/alice"),
            Some(OWNER),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["epoch"].as_i64().unwrap() > epoch);
}
