//! Shared harness for the HTTP tests. Each [`TestApp`] owns a fresh data
//! directory and drives the real router in-process.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use formdesk::auth::TokenGenerator;
use formdesk::config::ServerConfig;
use formdesk::server::{AppState, create_router};
use formdesk::store::{SqliteStore, Store};

pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    pub admin_token: String,
    _temp_dir: TempDir,
}

/// A user created through the admin API together with a bearer token.
pub struct TestUser {
    pub id: String,
    pub username: String,
    pub token: String,
}

impl TestApp {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            public_base_url: Some("http://forms.test".to_string()),
            ..ServerConfig::default()
        };

        let store = SqliteStore::new(config.db_path()).expect("open store");
        store.initialize().expect("initialize store");

        let (token, admin_token) = TokenGenerator::new()
            .issue(true, None, None)
            .expect("issue admin token");
        store.create_token(&token).expect("store admin token");

        let state = Arc::new(AppState::new(Arc::new(store), config));
        let router = create_router(state.clone());

        Self {
            router,
            state,
            admin_token,
            _temp_dir: temp_dir,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        let mut builder = Request::get(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.request(builder.body(Body::empty()).expect("build request"))
            .await
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.request(
            builder
                .body(Body::from(body.to_string()))
                .expect("build request"),
        )
        .await
    }

    /// Creates a user and a token for it through the admin API.
    pub async fn create_user(&self, username: &str) -> TestUser {
        let response = self
            .post_json(
                "/api/v1/admin/users",
                Some(&self.admin_token),
                json!({ "username": username }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["data"]["id"]
            .as_str()
            .expect("user id")
            .to_string();

        let response = self
            .post_json(
                &format!("/api/v1/admin/users/{id}/tokens"),
                Some(&self.admin_token),
                json!({}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let token = body_json(response).await["data"]["token"]
            .as_str()
            .expect("raw token")
            .to_string();

        TestUser {
            id,
            username: username.to_string(),
            token,
        }
    }

    /// Publishes a small survey owned by `user`.
    pub async fn publish(&self, user: &TestUser, id_string: &str) -> Response {
        self.post_json(
            &format!("/{}", user.username),
            Some(&user.token),
            json!({ "text_xls_form": survey_json(id_string) }),
        )
        .await
    }

    pub async fn edit(&self, user: &TestUser, id_string: &str, body: Value) -> Response {
        let request = Request::post(format!("/{}/forms/{id_string}/edit", user.username))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", user.token))
            .header("x-requested-with", "XMLHttpRequest")
            .body(Body::from(body.to_string()))
            .expect("build request");
        self.request(request).await
    }
}

/// A file part of a multipart form body.
pub struct FilePart<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub data: &'a [u8],
}

impl TestApp {
    /// Posts files to the edit endpoint as an XHR multipart request.
    pub async fn edit_files(&self, user: &TestUser, id_string: &str, parts: &[FilePart<'_>]) -> Response {
        const BOUNDARY: &str = "formdesk-test-boundary";

        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    part.field, part.file_name, part.content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(part.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::post(format!("/{}/forms/{id_string}/edit", user.username))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", user.token))
            .header("x-requested-with", "XMLHttpRequest")
            .body(Body::from(body))
            .expect("build request");
        self.request(request).await
    }
}

pub fn survey_json(id_string: &str) -> String {
    json!({
        "id_string": id_string,
        "title": "Household survey",
        "children": [
            {"type": "text", "name": "name", "label": "Name"},
            {"type": "integer", "name": "age", "label": "Age"}
        ]
    })
    .to_string()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes()
        .to_vec()
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).expect("utf-8 body")
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("JSON body")
}
