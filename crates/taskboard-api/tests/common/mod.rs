//! Shared helpers for the API integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;
use taskboard_api::{ApiServer, ApiServerConfig, AppState};
use tower::ServiceExt; // For `oneshot` method
use uuid::Uuid;

pub const TEST_SECRET: &str = "test-secret";
pub const TEST_PASSWORD: &str = "SecurePassword123!";

/// Helper to create an in-memory database with migrations applied
pub async fn create_test_db() -> DatabaseConnection {
    let db = taskboard_db::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    taskboard_db::migrate(&db)
        .await
        .expect("Failed to run migrations");

    db
}

/// Helper to create a test API server
pub fn create_test_server(db: DatabaseConnection, allow_signup: bool) -> ApiServer {
    let config = ApiServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        jwt_secret: TEST_SECRET.to_string(),
        allow_signup,
        ..ApiServerConfig::default()
    };

    ApiServer::new(config, db).unwrap()
}

/// A registered user and their session token
pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_signup(true).await
    }

    pub async fn with_signup(allow_signup: bool) -> Self {
        let server = create_test_server(create_test_db().await, allow_signup);
        Self {
            router: server.build_router(),
            state: server.state(),
        }
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().uri(uri).method(method);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send a request and decode the JSON body (`Null` for empty bodies)
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.send(method, uri, token, body).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        if bytes.is_empty() {
            return (status, Value::Null);
        }
        let value = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            panic!(
                "Non-JSON body for {} {} ({}): {} ({})",
                method,
                uri,
                status,
                String::from_utf8_lossy(&bytes),
                e
            )
        });
        (status, value)
    }

    pub async fn register(&self, name: &str, email: &str) -> TestUser {
        let (status, body) = self
            .call(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({ "name": name, "email": email, "password": TEST_PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

        TestUser {
            id: body["user"]["id"].as_str().unwrap().parse().unwrap(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn create_project(&self, owner: &TestUser, name: &str) -> Uuid {
        let (status, body) = self
            .call(
                "POST",
                "/api/projects",
                Some(&owner.token),
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create project failed: {body}");
        id_of(&body)
    }

    pub async fn add_member(&self, admin: &TestUser, project_id: Uuid, user: &TestUser) {
        let (status, body) = self
            .call(
                "POST",
                &format!("/api/projects/{}/members", project_id),
                Some(&admin.token),
                Some(json!({ "user_id": user.id })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "add member failed: {body}");
    }

    pub async fn create_list(&self, user: &TestUser, project_id: Uuid, title: &str) -> Uuid {
        let (status, body) = self
            .call(
                "POST",
                "/api/lists",
                Some(&user.token),
                Some(json!({ "project_id": project_id, "title": title })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create list failed: {body}");
        id_of(&body)
    }

    pub async fn create_task(&self, user: &TestUser, list_id: Uuid, body: Value) -> Value {
        let mut body = body;
        body["list_id"] = json!(list_id);
        let (status, created) = self
            .call("POST", "/api/tasks", Some(&user.token), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create task failed: {created}");
        created
    }
}

pub fn id_of(body: &Value) -> Uuid {
    body["id"].as_str().unwrap().parse().unwrap()
}

pub fn error_code(body: &Value) -> Option<&str> {
    body["code"].as_str()
}
