#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, Response, StatusCode},
    Router,
};
use schoolhub::{
    api::{build_router, ApiState},
    config::AppConfig,
    errors::{Result, SchoolError},
    mail::{Mailer, SetupEmail, SharedMailer},
    storage::{create_pool, DbPool},
};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const MEMBER_PASSWORD: &str = "correct-horse-battery";

/// Mailer that keeps every message so tests can follow setup links.
#[derive(Default)]
pub struct CapturingMailer {
    sent: Mutex<Vec<SetupEmail>>,
}

impl CapturingMailer {
    pub fn sent(&self) -> Vec<SetupEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// Token value from the most recent link mailed to `email`.
    pub fn token_for(&self, email: &str) -> String {
        let sent = self.sent.lock().unwrap();
        let message = sent
            .iter()
            .rev()
            .find(|m| m.recipient == email)
            .unwrap_or_else(|| panic!("no setup email sent to {email}"));
        message.setup_link.split("token=").nth(1).expect("token in setup link").to_string()
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send_setup_email(&self, email: &SetupEmail) -> Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Mailer whose SMTP server is always down.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send_setup_email(&self, _email: &SetupEmail) -> Result<()> {
        Err(SchoolError::internal("connection refused"))
    }
}

pub struct TestApp {
    state: ApiState,
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<CapturingMailer>,
}

pub async fn setup_test_app() -> TestApp {
    build_app("sqlite::memory:", None).await
}

/// App whose setup emails always fail to send.
pub async fn setup_test_app_with_failing_mail() -> TestApp {
    build_app("sqlite::memory:", Some(Arc::new(FailingMailer))).await
}

/// App over a database file, so the pool can hand out several connections.
pub async fn setup_file_backed_app(dir: &Path) -> TestApp {
    let url = format!("sqlite://{}", dir.join("school.db").display());
    build_app(&url, None).await
}

async fn build_app(url: &str, mailer: Option<SharedMailer>) -> TestApp {
    let mut config = AppConfig::default();
    config.database.url = url.to_string();
    config.database.max_connections = 5;
    config.database.auto_migrate = true;
    let config = Arc::new(config);

    let pool = create_pool(&config.database).await.expect("create sqlite pool");

    let capturing = Arc::new(CapturingMailer::default());
    let mailer = mailer.unwrap_or_else(|| capturing.clone() as SharedMailer);
    let state = ApiState::new(config.clone(), pool.clone(), mailer).expect("build api state");

    TestApp { state, pool, config, mailer: capturing }
}

impl TestApp {
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn state(&self) -> &ApiState {
        &self.state
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("build request"),
            None => builder.body(Body::empty()).expect("build request"),
        };

        self.router().oneshot(request).await.expect("router response")
    }

    pub async fn send_form(&self, path: &str, form: &str) -> Response<Body> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .expect("build request");

        self.router().oneshot(request).await.expect("router response")
    }

    pub async fn login(&self, email: &str, password: &str) -> Response<Body> {
        self.send(
            Method::POST,
            "/auth/login-json",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    pub async fn login_token(&self, email: &str, password: &str) -> String {
        let response = self.login(email, password).await;
        assert_eq!(response.status(), StatusCode::OK, "login failed for {email}");
        let body = read_json(response).await;
        body["access_token"].as_str().expect("access_token").to_string()
    }

    /// Run the bootstrap endpoint and sign in as the configured super admin.
    pub async fn super_admin_token(&self) -> String {
        let response = self.send(Method::POST, "/super-admin/setup", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let super_admin = &self.config.auth.super_admin;
        self.login_token(&super_admin.email, &super_admin.password).await
    }

    pub async fn create_school(&self, super_admin_token: &str, name: &str) -> i64 {
        let response = self
            .send(
                Method::POST,
                "/super-admin/schools",
                Some(super_admin_token),
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        read_json(response).await["id"].as_i64().expect("school id")
    }

    pub async fn set_password(&self, token: &str, password: &str) -> Response<Body> {
        self.send(
            Method::POST,
            "/auth/set-password",
            None,
            Some(json!({ "token": token, "new_password": password })),
        )
        .await
    }

    /// Create an account through `path`, follow its setup link and sign in.
    /// Returns the new user id and an access token.
    pub async fn onboard(
        &self,
        inviter_token: &str,
        path: &str,
        name: &str,
        email: &str,
    ) -> (i64, String) {
        let response = self
            .send(
                Method::POST,
                path,
                Some(inviter_token),
                Some(json!({ "name": name, "email": email })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED, "create {email} via {path}");
        let user_id = read_json(response).await["id"].as_i64().expect("user id");

        let setup_token = self.mailer.token_for(email);
        let response = self.set_password(&setup_token, MEMBER_PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK);

        (user_id, self.login_token(email, MEMBER_PASSWORD).await)
    }

    /// A school with one signed-in administrator.
    pub async fn school_with_admin(
        &self,
        super_admin_token: &str,
        school_name: &str,
        admin_email: &str,
    ) -> (i64, String) {
        let school_id = self.create_school(super_admin_token, school_name).await;
        let path = format!("/super-admin/schools/{}/admins", school_id);
        let (_, token) = self.onboard(super_admin_token, &path, "Head Admin", admin_email).await;
        (school_id, token)
    }
}

pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
