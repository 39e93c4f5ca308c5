//! Shared harness for the HTTP integration tests.
//!
//! Builds the router over in-memory stores and a recording mail sender, and
//! carries session cookies between requests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use hackathon::{
    api::build_router,
    auth::account::{NewAccount, Role},
    auth::SessionTokenIssuer,
    domain::AccountId,
    config::{AppConfig, StorageBackend},
    errors::{HackathonError, Result},
    mail::{MailSender, OutboundMail},
    startup::{build_state, Stores},
};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Records every message; can be switched to fail all sends.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundMail>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().expect("mailer lock").clone()
    }

    pub fn sent_to(&self, email: &str) -> Vec<OutboundMail> {
        self.sent().into_iter().filter(|mail| mail.to == email).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().expect("mailer lock").clear();
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, mail: OutboundMail) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HackathonError::mail("SMTP relay unreachable"));
        }
        self.sent.lock().expect("mailer lock").push(mail);
        Ok(())
    }
}

/// Session cookies captured from a response.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

impl Session {
    fn header_value(&self) -> Option<String> {
        let parts: Vec<String> = [("jwt", &self.access), ("refresh_token", &self.refresh)]
            .into_iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| format!("{name}={v}")))
            .collect();
        (!parts.is_empty()).then(|| parts.join("; "))
    }

    /// Apply captured `Set-Cookie` values on top of this session.
    pub fn absorb(&mut self, set_cookies: &[String]) {
        for raw in set_cookies {
            let pair = raw.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else { continue };
            let value = (!value.is_empty()).then(|| value.to_string());
            match name.trim() {
                "jwt" => self.access = value,
                "refresh_token" => self.refresh = value,
                _ => {}
            }
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub set_cookies: Vec<String>,
}

impl TestResponse {
    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }

    pub fn data(&self) -> &Value {
        &self.body["data"]
    }
}

pub struct TestApp {
    pub config: AppConfig,
    pub stores: Stores,
    pub mailer: Arc<RecordingMailer>,
    router: Router,
    profiles: AtomicU32,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.backend = StorageBackend::Memory;
    config.auth.jwt_secret = "integration-test-secret-at-least-32-bytes".to_string();
    config.auth.cookie_secure = false;
    config.auth.password_memory_kib = 1024;
    config.auth.password_iterations = 1;
    config
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let stores = Stores::memory();
        let mailer = Arc::new(RecordingMailer::default());
        let state = build_state(&config, &stores, mailer.clone()).expect("build state");
        let router = build_router(state, &config.server);
        Self { config, stores, mailer, router, profiles: AtomicU32::new(0) }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        session: Option<&Session>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(cookie) = session.and_then(Session::header_value) {
            builder = builder.header(header::COOKIE, cookie);
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json).expect("serialize body")))
                .expect("build request"),
            None => builder.body(Body::empty()).expect("build request"),
        };

        let response = self.router().oneshot(request).await.expect("request");
        let status = response.status();
        let set_cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();

        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read response body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse json response")
        };
        TestResponse { status, body: value, set_cookies }
    }

    /// Send and fold any returned cookies into `session`.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        session: &mut Session,
        body: Option<Value>,
    ) -> TestResponse {
        let response = self.send(method, path, Some(session), body).await;
        session.absorb(&response.set_cookies);
        response
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.send(Method::POST, path, None, Some(body)).await
    }

    /// Live passcode for `email`, read straight from the cache.
    pub async fn passcode_for(&self, email: &str) -> Option<String> {
        self.stores.passcodes.get(email).await.expect("passcode cache")
    }

    pub async fn signup(&self, email: &str) -> (TestResponse, Session) {
        let mut session = Session::default();
        let response = self
            .call(
                Method::POST,
                "/auth/signup",
                &mut session,
                Some(json!({ "email": email, "password": TEST_PASSWORD })),
            )
            .await;
        (response, session)
    }

    pub async fn verify(&self, email: &str) -> TestResponse {
        let code = self.passcode_for(email).await.expect("live passcode");
        self.post("/auth/verify-passcode", json!({ "email": email, "passcode": code })).await
    }

    pub async fn login(&self, email: &str, password: &str) -> (TestResponse, Session) {
        let mut session = Session::default();
        let response = self
            .call(
                Method::POST,
                "/auth/login",
                &mut session,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        (response, session)
    }

    pub fn profile_body(&self) -> Value {
        let n = self.profiles.fetch_add(1, Ordering::SeqCst);
        json!({
            "firstName": "Ada",
            "lastName": "Lovelace",
            "phoneNo": format!("98{:08}", n),
            "gender": "F",
            "regNo": format!("21BCE{:04}", n),
            "githubProfile": format!("https://github.com/ada{}", n),
        })
    }

    /// Signed up, verified and profile complete.
    pub async fn active_account(&self, email: &str) -> Session {
        let (response, mut session) = self.signup(email).await;
        assert_eq!(response.status, StatusCode::CREATED, "signup: {}", response.body);
        let response = self.verify(email).await;
        assert_eq!(response.status, StatusCode::OK, "verify: {}", response.body);

        let profile = self.profile_body();
        let response =
            self.call(Method::POST, "/auth/complete-profile", &mut session, Some(profile)).await;
        assert_eq!(response.status, StatusCode::OK, "complete profile: {}", response.body);
        session
    }

    /// Verified admin account with a session minted directly.
    pub async fn admin_session(&self, email: &str) -> Session {
        let admin = self
            .stores
            .accounts
            .create_account(NewAccount {
                id: AccountId::new(),
                email: email.to_string(),
                password_hash: "unused".to_string(),
                role: Role::Admin,
            })
            .await
            .expect("create admin");
        self.stores.accounts.mark_verified(email).await.expect("verify admin");

        let pair = SessionTokenIssuer::from_config(&self.config.auth)
            .issue_pair(&admin.id)
            .expect("issue admin tokens");
        Session { access: Some(pair.access_token), refresh: Some(pair.refresh_token) }
    }

    pub async fn create_team(&self, session: &mut Session, name: &str) -> TestResponse {
        self.call(Method::POST, "/team/create", session, Some(json!({ "name": name }))).await
    }

    pub async fn join_team(&self, session: &mut Session, code: &str) -> TestResponse {
        self.call(Method::POST, "/team/join", session, Some(json!({ "code": code }))).await
    }
}
