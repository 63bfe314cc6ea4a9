//! Fixtures for route tests that run against a real database.
//!
//! Pair with `#[sqlx::test]`, which hands each test a freshly migrated
//! pool. Redis is replaced by an offline cache and Dropbox runs in mock
//! mode, so only Postgres has to be reachable.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use crate::app::{create_app, AppState};
use crate::auth::{Claims, TokenVerifier};
use crate::config::Settings;
use crate::services::{DropboxClient, LlmClient, LocalAttachmentStore, RedisCache};

const JWT_SECRET: &str = "route-test-secret";
const JWT_AUDIENCE: &str = "authenticated";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    token: String,
    _attachments_dir: TempDir,
}

/// App with default settings
pub async fn test_app(pool: PgPool) -> TestApp {
    test_app_with(pool, &[]).await
}

/// App with extra environment variables layered over the defaults
pub async fn test_app_with(pool: PgPool, vars: &[(&str, &str)]) -> TestApp {
    let attachments_dir = tempfile::tempdir().unwrap();

    let mut env: HashMap<String, String> = HashMap::from([
        ("DATABASE_URL".to_string(), "postgres://unused".to_string()),
        ("AUTH_JWT_SECRET".to_string(), JWT_SECRET.to_string()),
        ("LLM_API_URL".to_string(), "http://127.0.0.1:9/v1".to_string()),
    ]);
    env.extend(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    let settings = Settings::from_lookup(|key| env.get(key).cloned()).unwrap();

    let llm_client = LlmClient::new(
        &settings.llm_api_url,
        &settings.llm_model,
        None,
        1,
        settings.llm_max_tokens,
    )
    .unwrap();

    let state = Arc::new(AppState {
        db: pool,
        token_verifier: TokenVerifier::new(JWT_SECRET, JWT_AUDIENCE, None),
        cache: RedisCache::offline(settings.redis_cache_ttl_seconds),
        llm_client,
        dropbox: DropboxClient::new(&settings.dropbox).unwrap(),
        xero: None,
        attachments: Arc::new(LocalAttachmentStore::new(attachments_dir.path()).await.unwrap()),
        http_client: reqwest::Client::new(),
        settings,
    });

    TestApp {
        router: create_app(state.clone()),
        state,
        token: bearer_token(),
        _attachments_dir: attachments_dir,
    }
}

fn bearer_token() -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: "staff-1".to_string(),
        aud: JWT_AUDIENCE.to_string(),
        exp: now + 3600,
        iat: Some(now),
        iss: None,
        name: Some("Tom".to_string()),
        email: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

impl TestApp {
    /// Authenticated request builder for `uri`
    pub fn request(&self, method: Method, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
    }

    /// Send a request and decode the JSON body (`Null` when empty)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    /// Authenticated call with an optional JSON body
    pub async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(json) => self
                .request(method, uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => self.request(method, uri).body(Body::empty()),
        };
        self.send(request.unwrap()).await
    }

    /// `data.id` from a created resource
    pub async fn create(&self, uri: &str, body: Value) -> Uuid {
        let (status, json) = self.call(Method::POST, uri, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "POST {} returned {}", uri, json);
        json["data"]["id"].as_str().unwrap().parse().unwrap()
    }

    /// Enquiry converted into a project for `company_id`; returns the project id
    pub async fn project_for(&self, company_id: Uuid) -> Uuid {
        let enquiry_id = self
            .create("/enquiries", serde_json::json!({ "raw_content": "Brand film brief" }))
            .await;
        let (status, body) = self
            .call(
                Method::POST,
                &format!("/enquiries/{}/convert", enquiry_id),
                Some(serde_json::json!({
                    "company_id": company_id,
                    "project_title": "Brand Film",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "conversion returned {}", body);
        body["data"]["project_id"].as_str().unwrap().parse().unwrap()
    }
}
