//! Shared helpers for integration tests: an app wired to in-memory
//! store/storage implementations, driven through the router without a
//! network listener.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

use service_core::config::Environment;
use user_service::{
    build_router,
    config::{
        AppConfig, DatabaseConfig, JwtConfig, SecurityConfig, StorageConfig, SwaggerConfig,
        SwaggerMode,
    },
    middleware::PolicyTable,
    models::{Role, User},
    services::{
        AuthService, InMemoryUserStore, JwtService, MemoryStorage, UserService, UserStore,
    },
    utils::derive_public_token,
    AppState,
};

pub const TEST_PUBLIC_SECRET: &str = "test-public-secret";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryUserStore>,
    pub storage: Arc<MemoryStorage>,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::spawn_with_ttl(900)
    }

    /// Build the app with a chosen access-token TTL. A negative TTL makes
    /// every issued token already expired, which the refresh tests use.
    pub fn spawn_with_ttl(access_ttl_secs: i64) -> Self {
        let config = test_config(access_ttl_secs);

        let store = Arc::new(InMemoryUserStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let jwt = JwtService::new(&config.jwt).expect("Failed to create JWT service");

        let auth_service = AuthService::new(
            store.clone(),
            jwt.clone(),
            config.security.public_secret.clone(),
        );
        let user_service = UserService::new(store.clone(), storage.clone());

        let state = AppState {
            config,
            store: store.clone(),
            storage: storage.clone(),
            jwt,
            auth_service,
            user_service,
            policies: PolicyTable::routes(),
        };

        let router = build_router(state.clone());

        TestApp {
            router,
            state,
            store,
            storage,
        }
    }

    /// Send a request through the router and return status + parsed body.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request should not fail at the transport level");
        let status = response.status();
        let body = read_json(response).await;
        (status, body)
    }

    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> (StatusCode, serde_json::Value) {
        self.send(json_request(
            Method::POST,
            "/api/auth/register",
            serde_json::json!({
                "email": email,
                "username": username,
                "password": password,
                "confirmPassword": password,
            }),
        ))
        .await
    }

    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> (StatusCode, serde_json::Value) {
        self.send(json_request(
            Method::POST,
            "/api/auth/login",
            serde_json::json!({
                "email": identifier,
                "password": password,
            }),
        ))
        .await
    }

    /// Valid `x-public-token` value for the given client ip.
    pub fn public_token_for(&self, ip: &str) -> String {
        derive_public_token(TEST_PUBLIC_SECRET, ip)
    }

    /// Insert a user directly into the store and mint an access token for
    /// them.
    pub async fn seed_user(&self, email: &str, username: &str, role: Role) -> (Uuid, String) {
        let mut user = User::new(
            email.to_string(),
            username.to_string(),
            "$argon2id$test-digest".to_string(),
        );
        user.role = role.as_str().to_string();
        let user = self
            .store
            .create_user(user)
            .await
            .expect("seeding user should succeed");

        let token = self
            .state
            .jwt
            .generate_access_token(&user.id.to_string(), role.into())
            .expect("token generation should succeed");

        (user.id, token)
    }
}

pub fn test_config(access_ttl_secs: i64) -> AppConfig {
    AppConfig {
        environment: Environment::Dev,
        service_name: "user-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        port: 0,
        database: DatabaseConfig {
            url: "postgres://unused-in-tests".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: "test-signing-secret".to_string(),
            refresh_secret: "test-refresh-secret".to_string(),
            access_ttl_secs,
            tz_offset_hours: 7,
        },
        security: SecurityConfig {
            public_secret: TEST_PUBLIC_SECRET.to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        storage: StorageConfig {
            upload_dir: "uploads-test".to_string(),
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
    }
}

pub fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

pub async fn read_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

/// Multipart body for the avatar endpoint: a `userId` field plus a `file`
/// field with the given bytes.
pub fn avatar_request(uri: &str, token: &str, user_id: Uuid, bytes: &[u8]) -> Request<Body> {
    let boundary = "test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"userId\"\r\n\r\n{id}\r\n",
            b = boundary,
            id = user_id
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"me.png\"\r\n\
             Content-Type: image/png\r\n\r\n",
            b = boundary
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{b}--\r\n", b = boundary).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .expect("request should build")
}
