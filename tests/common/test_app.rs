//! Test application setup utilities
//!
//! Provides utilities for setting up test instances of the application
//! with throwaway databases and seeded reference data.

use std::sync::Arc;

use axum::{body::Body, http::Request, Router};
use chrono::Utc;
use tower::ServiceExt;
use uuid::Uuid;

use schoolbase::{
    api, audit,
    config::{AppConfig, AuditConfig, AuthConfig, DatabaseConfig, LoggingConfig, ServerConfig},
    db,
    db::ReferenceRepository,
    middleware,
    middleware::auth::create_access_token,
    models::{School, User},
    services::AuthService,
    AppState,
};

pub const ADMIN_EMAIL: &str = "admin@rivertown.test";
pub const STAFF_EMAIL: &str = "staff@rivertown.test";
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Test application wrapper for integration testing
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub school: School,
    pub admin: User,
    pub staff: User,
}

impl TestApp {
    /// Create a new test application with a throwaway SQLite database,
    /// one school, and one admin and one staff user.
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Create a new test application with custom configuration
    pub async fn with_config(config: AppConfig) -> Self {
        let db = db::init_pool(&config.database)
            .await
            .expect("Failed to initialize test database");

        let registry = Arc::new(
            audit::PolicyRegistry::load(db.clone())
                .await
                .expect("Failed to load audit policies"),
        );
        let engine = Arc::new(audit::AuditEngine::new(db.clone(), registry.clone()));

        let state = AppState {
            config,
            db,
            registry,
            audit: engine,
        };

        let school = seed_school(&state, "Rivertown Elementary").await;
        let admin = seed_user(&state, school.id, ADMIN_EMAIL, "Ada Admin", "admin").await;
        let staff = seed_user(&state, school.id, STAFF_EMAIL, "Sam Staff", "staff").await;

        let router = Router::new()
            .nest(
                "/api/v1",
                api::public_routes().layer(axum::middleware::from_fn(
                    middleware::actor_context_middleware,
                )),
            )
            .nest(
                "/api/v1",
                api::protected_routes()
                    .layer(axum::middleware::from_fn(
                        middleware::actor_context_middleware,
                    ))
                    .layer(axum::middleware::from_fn_with_state(
                        state.clone(),
                        middleware::auth::auth_middleware,
                    )),
            )
            .with_state(state.clone());

        Self {
            router,
            state,
            school,
            admin,
            staff,
        }
    }

    /// Issue a token for the seeded admin user
    pub fn admin_token(&self) -> String {
        self.token_for(&self.admin)
    }

    /// Issue a token for the seeded staff user
    pub fn staff_token(&self) -> String {
        self.token_for(&self.staff)
    }

    pub fn token_for(&self, user: &User) -> String {
        create_access_token(
            &user.id,
            Some(&user.school_id),
            &user.email,
            &user.role,
            &self.state.config.auth.jwt_secret,
            self.state.config.auth.access_token_expiry_hours,
        )
        .expect("Failed to create test token")
    }

    /// Make a GET request to the test application
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Make an authenticated GET request
    pub async fn get_auth(&self, uri: &str, token: &str) -> TestResponse {
        self.request(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Make a POST request with JSON body
    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> TestResponse {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Make an authenticated POST request with JSON body
    pub async fn post_json_auth(
        &self,
        uri: &str,
        body: serde_json::Value,
        token: &str,
    ) -> TestResponse {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Make an authenticated POST request with an empty body
    pub async fn post_auth(&self, uri: &str, token: &str) -> TestResponse {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Make an authenticated PUT request with JSON body
    pub async fn put_json_auth(
        &self,
        uri: &str,
        body: serde_json::Value,
        token: &str,
    ) -> TestResponse {
        self.request(
            Request::builder()
                .method("PUT")
                .uri(uri)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Make an arbitrary request
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: axum::http::StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: bytes::Bytes,
}

impl TestResponse {
    /// Get the response body as a string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parse the response body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse response as JSON")
    }

    /// Assert the response status
    pub fn assert_status(&self, expected: axum::http::StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Assert the response status is OK (200)
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::OK)
    }

    /// Assert the response status is Bad Request (400)
    pub fn assert_bad_request(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::BAD_REQUEST)
    }

    /// Assert the response status is Unauthorized (401)
    pub fn assert_unauthorized(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::UNAUTHORIZED)
    }

    /// Assert the response status is Forbidden (403)
    pub fn assert_forbidden(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::FORBIDDEN)
    }

    /// Assert the response status is Not Found (404)
    pub fn assert_not_found(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::NOT_FOUND)
    }
}

/// Create a test configuration with a throwaway SQLite database
pub fn test_config() -> AppConfig {
    // Unique temp file per test to avoid conflicts
    let db_path = format!(
        "/tmp/schoolbase_test_{}.db",
        Uuid::new_v4().to_string().replace('-', "")
    );

    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            workers: 1,
        },
        database: DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", db_path),
            max_connections: 1,
            connect_timeout_secs: 30,
        },
        auth: AuthConfig {
            jwt_secret: "test_secret_key_that_is_at_least_32_bytes_long".to_string(),
            access_token_expiry_hours: 24,
        },
        logging: LoggingConfig::default(),
        audit: AuditConfig {
            sweep_enabled: false,
            ..AuditConfig::default()
        },
    }
}

async fn seed_school(state: &AppState, name: &str) -> School {
    let school = School {
        id: Uuid::new_v4(),
        name: name.to_string(),
        phone: Some("555-0100".to_string()),
        address: Some("1 River St".to_string()),
        created_at: Utc::now(),
    };
    ReferenceRepository::new(&state.db)
        .insert_school(&school)
        .await
        .expect("Failed to seed school");
    school
}

async fn seed_user(
    state: &AppState,
    school_id: Uuid,
    email: &str,
    full_name: &str,
    role: &str,
) -> User {
    let user = User {
        id: Uuid::new_v4(),
        school_id,
        email: email.to_string(),
        full_name: full_name.to_string(),
        role: role.to_string(),
        password_hash: AuthService::hash_password(TEST_PASSWORD).expect("Failed to hash password"),
        active: true,
        created_at: Utc::now(),
    };
    ReferenceRepository::new(&state.db)
        .insert_user(&user)
        .await
        .expect("Failed to seed user");
    user
}
