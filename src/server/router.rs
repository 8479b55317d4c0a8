//! HTTP router for authgate
//!
//! This module defines the axum router. It provides routes for:
//! - Health checks
//! - Login, token refresh and logout
//! - The caller's profile

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::AuthOrchestrator;
use crate::directory::UserDirectory;
use crate::models::{AccessToken, TokenPair};
use crate::otel::Metrics;
use crate::store::{round_trip, KeyValueStore};

use super::middleware::{
    bearer_auth_middleware, logging_middleware, metrics_middleware, role_guard_middleware,
    tracing_middleware, AuthResponse, AuthenticatedUser, ADMIN_ROLES,
};

/// Minimum password length accepted by the login endpoint
const MIN_PASSWORD_LEN: usize = 6;

/// Shared application state
pub struct AppState<U: UserDirectory> {
    /// Login, refresh and logout
    pub orchestrator: Arc<AuthOrchestrator<U>>,

    /// Key-value store, for the health endpoint
    pub store: Arc<dyn KeyValueStore>,

    /// Auth metrics; `None` disables recording
    pub metrics: Option<Arc<Metrics>>,
}

impl<U: UserDirectory> Clone for AppState<U> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            store: Arc::clone(&self.store),
            metrics: self.metrics.clone(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Login request body
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    /// Shape check only; credentials are verified by the orchestrator
    pub fn validate(&self) -> Result<(), String> {
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err("email must be a valid email address".to_string()),
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            ));
        }
        Ok(())
    }
}

/// Refresh request body
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Caller profile
#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub sub: String,
    pub email: String,
    pub roles: Vec<String>,
}

/// Build the application router
pub fn build_router<U: UserDirectory + 'static>(state: AppState<U>) -> Router {
    let authenticated = Router::new()
        .route("/auth/logout", post(logout_handler::<U>))
        .route("/users/profile", get(profile_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_middleware::<U>,
        ));

    let admin = Router::new()
        .route("/health/store", get(store_health_handler::<U>))
        .route_layer(middleware::from_fn_with_state(
            ADMIN_ROLES,
            role_guard_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_middleware::<U>,
        ));

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/ping", get(ping_handler))
        .route("/auth/login", post(login_handler::<U>))
        .route("/auth/refresh", post(refresh_handler::<U>))
        .merge(authenticated)
        .merge(admin);

    if let Some(metrics) = state.metrics.clone() {
        router = router.route_layer(middleware::from_fn_with_state(metrics, metrics_middleware));
    }

    router
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(tracing_middleware))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn ping_handler() -> &'static str {
    "pong"
}

async fn login_handler<U: UserDirectory + 'static>(
    State(state): State<AppState<U>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, AuthResponse> {
    let Json(request) = body.map_err(|e| AuthResponse::bad_request(e.body_text()))?;
    request.validate().map_err(AuthResponse::bad_request)?;

    let result = state
        .orchestrator
        .login(&request.email, &request.password)
        .await;

    if let Some(metrics) = &state.metrics {
        metrics.record_login(&result);
    }

    let window = state.orchestrator.limiter().config().window;
    result
        .map(Json)
        .map_err(|e| AuthResponse::from_error(e).with_retry_after(window))
}

async fn refresh_handler<U: UserDirectory + 'static>(
    State(state): State<AppState<U>>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<AccessToken>, AuthResponse> {
    let Json(request) = body.map_err(|e| AuthResponse::bad_request(e.body_text()))?;

    let result = state.orchestrator.refresh(&request.refresh_token).await;

    if let Some(metrics) = &state.metrics {
        metrics.record_refresh(&result);
    }

    result.map(Json).map_err(AuthResponse::from_error)
}

async fn logout_handler<U: UserDirectory + 'static>(
    State(state): State<AppState<U>>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> Result<StatusCode, AuthResponse> {
    state
        .orchestrator
        .logout(&claims.sub)
        .await
        .map_err(AuthResponse::from_error)?;

    if let Some(metrics) = &state.metrics {
        metrics.record_logout();
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn profile_handler(
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        sub: claims.sub,
        email: claims.email,
        roles: claims.roles,
    })
}

async fn store_health_handler<U: UserDirectory + 'static>(
    State(state): State<AppState<U>>,
) -> Response {
    match round_trip(state.store.as_ref()).await {
        Ok(()) => Json(serde_json::json!({
            "status": "ok",
            "store": "pong",
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(store = state.store.name(), error = %e, "Store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "error",
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::clock::ManualClock;
    use crate::directory::MockUserDirectory;
    use crate::models::{Identity, TokenKind};
    use crate::store::MemoryStore;
    use axum_test::TestServer;

    fn create_test_state(directory: MockUserDirectory) -> AppState<MockUserDirectory> {
        let clock = Arc::new(ManualClock::starting_now());
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::with_clock(clock.clone()));
        let orchestrator = AuthOrchestrator::with_clock(
            Arc::new(directory),
            Arc::clone(&store),
            AuthConfig::new("router-secret"),
            clock,
        );

        AppState {
            orchestrator: Arc::new(orchestrator),
            store,
            metrics: None,
        }
    }

    fn access_token(state: &AppState<MockUserDirectory>, roles: &[&str]) -> String {
        let identity = Identity {
            id: "u1".to_string(),
            email: "a@x.com".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        state
            .orchestrator
            .issuer()
            .issue(&identity, TokenKind::Access)
            .unwrap()
    }

    // Test 1: Health endpoint returns OK
    #[tokio::test]
    async fn test_health_endpoint_returns_ok() {
        let server = TestServer::new(build_router(create_test_state(MockUserDirectory::new())))
            .unwrap();

        let response = server.get("/health").await;
        response.assert_status_ok();

        let body: HealthResponse = response.json();
        assert_eq!(body.status, "healthy");
        assert!(!body.version.is_empty());
    }

    // Test 2: Ping returns pong
    #[tokio::test]
    async fn test_ping() {
        let server = TestServer::new(build_router(create_test_state(MockUserDirectory::new())))
            .unwrap();

        let response = server.get("/auth/ping").await;
        response.assert_status_ok();
        response.assert_text("pong");
    }

    // Test 3: Malformed login bodies are 400 and never reach the directory
    #[tokio::test]
    async fn test_login_bad_shape() {
        let mut directory = MockUserDirectory::new();
        directory.expect_find_by_email().times(0);
        let server = TestServer::new(build_router(create_test_state(directory))).unwrap();

        let response = server
            .post("/auth/login")
            .json(&serde_json::json!({ "email": "not-an-email", "password": "secret1" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let response = server
            .post("/auth/login")
            .json(&serde_json::json!({ "email": "a@x.com", "password": "short" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let response = server
            .post("/auth/login")
            .json(&serde_json::json!({ "email": "a@x.com" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    // Test 4: Unknown user gets 401 with an error body
    #[tokio::test]
    async fn test_login_unknown_user() {
        let mut directory = MockUserDirectory::new();
        directory.expect_find_by_email().returning(|_| Ok(None));
        let server = TestServer::new(build_router(create_test_state(directory))).unwrap();

        let response = server
            .post("/auth/login")
            .json(&serde_json::json!({ "email": "a@x.com", "password": "secret1" }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = response.json();
        assert_eq!(body["error"], "Invalid credentials");
    }

    // Test 5: Profile requires a bearer token
    #[tokio::test]
    async fn test_profile_requires_auth() {
        let state = create_test_state(MockUserDirectory::new());
        let token = access_token(&state, &["user"]);
        let server = TestServer::new(build_router(state)).unwrap();

        server
            .get("/users/profile")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        server
            .get("/users/profile")
            .add_header(
                axum::http::header::AUTHORIZATION,
                axum::http::HeaderValue::from_static("Basic YWRtaW46YWRtaW4="),
            )
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let response = server
            .get("/users/profile")
            .authorization_bearer(token)
            .await;
        response.assert_status_ok();

        let body: ProfileResponse = response.json();
        assert_eq!(body.sub, "u1");
        assert_eq!(body.roles, vec!["user"]);
    }

    // Test 6: Store health requires an admin role
    #[tokio::test]
    async fn test_store_health_requires_admin() {
        let state = create_test_state(MockUserDirectory::new());
        let user_token = access_token(&state, &["user"]);
        let admin_token = access_token(&state, &["admin"]);
        let server = TestServer::new(build_router(state)).unwrap();

        server
            .get("/health/store")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        server
            .get("/health/store")
            .authorization_bearer(user_token)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let response = server
            .get("/health/store")
            .authorization_bearer(admin_token)
            .await;
        response.assert_status_ok();

        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "pong");
    }

    // Test 7: Refresh token is not accepted as a bearer credential
    #[tokio::test]
    async fn test_refresh_token_not_bearer() {
        let state = create_test_state(MockUserDirectory::new());
        let identity = Identity {
            id: "u1".to_string(),
            email: "a@x.com".to_string(),
            roles: vec![],
        };
        let refresh = state
            .orchestrator
            .issuer()
            .issue(&identity, TokenKind::Refresh)
            .unwrap();
        let server = TestServer::new(build_router(state)).unwrap();

        server
            .get("/users/profile")
            .authorization_bearer(refresh)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    // Test 8: LoginRequest shape validation
    #[test]
    fn test_login_request_validate() {
        let ok = LoginRequest {
            email: "a@x.com".to_string(),
            password: "secret".to_string(),
        };
        assert!(ok.validate().is_ok());

        let no_domain = LoginRequest {
            email: "a@".to_string(),
            password: "secret".to_string(),
        };
        assert!(no_domain.validate().is_err());
    }
}
