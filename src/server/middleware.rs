//! HTTP middleware for authgate
//!
//! This module provides middleware for:
//! - Bearer access token authentication
//! - Role checks on authenticated routes
//! - Request logging, metrics and tracing spans

use axum::{
    extract::{MatchedPath, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::has_any_role;
use crate::directory::UserDirectory;
use crate::error::AuthError;
use crate::models::TokenClaims;
use crate::otel::Metrics;

use super::router::AppState;

/// Roles allowed on administrative routes
pub const ADMIN_ROLES: &[&str] = &["superadmin", "admin"];

/// Claims of the caller, inserted by [`bearer_auth_middleware`]
#[derive(Clone, Debug)]
pub struct AuthenticatedUser(pub TokenClaims);

/// Bearer token middleware
///
/// Accepts `Authorization: Bearer <access token>` only; refresh tokens are
/// rejected. On success the caller's claims are added to the request
/// extensions.
pub async fn bearer_auth_middleware<U: UserDirectory + 'static>(
    State(state): State<AppState<U>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthResponse> {
    let token = match request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        Some(value) => value
            .strip_prefix("Bearer ")
            .ok_or_else(AuthResponse::unsupported_scheme)?
            .trim()
            .to_string(),
        None => return Err(AuthResponse::missing_auth()),
    };

    let claims = state
        .orchestrator
        .authenticate(&token)
        .map_err(AuthResponse::from_error)?;

    request.extensions_mut().insert(AuthenticatedUser(claims));

    Ok(next.run(request).await)
}

/// Role guard middleware
///
/// Must run after [`bearer_auth_middleware`]. Lets the request through when
/// the caller holds any of `roles`.
pub async fn role_guard_middleware(
    State(roles): State<&'static [&'static str]>,
    request: Request,
    next: Next,
) -> Result<Response, AuthResponse> {
    let Some(AuthenticatedUser(claims)) = request.extensions().get::<AuthenticatedUser>() else {
        return Err(AuthResponse::missing_auth());
    };

    if !has_any_role(&claims.roles, roles) {
        tracing::warn!(user_id = %claims.sub, required = ?roles, "Role check failed");
        return Err(AuthResponse::forbidden());
    }

    Ok(next.run(request).await)
}

/// Error response for auth failures
#[derive(Debug)]
pub struct AuthResponse {
    status: StatusCode,
    message: String,
    retry_after: Option<u64>,
}

impl AuthResponse {
    pub fn from_error(error: AuthError) -> Self {
        let (status, message) = match &error {
            AuthError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, error.to_string()),
            AuthError::InvalidCredentials | AuthError::TokenInvalid | AuthError::TokenRevoked => {
                (StatusCode::UNAUTHORIZED, error.to_string())
            }
            AuthError::ServiceUnavailable(detail) => {
                tracing::error!(error = %detail, "Backing service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service unavailable".to_string(),
                )
            }
            AuthError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        Self {
            status,
            message,
            retry_after: None,
        }
    }

    /// Attach `Retry-After` to a 429 response
    pub fn with_retry_after(mut self, window: Duration) -> Self {
        if self.status == StatusCode::TOO_MANY_REQUESTS {
            self.retry_after = Some(window.as_secs().max(1));
        }
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            retry_after: None,
        }
    }

    fn missing_auth() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Missing authorization header".to_string(),
            retry_after: None,
        }
    }

    fn unsupported_scheme() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Unsupported authentication scheme".to_string(),
            retry_after: None,
        }
    }

    fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: "Insufficient role".to_string(),
            retry_after: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AuthResponse {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        let mut response = (self.status, body).into_response();

        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}

/// Logs method, path, status and latency of every request
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

/// Records request duration by matched route
pub async fn metrics_middleware(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    metrics.record_request_duration(
        &method,
        &route,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

/// Wraps each request in an `http_request` span
pub async fn tracing_middleware(request: Request, next: Next) -> Response {
    use tracing::Instrument;

    let span = request_span(&request);

    async move {
        let response = next.run(request).await;
        tracing::Span::current().record("http.status_code", response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}

/// Span for one request; records the path only, never the query string
fn request_span(request: &Request) -> tracing::Span {
    tracing::info_span!(
        "http_request",
        http.method = %request.method(),
        http.path = %request.uri().path(),
        http.status_code = tracing::field::Empty,
    )
}
