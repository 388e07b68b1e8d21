//! HTTP API of the document store.
//!
//! Account endpoints issue bearer tokens; document endpoints are open for
//! reads and require a token for writes. Every error body is
//! `{"detail": "..."}`.

pub mod auth;
pub mod handlers;

pub use auth::{AuthUser, TokenError, TokenService};

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::config::env_parse;
use crate::storage::{DocumentStore, StorageConfig, StorageError};

/// Secret used when `JWT_SECRET` is unset. Fine for local development only.
const DEV_JWT_SECRET: &str = "draft-sync-dev-secret";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl_minutes: u64,
    pub storage: StorageConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_minutes: 30,
            storage: StorageConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read `PORT`, `JWT_SECRET`, `ACCESS_TOKEN_EXPIRE_MINUTES` and the storage variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("JWT_SECRET not set - using the development secret");
                defaults.jwt_secret
            }
        };

        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            jwt_secret,
            token_ttl_minutes: env_parse("ACCESS_TOKEN_EXPIRE_MINUTES")
                .unwrap_or(defaults.token_ttl_minutes),
            storage: StorageConfig::from_env(),
        }
    }
}

/// Shared application state
pub struct AppState {
    pub store: DocumentStore,
    pub tokens: TokenService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: DocumentStore, tokens: TokenService) -> Self {
        Self {
            store,
            tokens,
            started_at: Instant::now(),
        }
    }
}

/// Errors surfaced to API callers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),
}

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Storage(_) | ApiError::Token(_) => {
                error!("Request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let mut response = (status, Json(json!({ "detail": detail }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route(
            "/api/posts",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .route(
            "/api/posts/",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .route(
            "/api/posts/:id",
            get(handlers::get_post)
                .patch(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
