//! Request handlers for the store API.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::model::{
    CreatedDocument, Document, DocumentPatch, MessageResponse, NewDocument, TokenResponse,
    UserCredentials,
};
use crate::storage::{StorageError, StoredUser};

use super::auth::{hash_password, verify_password, AuthUser};
use super::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    document_count: usize,
}

pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse::new("API is running"))
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.store.stats();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        document_count: stats.post_count,
    })
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UserCredentials>,
) -> ApiResult<impl IntoResponse> {
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Username and password are required".to_string(),
        ));
    }

    let (password_hash, salt) = hash_password(&body.password);
    let user = StoredUser {
        username: username.to_string(),
        password_hash,
        salt,
        created_at: Utc::now(),
    };

    match state.store.create_user(&user) {
        Ok(()) => {
            info!("Registered user {}", user.username);
            Ok((
                StatusCode::CREATED,
                Json(MessageResponse::new("User created successfully")),
            ))
        }
        Err(StorageError::AlreadyExists(_)) => {
            Err(ApiError::BadRequest("Username already exists".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UserCredentials>,
) -> ApiResult<Json<TokenResponse>> {
    let user = state.store.get_user(body.username.trim())?;
    let user = match user {
        Some(user) if verify_password(&body.password, &user) => user,
        _ => {
            debug!("Rejected login for {}", body.username);
            return Err(ApiError::Unauthorized(
                "Incorrect username or password".to_string(),
            ));
        }
    };

    let access_token = state.tokens.issue(&user.username)?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

pub async fn create_post(
    State(state): State<Arc<AppState>>,
    AuthUser(username): AuthUser,
    Json(body): Json<NewDocument>,
) -> ApiResult<Json<CreatedDocument>> {
    let post = state.store.create_post(&body, &username)?;
    info!("Created post {} ({})", post.id, username);
    Ok(Json(CreatedDocument {
        id: post.id,
        message: "Draft created".to_string(),
    }))
}

/// All documents, most recently updated first
pub async fn list_posts(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Document>>> {
    let posts = state.store.list_posts()?;
    Ok(Json(posts.into_iter().map(|p| p.into_document()).collect()))
}

pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Document>> {
    state
        .store
        .get_post(&id)?
        .map(|post| Json(post.into_document()))
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))
}

pub async fn update_post(
    State(state): State<Arc<AppState>>,
    AuthUser(username): AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<DocumentPatch>,
) -> ApiResult<Json<MessageResponse>> {
    if patch.is_empty() {
        return Ok(Json(MessageResponse::new("No changes")));
    }

    match state.store.update_post(&id, &patch)? {
        Some(_) => {
            debug!("Post {} updated by {}", id, username);
            Ok(Json(MessageResponse::new("Post updated successfully")))
        }
        None => Err(ApiError::NotFound("Post not found".to_string())),
    }
}

pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    AuthUser(username): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    if !state.store.delete_post(&id)? {
        return Err(ApiError::NotFound("Post not found".to_string()));
    }
    info!("Post {} deleted by {}", id, username);
    Ok(Json(MessageResponse::new("Post deleted successfully")))
}

#[cfg(test)]
mod tests {
    use crate::server::{router, TokenService};
    use super::*;
    use crate::storage::{DocumentStore, StorageConfig};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let store = DocumentStore::open(StorageConfig::temporary()).unwrap();
        let tokens = TokenService::new("test-secret", 30).unwrap();
        router(Arc::new(AppState::new(store, tokens)))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value, Option<String>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let www_authenticate = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value, www_authenticate)
    }

    async fn login_token(app: &Router, username: &str) -> String {
        let creds = json!({"username": username, "password": "pw"});
        send(app, "POST", "/register", None, Some(creds.clone())).await;
        let (status, body, _) = send(app, "POST", "/login", None, Some(creds)).await;
        assert_eq!(status, StatusCode::OK);
        body["access_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let app = test_app();
        let (status, body, _) = send(&app, "GET", "/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "API is running");

        let (status, body, _) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["document_count"], 0);
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let app = test_app();
        let creds = json!({"username": "alice", "password": "secret"});

        let (status, _, _) = send(&app, "POST", "/register", None, Some(creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body, _) = send(&app, "POST", "/register", None, Some(creds.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Username already exists");

        let (status, body, _) = send(&app, "POST", "/login", None, Some(creds)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        assert!(body["access_token"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_bad_login_is_401_with_challenge() {
        let app = test_app();
        login_token(&app, "alice").await;

        let wrong = json!({"username": "alice", "password": "nope"});
        let (status, body, challenge) = send(&app, "POST", "/login", None, Some(wrong)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Incorrect username or password");
        assert_eq!(challenge.as_deref(), Some("Bearer"));
    }

    #[tokio::test]
    async fn test_writes_require_token() {
        let app = test_app();
        let draft = json!({"title": "Untitled Draft"});

        let (status, _, challenge) = send(&app, "POST", "/api/posts/", None, Some(draft.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(challenge.as_deref(), Some("Bearer"));

        let (status, body, _) =
            send(&app, "POST", "/api/posts/", Some("garbage"), Some(draft)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Could not validate credentials");

        let patch = json!({"content": {"root": {}}});
        let (status, _, _) = send(&app, "PATCH", "/api/posts/x", None, Some(patch)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_post_lifecycle() {
        let app = test_app();
        let token = login_token(&app, "alice").await;

        let (status, created, _) = send(
            &app,
            "POST",
            "/api/posts/",
            Some(&token),
            Some(json!({"title": "Untitled Draft", "content": null})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["message"], "Draft created");
        let id = created["id"].as_str().unwrap().to_string();
        let uri = format!("/api/posts/{}", id);

        let body = json!({"root": {"children": [], "type": "root"}});
        let (status, msg, _) = send(
            &app,
            "PATCH",
            &uri,
            Some(&token),
            Some(json!({"content": body.clone()})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(msg["message"], "Post updated successfully");

        let (status, doc, _) = send(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["_id"], id.as_str());
        assert_eq!(doc["content"], body);
        assert_eq!(doc["author_username"], "alice");
        assert_eq!(doc["status"], "draft");

        let (_, list, _) = send(&app, "GET", "/api/posts/", None, None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, _, _) = send(&app, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body, _) = send(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Post not found");
    }

    #[tokio::test]
    async fn test_patch_edge_cases() {
        let app = test_app();
        let token = login_token(&app, "bob").await;

        let (status, msg, _) =
            send(&app, "PATCH", "/api/posts/missing", Some(&token), Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(msg["message"], "No changes");

        let (status, _, _) = send(
            &app,
            "PATCH",
            "/api/posts/missing",
            Some(&token),
            Some(json!({"title": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = send(&app, "DELETE", "/api/posts/missing", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
