//! Bearer-token authentication for the store API.
//!
//! Access tokens are HS256 JWTs whose `sub` is the username. Passwords are
//! kept as hex SHA-256 digests of a random per-user salt followed by the
//! password.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::storage::StoredUser;

use super::{ApiError, AppState};

/// Errors from issuing or checking tokens
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username
    pub sub: String,
    /// Issued at timestamp
    pub iat: u64,
    /// Expiration timestamp
    pub exp: u64,
}

/// Issues and verifies access tokens
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: u64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_minutes: u64) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::InvalidConfig("JWT secret is empty".to_string()));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds: ttl_minutes.saturating_mul(60),
        })
    }

    /// Issue a token for `username`
    pub fn issue(&self, username: &str) -> Result<String, TokenError> {
        let now = unix_now();
        let claims = Claims {
            sub: username.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl_seconds),
        };
        let header = Header::new(Algorithm::HS256);
        Ok(encode(&header, &claims, &self.encoding)?)
    }

    /// Check signature and expiry; returns the username
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims.sub)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Hash a new password. Returns `(hash, salt)`, both hex.
pub fn hash_password(password: &str) -> (String, String) {
    let salt: [u8; 16] = rand::random();
    let salt = hex::encode(salt);
    (digest(&salt, password), salt)
}

pub fn verify_password(password: &str, user: &StoredUser) -> bool {
    digest(&user.salt, password) == user.password_hash
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// The authenticated caller, taken from `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;

        let username = state
            .tokens
            .verify(token.trim())
            .map_err(|_| ApiError::Unauthorized("Could not validate credentials".to_string()))?;

        Ok(AuthUser(username))
    }
}
