//! Persistence client: talks to the remote document store over HTTP.
//!
//! The autosave engine depends only on [`PersistenceClient::save`]. The
//! concrete [`HttpPersistenceClient`] also carries the credential-gated CRUD
//! calls the document list uses, plus register/login.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::ClientConfig;
use crate::model::{
    CreatedDocument, Document, DocumentId, DocumentPatch, NewDocument, TokenResponse,
    UserCredentials,
};

use super::session::Credential;
use super::snapshot::Snapshot;

/// Why a save did not land
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    #[error("No session credential available")]
    MissingCredential,

    #[error("Credential rejected by the store")]
    AuthRejected,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Store error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl SaveError {
    /// True if the credential itself is bad and the session should be cleared
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, SaveError::AuthRejected)
    }
}

/// Errors from the HTTP client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Store returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected response body: {0}")]
    Decode(String),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

impl From<ClientError> for SaveError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Unauthorized => SaveError::AuthRejected,
            ClientError::Transport(msg) | ClientError::Decode(msg) => SaveError::Network(msg),
            ClientError::Status { status, message } => SaveError::Server { status, message },
        }
    }
}

/// The single call the autosave engine makes against the store
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    /// Replace the body of `document_id` with `snapshot`
    async fn save(
        &self,
        document_id: &str,
        snapshot: &Snapshot,
        credential: &Credential,
    ) -> Result<(), SaveError>;
}

/// Error body the store sends on failure
#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

/// reqwest-backed client for the document store
#[derive(Clone)]
pub struct HttpPersistenceClient {
    http: Client,
    config: ClientConfig,
}

impl HttpPersistenceClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Create an account
    pub async fn register(&self, username: &str, password: &str) -> ClientResult<()> {
        let body = UserCredentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self.http.post(self.url("/register")).json(&body).send().await;
        check(response).await?;
        Ok(())
    }

    /// Exchange a username/password for a credential
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<Credential> {
        let body = UserCredentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self.http.post(self.url("/login")).json(&body).send().await;
        let token: TokenResponse = read_json(check(response).await?).await?;
        Ok(Credential::new(token.access_token, username))
    }

    pub async fn create_document(
        &self,
        document: &NewDocument,
        credential: &Credential,
    ) -> ClientResult<DocumentId> {
        let response = self
            .http
            .post(self.url("/api/posts/"))
            .bearer_auth(&credential.token)
            .json(document)
            .send()
            .await;
        let created: CreatedDocument = read_json(check(response).await?).await?;
        debug!("Created document {}", created.id);
        Ok(created.id)
    }

    /// All documents, most recently updated first
    pub async fn list_documents(&self) -> ClientResult<Vec<Document>> {
        let response = self.http.get(self.url("/api/posts/")).send().await;
        read_json(check(response).await?).await
    }

    pub async fn get_document(&self, document_id: &str) -> ClientResult<Document> {
        let response = self
            .http
            .get(self.url(&format!("/api/posts/{}", document_id)))
            .send()
            .await;
        read_json(check(response).await?).await
    }

    /// Apply a partial update
    pub async fn update_document(
        &self,
        document_id: &str,
        patch: &DocumentPatch,
        credential: &Credential,
    ) -> ClientResult<()> {
        let response = self
            .http
            .patch(self.url(&format!("/api/posts/{}", document_id)))
            .bearer_auth(&credential.token)
            .json(patch)
            .send()
            .await;
        check(response).await?;
        Ok(())
    }

    pub async fn rename_document(
        &self,
        document_id: &str,
        title: &str,
        credential: &Credential,
    ) -> ClientResult<()> {
        self.update_document(document_id, &DocumentPatch::title(title), credential)
            .await
    }

    pub async fn delete_document(
        &self,
        document_id: &str,
        credential: &Credential,
    ) -> ClientResult<()> {
        let response = self
            .http
            .delete(self.url(&format!("/api/posts/{}", document_id)))
            .bearer_auth(&credential.token)
            .send()
            .await;
        check(response).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PersistenceClient for HttpPersistenceClient {
    async fn save(
        &self,
        document_id: &str,
        snapshot: &Snapshot,
        credential: &Credential,
    ) -> Result<(), SaveError> {
        let patch = DocumentPatch::content(snapshot.as_value().clone());
        self.update_document(document_id, &patch, credential)
            .await
            .map_err(SaveError::from)
    }
}

/// Map transport failures and non-2xx statuses onto `ClientError`
async fn check(response: reqwest::Result<Response>) -> ClientResult<Response> {
    let response = response.map_err(|e| ClientError::Transport(e.to_string()))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }

    let fallback = status.canonical_reason().unwrap_or("Unknown error").to_string();
    let message = match response.text().await {
        Ok(text) => serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.detail)
            .unwrap_or_else(|_| if text.is_empty() { fallback } else { text }),
        Err(_) => fallback,
    };
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    response
        .json()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_client_error_maps_to_save_error() {
        assert_eq!(SaveError::from(ClientError::Unauthorized), SaveError::AuthRejected);
        assert_eq!(
            SaveError::from(ClientError::Transport("refused".into())),
            SaveError::Network("refused".into())
        );
        assert_eq!(
            SaveError::from(ClientError::Status {
                status: 404,
                message: "Post not found".into()
            }),
            SaveError::Server {
                status: 404,
                message: "Post not found".into()
            }
        );
        assert!(SaveError::AuthRejected.is_auth_rejected());
        assert!(!SaveError::MissingCredential.is_auth_rejected());
    }

    #[test]
    fn test_url_joining() {
        let config = ClientConfig::default().with_base_url("http://localhost:8000/");
        let client = HttpPersistenceClient::new(config).unwrap();
        assert_eq!(client.url("/api/posts/abc"), "http://localhost:8000/api/posts/abc");
    }

    #[tokio::test]
    async fn test_unreachable_store_is_network_error() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let config = ClientConfig::default()
            .with_base_url("http://127.0.0.1:9")
            .with_request_timeout(Duration::from_secs(2));
        let client = HttpPersistenceClient::new(config).unwrap();

        let result = client
            .save("doc-1", &Snapshot::null(), &Credential::new("t", "u"))
            .await;
        assert!(matches!(result, Err(SaveError::Network(_))));
    }
}
