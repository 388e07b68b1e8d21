//! Document model shared by the autosave engine and the document store.
//!
//! These are the wire types exchanged over HTTP. The store keeps its own
//! storage representation (see `storage`) and converts to these on the way out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for a document
pub type DocumentId = String;

/// Title given to drafts created from the document list
pub const DEFAULT_TITLE: &str = "Untitled Draft";

/// Publication state of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Draft,
    Published,
}

/// A document as returned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned identifier
    #[serde(rename = "_id", alias = "id")]
    pub id: DocumentId,
    /// Human-readable title
    pub title: String,
    /// Body snapshot (editor state JSON), `None` until first saved
    #[serde(default)]
    pub content: Option<Value>,
    /// Draft or published
    #[serde(default)]
    pub status: DocumentStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// User who created the document
    #[serde(default)]
    pub author_username: Option<String>,
}

/// Request body for creating a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub status: DocumentStatus,
}

impl NewDocument {
    /// An empty draft with the default title
    pub fn draft() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            content: None,
            status: DocumentStatus::Draft,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DocumentStatus>,
}

impl DocumentPatch {
    pub fn content(content: Value) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// True if the patch would change nothing
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.status.is_none()
    }
}

/// Response to a successful create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedDocument {
    pub id: DocumentId,
    pub message: String,
}

/// Generic `{"message": ...}` acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Username/password pair for register and login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

/// Login response carrying the bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_uses_underscore_id() {
        let now = Utc::now();
        let doc = Document {
            id: "doc-1".to_string(),
            title: "Hello".to_string(),
            content: None,
            status: DocumentStatus::Draft,
            created_at: now,
            updated_at: now,
            author_username: Some("alice".to_string()),
        };

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["_id"], "doc-1");
        assert_eq!(value["status"], "draft");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_document_accepts_plain_id() {
        let value = json!({
            "id": "doc-2",
            "title": "T",
            "content": {"root": {}},
            "status": "published",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z"
        });

        let doc: Document = serde_json::from_value(value).unwrap();
        assert_eq!(doc.id, "doc-2");
        assert_eq!(doc.status, DocumentStatus::Published);
        assert!(doc.author_username.is_none());
    }

    #[test]
    fn test_patch_skips_absent_fields() {
        let patch = DocumentPatch::content(json!({"root": null}));
        let value = serde_json::to_value(&patch).unwrap();

        assert_eq!(value, json!({"content": {"root": null}}));
        assert!(!patch.is_empty());
        assert!(DocumentPatch::default().is_empty());
    }

    #[test]
    fn test_new_draft_defaults() {
        let draft = NewDocument::draft();
        assert_eq!(draft.title, DEFAULT_TITLE);
        assert_eq!(draft.status, DocumentStatus::Draft);
        assert!(draft.content.is_none());
    }
}
