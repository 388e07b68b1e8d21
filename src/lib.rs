//! Draft Sync - debounced autosave for rich-text drafts.
//!
//! - `editor`: the editing session and autosave engine (snapshot codec,
//!   debouncer, save-status machine, session gate, persistence client)
//! - `storage`: Sled persistence for the document store
//! - `server`: the store's HTTP API (axum)
//! - `model`: wire types shared by both sides
//! - `config`: engine and client settings

pub mod config;
pub mod editor;
pub mod model;
pub mod server;
pub mod storage;

pub use config::{AutosaveConfig, ClientConfig};
pub use editor::{
    AutosaveContext, AutosaveController, AutosaveSession, DocumentTree, SaveStatus, SessionStore,
};
