//! Remote service clients
//!
//! Two independent backends: the auth service (credential exchange and
//! token validation) and the MAUI service (audio transcription and form
//! compilation). All calls are single-attempt with no retry or backoff;
//! each user action issues a fresh request.

pub mod auth;
pub mod backend;
pub mod maui;
pub mod types;

pub use auth::{AuthClient, AuthError};
pub use backend::{Backend, MockBackend, RemoteBackend};
pub use maui::{MauiClient, MauiError};
pub use types::{
    AuthSession, FormBundle, FormCompilationRequest, TranscriptionResponse, User,
};

use reqwest::Client;
use std::sync::OnceLock;

/// Global HTTP client for reuse across requests (avoids TLS handshake
/// overhead).
static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

pub(crate) fn http_client() -> &'static Client {
    HTTP_CLIENT.get_or_init(Client::new)
}
