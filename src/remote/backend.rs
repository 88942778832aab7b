//! Backend capability interface
//!
//! The orchestrator and command surface talk to one `Backend` object
//! selected at composition time: the real auth + MAUI pair, or a mock with
//! fixed demo accounts and a canned transcript for offline development and
//! tests. No call site branches on configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::config::Config;
use crate::session::{self, SessionStore};

use super::auth::{AuthClient, AuthError};
use super::maui::{MauiClient, MauiError};
use super::types::{
    AuthSession, FormCompilationRequest, MauiCredentials, TranscriptionResponse, User,
};

#[async_trait]
pub trait Backend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    async fn validate(&self, token: &str) -> Result<User, AuthError>;

    async fn transcribe(
        &self,
        audio_path: &Path,
        language: &str,
    ) -> Result<TranscriptionResponse, MauiError>;

    async fn compile_form(
        &self,
        request: &FormCompilationRequest,
    ) -> Result<serde_json::Value, MauiError>;

    /// Post-login MAUI account provisioning. Best effort: implementations
    /// log failures and never propagate them into the login result.
    async fn provision(&self, _user_email: &str, _auth_token: &str) {}
}

// ---------------------------------------------------------------------------
// Real backend: auth service + MAUI service
// ---------------------------------------------------------------------------

pub struct RemoteBackend {
    auth: Option<AuthClient>,
    maui: Option<MauiClient>,
    session_store: Arc<SessionStore>,
    fallback_api_key: Option<String>,
    graphql_url: Option<String>,
}

impl RemoteBackend {
    pub fn new(config: &Config, session_store: Arc<SessionStore>) -> Self {
        if config.auth_url.is_none() {
            log::warn!("FIELDVOICE_AUTH_URL not set; login is disabled");
        }
        if config.maui_url.is_none() {
            log::warn!("FIELDVOICE_MAUI_URL not set; transcription is disabled");
        }

        Self {
            auth: config.auth_url.clone().map(AuthClient::new),
            maui: config.maui_url.clone().map(MauiClient::new),
            session_store,
            fallback_api_key: config.maui_api_key.clone(),
            graphql_url: config.graphql_url.clone(),
        }
    }

    fn auth(&self) -> Result<&AuthClient, AuthError> {
        self.auth.as_ref().ok_or(AuthError::NotConfigured)
    }

    fn maui(&self) -> Result<&MauiClient, MauiError> {
        self.maui.as_ref().ok_or(MauiError::NotConfigured)
    }

    /// Identity headers for MAUI calls: the provisioned key from the
    /// keyring when present, otherwise the configured default key.
    fn maui_credentials(&self) -> MauiCredentials {
        let api_key = session::get_maui_api_key()
            .or_else(|| self.fallback_api_key.clone())
            .unwrap_or_default();
        let (user_email, user_name) = match self.session_store.load() {
            Some(session) => (session.user.email, Some(session.user.name)),
            None => (String::new(), None),
        };
        MauiCredentials {
            api_key,
            user_email,
            user_name,
        }
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.auth()?.login(email, password).await
    }

    async fn validate(&self, token: &str) -> Result<User, AuthError> {
        self.auth()?.validate(token).await
    }

    async fn transcribe(
        &self,
        audio_path: &Path,
        language: &str,
    ) -> Result<TranscriptionResponse, MauiError> {
        let credentials = self.maui_credentials();
        self.maui()?
            .transcribe(audio_path, language, &credentials)
            .await
    }

    async fn compile_form(
        &self,
        request: &FormCompilationRequest,
    ) -> Result<serde_json::Value, MauiError> {
        let credentials = self.maui_credentials();
        self.maui()?.compile_form(request, &credentials).await
    }

    async fn provision(&self, user_email: &str, auth_token: &str) {
        let maui = match self.maui() {
            Ok(client) => client,
            Err(_) => {
                log::warn!("Provisioning skipped: MAUI service not configured");
                return;
            }
        };

        if let Some(api_key) = session::get_maui_api_key() {
            // Known account: exchange the key for service tokens.
            if let Err(e) = maui.fetch_user_token(&api_key, user_email).await {
                log::error!("MAUI token fetch failed: {}", e);
            }
            return;
        }

        let Some(ref graphql_url) = self.graphql_url else {
            log::warn!("Provisioning skipped: FIELDVOICE_GRAPHQL_URL not set");
            return;
        };

        match maui.check_account(user_email, auth_token, graphql_url).await {
            Ok(Some(api_key)) => {
                if let Err(e) = session::set_maui_api_key(Some(&api_key)) {
                    log::warn!("Could not persist provisioned API key: {}", e);
                }
            }
            Ok(None) => {
                log::warn!("Provisioning response carried no API key");
            }
            Err(e) => {
                log::error!("MAUI account check failed: {}", e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mock backend: fixed demo accounts, canned transcript
// ---------------------------------------------------------------------------

struct MockUser {
    id: &'static str,
    email: &'static str,
    name: &'static str,
    password: &'static str,
}

const MOCK_USERS: &[MockUser] = &[
    MockUser {
        id: "1",
        email: "demo@example.com",
        name: "Demo User",
        password: "demo123",
    },
    MockUser {
        id: "2",
        email: "test@test.com",
        name: "Test User",
        password: "test123",
    },
];

const MOCK_TOKEN_PREFIX: &str = "mock-jwt-token-";
const MOCK_TRANSCRIPT: &str =
    "Nel villaggio sono state distribuite venti taniche di acqua potabile a dodici famiglie.";

/// Offline backend used in development and tests. Login/validate mimic the
/// auth service against two fixed accounts; transcription returns a canned
/// transcript after verifying the audio file is readable.
pub struct MockBackend {
    /// Simulated network latency. Zeroed in tests.
    delay: Duration,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(500),
        }
    }

    pub fn without_delay() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    fn user_for(&self, id: &str) -> Option<User> {
        MOCK_USERS.iter().find(|u| u.id == id).map(|u| User {
            id: u.id.to_string(),
            email: u.email.to_string(),
            name: u.name.to_string(),
        })
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        tokio::time::sleep(self.delay).await;

        let user = MOCK_USERS
            .iter()
            .find(|u| u.email == email && u.password == password)
            .ok_or(AuthError::Rejected {
                status: 401,
                message: "Invalid credentials".to_string(),
            })?;

        Ok(AuthSession {
            token: format!(
                "{}{}-{}",
                MOCK_TOKEN_PREFIX,
                user.id,
                Utc::now().timestamp_millis()
            ),
            user: User {
                id: user.id.to_string(),
                email: user.email.to_string(),
                name: user.name.to_string(),
            },
            issued_at: Utc::now(),
        })
    }

    async fn validate(&self, token: &str) -> Result<User, AuthError> {
        tokio::time::sleep(self.delay).await;

        let rest = token
            .strip_prefix(MOCK_TOKEN_PREFIX)
            .ok_or(AuthError::Rejected {
                status: 401,
                message: "Invalid token".to_string(),
            })?;
        let user_id = rest.split('-').next().unwrap_or_default();

        self.user_for(user_id).ok_or(AuthError::Rejected {
            status: 401,
            message: "User not found".to_string(),
        })
    }

    async fn transcribe(
        &self,
        audio_path: &Path,
        language: &str,
    ) -> Result<TranscriptionResponse, MauiError> {
        tokio::time::sleep(self.delay).await;

        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| MauiError::FileReadError(e.to_string()))?;
        log::debug!(
            "Mock transcription of {} bytes (lang={})",
            bytes.len(),
            language
        );

        Ok(TranscriptionResponse {
            text: MOCK_TRANSCRIPT.to_string(),
            duration: 5.0,
            language: Some(language.to_string()),
        })
    }

    async fn compile_form(
        &self,
        request: &FormCompilationRequest,
    ) -> Result<serde_json::Value, MauiError> {
        tokio::time::sleep(self.delay).await;

        Ok(json!([{
            "formSchemaName": request.form_schema_name,
            "compiled": { "transcript": request.transcribed_audio },
        }]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_login_accepts_demo_account() {
        let backend = MockBackend::without_delay();
        let session = backend.login("demo@example.com", "demo123").await.unwrap();
        assert!(session.token.starts_with(MOCK_TOKEN_PREFIX));
        assert_eq!(session.user.name, "Demo User");
    }

    #[tokio::test]
    async fn mock_login_rejects_bad_password() {
        let backend = MockBackend::without_delay();
        let result = backend.login("demo@example.com", "wrong").await;
        assert!(matches!(
            result,
            Err(AuthError::Rejected { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn mock_validate_round_trips_login_token() {
        let backend = MockBackend::without_delay();
        let session = backend.login("test@test.com", "test123").await.unwrap();
        let user = backend.validate(&session.token).await.unwrap();
        assert_eq!(user.email, "test@test.com");
    }

    #[tokio::test]
    async fn mock_validate_rejects_foreign_token() {
        let backend = MockBackend::without_delay();
        assert!(backend.validate("some-other-token").await.is_err());
    }

    #[tokio::test]
    async fn mock_transcribe_requires_a_readable_file() {
        let backend = MockBackend::without_delay();
        let missing = Path::new("/tmp/does_not_exist_fieldvoice.wav");
        assert!(matches!(
            backend.transcribe(missing, "ITA").await,
            Err(MauiError::FileReadError(_))
        ));
    }
}
