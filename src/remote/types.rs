//! Wire types for the auth and MAUI services.
//!
//! Field names follow the services' JSON conventions (camelCase). The
//! compiled-form response has no schema of its own: the remote service
//! controls its shape, so it stays an opaque `serde_json::Value`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Successful transcription of one audio upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
    /// Audio length as measured by the service, in seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub language: Option<String>,
}

/// The static form bundle the frontend selects for compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormBundle {
    pub form_schema: Value,
    pub form_schema_name: String,
    pub form_schema_example_data: Value,
    pub form_schema_choices: Value,
}

/// Request body for the form-compilation endpoint: the form bundle plus
/// the transcription to fill it from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormCompilationRequest {
    pub form_schema: Value,
    pub form_schema_name: String,
    pub form_schema_example_data: Value,
    pub form_schema_choices: Value,
    pub transcribed_audio: String,
}

impl FormCompilationRequest {
    pub fn new(bundle: FormBundle, transcribed_audio: String) -> Self {
        Self {
            form_schema: bundle.form_schema,
            form_schema_name: bundle.form_schema_name,
            form_schema_example_data: bundle.form_schema_example_data,
            form_schema_choices: bundle.form_schema_choices,
            transcribed_audio,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// A bearer token plus the identity it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
    pub issued_at: DateTime<Utc>,
}

/// Identity headers attached to every MAUI call.
#[derive(Debug, Clone, Default)]
pub struct MauiCredentials {
    pub api_key: String,
    pub user_email: String,
    pub user_name: Option<String>,
}
