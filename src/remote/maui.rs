//! MAUI service client: audio transcription and form compilation
//!
//! Transcription is a multipart upload of the WAV payload with a language
//! hint; form compilation is a JSON POST bundling the form schema and the
//! transcribed text. Both identify the caller through `X-API-KEY` /
//! `X-USER-EMAIL` headers rather than the auth bearer token.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::http_client;
use super::types::{FormCompilationRequest, MauiCredentials, TranscriptionResponse};

/// Errors from the MAUI service client.
#[derive(Debug)]
pub enum MauiError {
    /// The MAUI base URL is not configured; the feature is unavailable.
    NotConfigured,
    /// Failed to read the audio payload from disk.
    FileReadError(String),
    /// Network/HTTP error before a response arrived.
    NetworkError(String),
    /// The service answered with a non-success status.
    ApiError { status: u16, message: String },
    /// The response body did not parse.
    ParseError(String),
}

impl std::fmt::Display for MauiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MauiError::NotConfigured => {
                write!(
                    f,
                    "MAUI service not configured. Set FIELDVOICE_MAUI_URL to enable it."
                )
            }
            MauiError::FileReadError(e) => write!(f, "Failed to read audio file: {}", e),
            MauiError::NetworkError(e) => write!(f, "Network error: {}", e),
            MauiError::ApiError { status, message } => {
                write!(f, "MAUI error ({}): {}", status, message)
            }
            MauiError::ParseError(e) => write!(f, "Failed to parse MAUI response: {}", e),
        }
    }
}

impl std::error::Error for MauiError {}

/// Error body the service sends on failures, when it sends JSON at all.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: String,
}

/// Response of the provisioning check, carrying a freshly minted API key.
#[derive(Debug, Deserialize)]
struct CheckUserResponse {
    #[serde(default)]
    api_key: Option<String>,
}

pub struct MauiClient {
    base_url: String,
}

impl MauiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Upload a recording's audio and return the transcription.
    pub async fn transcribe(
        &self,
        audio_path: &Path,
        language: &str,
        credentials: &MauiCredentials,
    ) -> Result<TranscriptionResponse, MauiError> {
        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| MauiError::FileReadError(e.to_string()))?;

        log::info!(
            "Transcribing {:?} ({} bytes, lang={})",
            audio_path.file_name().unwrap_or_default(),
            bytes.len(),
            language
        );

        let file_part = reqwest::multipart::Part::bytes(bytes)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| MauiError::ParseError(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("lang", language.to_string());

        let mut request = http_client()
            .post(format!("{}/transcribe", self.base_url))
            .header("X-API-KEY", credentials.api_key.as_str())
            .header("X-USER-EMAIL", credentials.user_email.as_str());
        if let Some(ref name) = credentials.user_name {
            request = request.header("X-USER-NAME", name.as_str());
        }

        let response = request
            .multipart(form)
            .send()
            .await
            .map_err(|e| MauiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status.as_u16(), response).await);
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| MauiError::ParseError(e.to_string()))?;

        log::info!(
            "Transcription successful: {} chars (language={:?})",
            parsed.text.len(),
            parsed.language
        );
        Ok(parsed)
    }

    /// Submit a transcription together with its form bundle. The response
    /// shape belongs to the service; it is returned as opaque JSON.
    pub async fn compile_form(
        &self,
        request: &FormCompilationRequest,
        credentials: &MauiCredentials,
    ) -> Result<Value, MauiError> {
        log::info!(
            "Compiling form '{}' from {} chars of transcript",
            request.form_schema_name,
            request.transcribed_audio.len()
        );

        let response = http_client()
            .post(format!("{}/audioformcompilation", self.base_url))
            .header("X-API-KEY", credentials.api_key.as_str())
            .header("X-USER-EMAIL", credentials.user_email.as_str())
            .json(request)
            .send()
            .await
            .map_err(|e| MauiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status.as_u16(), response).await);
        }

        response
            .json()
            .await
            .map_err(|e| MauiError::ParseError(e.to_string()))
    }

    /// Provisioning, path A: the account already has an API key; exchange
    /// it for service tokens. The token balance arrives in a header.
    pub async fn fetch_user_token(
        &self,
        api_key: &str,
        user_email: &str,
    ) -> Result<(), MauiError> {
        let response = http_client()
            .get(format!("{}/getusertoken", self.base_url))
            .query(&[("api_key", api_key), ("user_email", user_email)])
            .send()
            .await
            .map_err(|e| MauiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status.as_u16(), response).await);
        }

        if let Some(tokens) = response.headers().get("TOKENS") {
            log::info!("MAUI token balance: {:?}", tokens);
        }
        Ok(())
    }

    /// Provisioning, path B: no API key yet. Ask the service to check the
    /// account and mint one; returns it when the service does.
    pub async fn check_account(
        &self,
        user_email: &str,
        auth_token: &str,
        graphql_url: &str,
    ) -> Result<Option<String>, MauiError> {
        let response = http_client()
            .post(format!("{}/checkpandinouser", self.base_url))
            .header("X-USER-EMAIL", user_email)
            .header("X-AUTH-TOKEN", auth_token)
            .header("X-GRAPHQL-URL", graphql_url)
            .send()
            .await
            .map_err(|e| MauiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status.as_u16(), response).await);
        }

        let parsed: CheckUserResponse = response
            .json()
            .await
            .map_err(|e| MauiError::ParseError(e.to_string()))?;
        Ok(parsed.api_key)
    }
}

/// Build an `ApiError` from a non-success response, preferring the
/// service's own `{"error": ...}` body over raw text.
async fn api_error(status: u16, response: reqwest::Response) -> MauiError {
    let text = response.text().await.unwrap_or_default();
    let message = if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(&text) {
        parsed.error
    } else if text.is_empty() {
        format!("request failed with status {}", status)
    } else {
        text
    };
    MauiError::ApiError { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = MauiClient::new("https://api.example.org/maui/".to_string());
        assert_eq!(client.base_url, "https://api.example.org/maui");
    }

    #[test]
    fn api_error_display_carries_status_and_message() {
        let err = MauiError::ApiError {
            status: 502,
            message: "upstream unavailable".to_string(),
        };
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[test]
    fn not_configured_display_names_the_env_var() {
        assert!(MauiError::NotConfigured
            .to_string()
            .contains("FIELDVOICE_MAUI_URL"));
    }
}
