//! Auth service client: credential exchange, refresh and validation.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use super::http_client;
use super::types::{AuthSession, User};

#[derive(Debug)]
pub enum AuthError {
    /// The auth base URL is not configured; login is unavailable.
    NotConfigured,
    NetworkError(String),
    /// The service refused the request (bad credentials, expired token).
    Rejected { status: u16, message: String },
    ParseError(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::NotConfigured => {
                write!(
                    f,
                    "Auth service not configured. Set FIELDVOICE_AUTH_URL to enable login."
                )
            }
            AuthError::NetworkError(e) => write!(f, "Network error: {}", e),
            AuthError::Rejected { status, message } => {
                write!(f, "Login failed ({}): {}", status, message)
            }
            AuthError::ParseError(e) => write!(f, "Failed to parse auth response: {}", e),
        }
    }
}

impl std::error::Error for AuthError {}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "displayName")]
    display_name: Option<String>,
}

impl WireUser {
    fn into_user(self) -> User {
        let name = self
            .name
            .or(self.display_name)
            .unwrap_or_else(|| self.email.clone());
        User {
            id: self.id,
            email: self.email,
            name,
        }
    }
}

pub struct AuthClient {
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Exchange email/password for a bearer token and user identity.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let response = http_client()
            .post(format!("{}/signin/email-password", self.base_url))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            log::error!("Login rejected with status {}", status);
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::ParseError(e.to_string()))?;
        parse_session(body)
    }

    /// Exchange a still-valid token for a fresh one.
    pub async fn refresh(&self, token: &str) -> Result<AuthSession, AuthError> {
        let response = http_client()
            .post(format!("{}/refresh", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: "Token refresh failed".to_string(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::ParseError(e.to_string()))?;
        parse_session(body)
    }

    /// Ask the service who a token belongs to.
    pub async fn validate(&self, token: &str) -> Result<User, AuthError> {
        let response = http_client()
            .get(format!("{}/validate", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: "Token validation failed".to_string(),
            });
        }

        let wire: WireUser = response
            .json()
            .await
            .map_err(|e| AuthError::ParseError(e.to_string()))?;
        Ok(wire.into_user())
    }
}

/// Canonical sign-in response is the nested session object; some deployed
/// variants return the token at the top level, so that shape is accepted
/// as a fallback.
fn parse_session(body: Value) -> Result<AuthSession, AuthError> {
    #[derive(Deserialize)]
    struct SessionPayload {
        #[serde(rename = "accessToken")]
        access_token: String,
        user: WireUser,
    }

    #[derive(Deserialize)]
    struct NestedResponse {
        session: SessionPayload,
    }

    #[derive(Deserialize)]
    struct FlatResponse {
        #[serde(rename = "accessToken", alias = "token")]
        access_token: String,
        user: WireUser,
    }

    if let Ok(nested) = serde_json::from_value::<NestedResponse>(body.clone()) {
        return Ok(AuthSession {
            token: nested.session.access_token,
            user: nested.session.user.into_user(),
            issued_at: Utc::now(),
        });
    }

    match serde_json::from_value::<FlatResponse>(body) {
        Ok(flat) => Ok(AuthSession {
            token: flat.access_token,
            user: flat.user.into_user(),
            issued_at: Utc::now(),
        }),
        Err(e) => Err(AuthError::ParseError(format!(
            "unexpected sign-in response shape: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_session_response() {
        let body = json!({
            "session": {
                "accessToken": "tok-123",
                "user": {"id": "u1", "email": "demo@example.com", "displayName": "Demo User"}
            }
        });
        let session = parse_session(body).unwrap();
        assert_eq!(session.token, "tok-123");
        assert_eq!(session.user.name, "Demo User");
    }

    #[test]
    fn parses_flat_access_token_fallback() {
        let body = json!({
            "accessToken": "tok-456",
            "user": {"id": "u2", "email": "test@test.com"}
        });
        let session = parse_session(body).unwrap();
        assert_eq!(session.token, "tok-456");
        // No display name: fall back to the email.
        assert_eq!(session.user.name, "test@test.com");
    }

    #[test]
    fn rejects_unknown_response_shape() {
        let body = json!({"ok": true});
        assert!(matches!(
            parse_session(body),
            Err(AuthError::ParseError(_))
        ));
    }
}
