//! Build/run-time environment configuration
//!
//! Endpoint URLs and the default API key come from environment variables
//! (a `.env` file is honored in development, loaded in `main`). A missing
//! variable never aborts startup: the dependent feature degrades to a
//! logged no-op instead.

use once_cell::sync::Lazy;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the auth service.
    pub auth_url: Option<String>,
    /// Base URL of the MAUI transcription/compilation service.
    pub maui_url: Option<String>,
    /// Default MAUI API key, used until provisioning mints a per-user one.
    pub maui_api_key: Option<String>,
    /// GraphQL endpoint handed to MAUI during account provisioning.
    pub graphql_url: Option<String>,
    /// Force the mock backend regardless of configured URLs.
    pub force_mock_backend: bool,
}

impl Config {
    fn from_env() -> Self {
        Self {
            auth_url: env_var("FIELDVOICE_AUTH_URL"),
            maui_url: env_var("FIELDVOICE_MAUI_URL"),
            maui_api_key: env_var("FIELDVOICE_MAUI_API_KEY"),
            graphql_url: env_var("FIELDVOICE_GRAPHQL_URL"),
            force_mock_backend: env_flag("FIELDVOICE_USE_MOCK_BACKEND", false),
        }
    }

    /// The mock backend is used when forced, or when neither remote
    /// service is configured (first run, offline development).
    pub fn use_mock_backend(&self) -> bool {
        self.force_mock_backend || (self.auth_url.is_none() && self.maui_url.is_none())
    }
}

fn env_var(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

pub fn get() -> &'static Config {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_backend_is_default_when_nothing_is_configured() {
        let config = Config {
            auth_url: None,
            maui_url: None,
            maui_api_key: None,
            graphql_url: None,
            force_mock_backend: false,
        };
        assert!(config.use_mock_backend());
    }

    #[test]
    fn configured_urls_select_the_real_backend() {
        let config = Config {
            auth_url: Some("https://auth.example.org".to_string()),
            maui_url: Some("https://maui.example.org".to_string()),
            maui_api_key: None,
            graphql_url: None,
            force_mock_backend: false,
        };
        assert!(!config.use_mock_backend());
    }

    #[test]
    fn force_flag_wins_over_configured_urls() {
        let config = Config {
            auth_url: Some("https://auth.example.org".to_string()),
            maui_url: Some("https://maui.example.org".to_string()),
            maui_api_key: None,
            graphql_url: None,
            force_mock_backend: true,
        };
        assert!(config.use_mock_backend());
    }
}
