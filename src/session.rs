//! Session persistence and secret storage
//!
//! The bearer token and user identity live in `session.json` in the app
//! config dir, written atomically; the MAUI API key obtained through
//! provisioning goes to the OS keyring (libsecret / Keychain / Credential
//! Manager). Keyring faults degrade to a logged warning and the configured
//! fallback key, never a crash.

use std::fs;
use std::path::PathBuf;

use keyring::Entry;
use serde::{Deserialize, Serialize};

use crate::remote::types::{AuthSession, User};

const SESSION_FILE_NAME: &str = "session.json";
const SERVICE_NAME: &str = "fieldvoice";
const MAUI_KEY_NAME: &str = "maui-api-key";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub user: User,
}

impl From<AuthSession> for SessionData {
    fn from(session: AuthSession) -> Self {
        Self {
            token: session.token,
            user: session.user,
        }
    }
}

/// File-backed session storage under a fixed path.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Session file at `<config_dir>/fieldvoice/session.json`.
    pub fn open_default() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fieldvoice");
        Self::new(dir.join(SESSION_FILE_NAME))
    }

    /// The stored session, if one exists and parses. A corrupt file is
    /// treated as logged-out.
    pub fn load(&self) -> Option<SessionData> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<SessionData>(&contents) {
                Ok(session) => Some(session),
                Err(e) => {
                    log::warn!("Session: failed to parse {:?}: {}", self.path, e);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                log::warn!("Session: failed to read {:?}: {}", self.path, e);
                None
            }
        }
    }

    pub fn save(&self, session: &SessionData) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
        }

        let contents = serde_json::to_string_pretty(session)
            .map_err(|e| format!("Serialize session: {}", e))?;

        // Write atomically: temp file in the same directory, then rename.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &contents)
            .map_err(|e| format!("Write temp session {:?}: {}", tmp_path, e))?;

        if cfg!(windows) && self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(format!("Remove existing session file: {}", e));
                }
            }
        }

        fs::rename(&tmp_path, &self.path)
            .map_err(|e| format!("Rename temp session into place: {}", e))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), String> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("Remove session file: {}", e)),
        }
    }
}

/// Retrieve the stored MAUI API key, if any.
/// Returns None if not provisioned or on keyring errors (logged).
pub fn get_maui_api_key() -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, MAUI_KEY_NAME) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("Keyring: failed to create entry: {}", e);
            return None;
        }
    };

    match entry.get_password() {
        Ok(key) if !key.is_empty() => Some(key),
        Ok(_) => None,
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            log::warn!("Keyring: failed to retrieve MAUI API key: {}", e);
            None
        }
    }
}

/// Store the MAUI API key in the system keyring. Pass None to delete it.
/// Never logs the key value.
pub fn set_maui_api_key(key: Option<&str>) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, MAUI_KEY_NAME)
        .map_err(|e| format!("Failed to create keyring entry: {}", e))?;

    match key {
        Some(k) if !k.is_empty() => {
            entry
                .set_password(k)
                .map_err(|e| format!("Failed to store MAUI API key: {}", e))?;
            log::info!("Keyring: stored MAUI API key");
        }
        _ => match entry.delete_credential() {
            Ok(()) => log::info!("Keyring: deleted MAUI API key"),
            Err(keyring::Error::NoEntry) => {}
            Err(e) => return Err(format!("Failed to delete MAUI API key: {}", e)),
        },
    }

    Ok(())
}
