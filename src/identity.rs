/// Persisted player identity
/// Stores the chosen username between sessions

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::models::now_ms;

pub const MAX_USERNAME_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity file io: {0}")]
    Io(#[from] std::io::Error),
    #[error("identity file format: {0}")]
    Format(#[from] serde_json::Error),
    #[error("invalid username: {0}")]
    Invalid(String),
}

/// Trim and validate a username: 1 to 32 chars of [A-Za-z0-9_-]
pub fn validate_username(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("username must not be empty".to_string());
    }
    if name.chars().count() > MAX_USERNAME_LEN {
        return Err(format!("username must be at most {} characters", MAX_USERNAME_LEN));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(format!("username contains invalid character '{}'", bad));
    }
    Ok(name.to_string())
}

pub trait IdentityStore: Send + Sync + 'static {
    fn load(&self) -> Result<Option<String>, IdentityError>;
    fn store(&self, username: &str) -> Result<(), IdentityError>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityFile {
    username: String,
    updated_at: i64,
}

/// JSON file next to the binary's working directory
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Result<Option<String>, IdentityError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: IdentityFile = serde_json::from_str(&raw)?;
        let username = validate_username(&file.username).map_err(IdentityError::Invalid)?;
        debug!(path = %self.path.display(), "Loaded identity");
        Ok(Some(username))
    }

    fn store(&self, username: &str) -> Result<(), IdentityError> {
        let username = validate_username(username).map_err(IdentityError::Invalid)?;
        let body = serde_json::to_string_pretty(&IdentityFile {
            username,
            updated_at: now_ms(),
        })?;

        // Atomic replace
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    username: Mutex<Option<String>>,
}

impl MemoryIdentityStore {
    pub fn new(username: Option<String>) -> Self {
        Self {
            username: Mutex::new(username),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Result<Option<String>, IdentityError> {
        let guard = self.username.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }

    fn store(&self, username: &str) -> Result<(), IdentityError> {
        let username = validate_username(username).map_err(IdentityError::Invalid)?;
        *self.username.lock().unwrap_or_else(|e| e.into_inner()) = Some(username);
        Ok(())
    }
}
