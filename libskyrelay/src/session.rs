//! AT Protocol session and its on-disk form
//!
//! The session file is JSON (`accessJwt`, `refreshJwt`, `handle`, `did`), the
//! same shape the server returns from `createSession`/`refreshSession`, so a
//! login response can be saved as-is to bootstrap the bot.
//!
//! The file is only written as a side effect of a refresh. It is created
//! with owner-only permissions (600) on Unix and must not be a symlink.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::error::{AuthError, Result};

/// Tokens and identity for the posting account
#[derive(Debug)]
pub struct AuthSession {
    pub did: String,
    pub handle: String,
    access_jwt: SecretString,
    refresh_jwt: SecretString,
}

/// Serialized form; also the body of a `refreshSession` response
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SessionData {
    #[serde(rename = "accessJwt")]
    pub access_jwt: String,
    #[serde(rename = "refreshJwt")]
    pub refresh_jwt: String,
    #[serde(default)]
    pub handle: String,
    pub did: String,
}

impl AuthSession {
    pub fn new(did: String, handle: String, access_jwt: String, refresh_jwt: String) -> Self {
        Self {
            did,
            handle,
            access_jwt: SecretString::from(access_jwt),
            refresh_jwt: SecretString::from(refresh_jwt),
        }
    }

    pub fn access_token(&self) -> &str {
        self.access_jwt.expose_secret()
    }

    pub fn refresh_token(&self) -> &str {
        self.refresh_jwt.expose_secret()
    }

    /// Read a session file
    pub fn load(path: &Path) -> Result<Self> {
        validate_not_symlink(path)?;

        let content = std::fs::read_to_string(path).map_err(|e| {
            AuthError::Load(format!(
                "Failed to read session file {}: {}. Save a createSession response there to log in.",
                path.display(),
                e
            ))
        })?;

        let data: SessionData = serde_json::from_str(&content).map_err(|e| {
            AuthError::Load(format!("Invalid session file {}: {}", path.display(), e))
        })?;

        Ok(Self::from(data))
    }

    /// Write the session file with owner-only permissions
    pub fn save(&self, path: &Path) -> Result<()> {
        if path.exists() {
            validate_not_symlink(path)?;
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AuthError::Persist(e.to_string()))?;
        }

        let data = SessionData {
            access_jwt: self.access_token().to_string(),
            refresh_jwt: self.refresh_token().to_string(),
            handle: self.handle.clone(),
            did: self.did.clone(),
        };
        let body = serde_json::to_vec(&data).map_err(|e| AuthError::Persist(e.to_string()))?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(path)
            .map_err(|e| AuthError::Persist(format!("{}: {}", path.display(), e)))?;
        file.write_all(&body)
            .and_then(|_| file.sync_all())
            .map_err(|e| AuthError::Persist(format!("{}: {}", path.display(), e)))?;

        // Tighten a file that pre-existed with wider permissions
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms).map_err(|e| AuthError::Persist(e.to_string()))?;
        }

        tracing::debug!("Saved session for {} to {:?}", self.handle, path);
        Ok(())
    }
}

impl From<SessionData> for AuthSession {
    fn from(data: SessionData) -> Self {
        Self::new(data.did, data.handle, data.access_jwt, data.refresh_jwt)
    }
}

/// Refuse to read or write the session through a symlink
pub fn validate_not_symlink(path: &Path) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| {
        AuthError::Load(format!(
            "Failed to read metadata for '{}': {}",
            path.display(),
            e
        ))
    })?;

    if metadata.is_symlink() {
        return Err(AuthError::Load(format!(
            "Session file '{}' is a symbolic link; use a regular file",
            path.display()
        ))
        .into());
    }

    Ok(())
}
