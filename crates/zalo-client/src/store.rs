//! File-based session persistence.
//!
//! Stores one session snapshot at `~/.zalo/session.json` by default:
//! cookies and secret key exactly as they were imported, plus the device id
//! and user agent they belong to.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use zalo_core::{ZaloError, ZaloResult};

use crate::session::{CookieJar, Session};

/// Everything needed to restore a logged-in session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub imei: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub cookies: CookieJar,
    pub secret_key: String,
}

impl SessionSnapshot {
    /// Capture a session. Fails unless it is logged in with a secret and imei.
    pub fn capture(session: &Session) -> ZaloResult<Self> {
        let cookies = session.get_session().ok_or(ZaloError::NotLoggedIn)?;
        let secret_key = session.get_secret_key().ok_or(ZaloError::NotLoggedIn)?;
        let imei = session
            .imei()
            .ok_or_else(|| ZaloError::InvalidInput("session has no device id".into()))?
            .to_string();

        Ok(Self {
            imei,
            user_agent: session.user_agent().map(str::to_string),
            cookies,
            secret_key,
        })
    }

    /// Rebuild a session. Fails if the cookies or secret are not usable.
    pub fn restore(&self) -> ZaloResult<Session> {
        let mut session = Session::new();
        if !session.set_session(&serde_json::Value::Object(self.cookies.clone())) {
            return Err(ZaloError::InvalidInput(
                "stored cookies are missing the session or user id cookie".into(),
            ));
        }
        if !session.set_secret_key(&self.secret_key) {
            return Err(ZaloError::InvalidSecret("stored secret key is malformed".into()));
        }
        session.set_imei(self.imei.clone());
        session.set_user_agent(self.user_agent.clone());
        Ok(session)
    }
}

/// Session snapshot file manager.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Create a store for the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store at the default location (`~/.zalo/session.json`).
    pub fn default_location() -> ZaloResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| ZaloError::Other("cannot determine home directory".into()))?;
        Ok(Self::new(home.join(".zalo").join("session.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored snapshot, or `None` if nothing has been saved yet.
    pub fn load(&self) -> ZaloResult<Option<SessionSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let snapshot = serde_json::from_str(&content)?;
        Ok(Some(snapshot))
    }

    /// Write a snapshot, replacing any previous one.
    pub fn save(&self, snapshot: &SessionSnapshot) -> ZaloResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
                }
            }
        }

        let content = serde_json::to_string_pretty(snapshot)?;
        fs::write(&self.path, content + "\n")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %self.path.display(), "saved session");
        Ok(())
    }

    /// Delete the stored snapshot. Returns whether one existed.
    pub fn clear(&self) -> ZaloResult<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        Ok(true)
    }
}
