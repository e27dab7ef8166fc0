//! Signed-in session kept between CLI invocations.

use crate::{CoreResult, Paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Tokens and identity of the signed-in owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl StoredSession {
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }

    /// True once the access token has expired. Unknown expiry counts as valid.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at_utc().is_some_and(|at| at <= now)
    }
}

/// Reads and writes `session.json`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    paths: Paths,
}

impl SessionStore {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    pub fn path(&self) -> PathBuf {
        self.paths.session_file()
    }

    /// The stored session, or `None` when signed out.
    ///
    /// A corrupt file is treated as signed out.
    pub fn load(&self) -> CoreResult<Option<StoredSession>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        match serde_json::from_str(&content) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &StoredSession) -> CoreResult<()> {
        self.paths.ensure_dirs()?;
        let path = self.path();
        std::fs::write(&path, serde_json::to_string_pretty(session)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        debug!(user_id = %session.user_id, "Session saved");
        Ok(())
    }

    /// Remove the stored session. Returns whether one existed.
    pub fn clear(&self) -> CoreResult<bool> {
        let path = self.path();
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        Ok(true)
    }
}
