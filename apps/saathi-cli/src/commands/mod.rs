//! CLI command implementations.

mod ask;
mod auth;
mod insights;
mod session;
mod summary;
mod watch;

pub use ask::ask;
pub use auth::{login, logout, status};
pub use insights::insights;
pub use summary::summary;
pub use watch::{watch, WatchOptions};

use anyhow::{Context, Result};
use chrono::Utc;
use insight_engine::{CompletionClient, EngineError};
use saathi_backend::OwnerId;
use saathi_config_and_utils::{Config, Paths, SessionStore, StoredSession};
use supabase_gateway::{AuthSession, SupabaseClient};
use tracing::{debug, info};

/// Refresh the access token when it expires within this many seconds.
const REFRESH_SKEW_SECS: i64 = 60;

/// Log level from the config file, if it can be read.
pub fn configured_log_level() -> Option<String> {
    let paths = Paths::new().ok()?;
    Config::load(&paths).ok().map(|config| config.log_level)
}

/// Local copy of a gateway session.
pub(crate) fn to_stored(session: &AuthSession) -> StoredSession {
    StoredSession {
        access_token: session.access_token.clone(),
        refresh_token: session.refresh_token.clone(),
        expires_at: session.expires_at,
        user_id: session.user.id.clone(),
        email: session.user.email.clone(),
    }
}

/// Configuration, local session and a backend client for one invocation.
pub struct AppContext {
    pub config: Config,
    pub sessions: SessionStore,
    pub client: SupabaseClient,
}

impl AppContext {
    pub fn load() -> Result<Self> {
        let paths = Paths::new()?;
        let config = Config::load(&paths).context("loading ~/.vyapaar-saathi/config.json")?;
        let client = SupabaseClient::new(&config.supabase_url, &config.supabase_publishable_key);
        Ok(Self {
            sessions: SessionStore::new(paths),
            config,
            client,
        })
    }

    /// The signed-in session with a usable access token installed on the
    /// client, refreshing it first when it is about to expire.
    pub async fn authenticated(&self) -> Result<StoredSession> {
        let Some(stored) = self.sessions.load()? else {
            anyhow::bail!("Not logged in. Run 'saathi login' first");
        };

        let expires_soon = stored
            .expires_at
            .is_some_and(|at| at - Utc::now().timestamp() <= REFRESH_SKEW_SECS);
        if !expires_soon {
            self.client.set_access_token(Some(stored.access_token.clone()));
            return Ok(stored);
        }

        debug!(user_id = %stored.user_id, "Access token expiring, refreshing");
        let refreshed = self
            .client
            .refresh_session(&stored.refresh_token)
            .await
            .context("Session expired. Run 'saathi login' again")?;
        let stored = to_stored(&refreshed);
        self.sessions.save(&stored)?;
        info!(user_id = %stored.user_id, "Session refreshed");
        Ok(stored)
    }

    pub async fn owner(&self) -> Result<OwnerId> {
        Ok(OwnerId::new(self.authenticated().await?.user_id))
    }

    /// Completion client for the configured gateway and model.
    pub fn completion(&self) -> Result<CompletionClient, EngineError> {
        Ok(CompletionClient::from_env()?
            .with_api_url(&self.config.completion_api_url)
            .with_model(&self.config.completion_model))
    }
}

/// Turn an engine error into the owner-facing message, keeping details in the log.
pub fn engine_failure(error: EngineError) -> anyhow::Error {
    tracing::warn!(error = %error, "Insight engine call failed");
    anyhow::anyhow!(error.user_message())
}
