//! Access token upkeep for long-running commands.

use super::{to_stored, REFRESH_SKEW_SECS};
use anyhow::Result;
use chrono::Utc;
use saathi_config_and_utils::{SessionStore, StoredSession};
use std::sync::Arc;
use std::time::Duration;
use supabase_gateway::{RealtimeClient, SupabaseClient};
use tracing::{debug, info, warn};

/// Pause after a failed refresh before trying again.
const RETRY_AFTER: Duration = Duration::from_secs(30);

/// Time until a token expiring at `expires_at` should be refreshed.
/// `None` when the expiry is unknown.
pub(crate) fn refresh_delay(expires_at: Option<i64>, now: i64) -> Option<Duration> {
    let remaining = expires_at? - now - REFRESH_SKEW_SECS;
    Some(Duration::from_secs(remaining.max(0) as u64))
}

/// Refreshes the session before it expires and installs the new token on
/// the REST client (and every clone of it), the realtime client and disk.
pub(crate) struct SessionKeeper {
    client: SupabaseClient,
    realtime: Arc<RealtimeClient>,
    sessions: SessionStore,
}

impl SessionKeeper {
    pub fn new(client: SupabaseClient, realtime: Arc<RealtimeClient>, sessions: SessionStore) -> Self {
        Self {
            client,
            realtime,
            sessions,
        }
    }

    pub async fn refresh(&self, current: &StoredSession) -> Result<StoredSession> {
        let refreshed = self.client.refresh_session(&current.refresh_token).await?;
        self.realtime
            .set_access_token(Some(refreshed.access_token.clone()));
        let stored = to_stored(&refreshed);
        self.sessions.save(&stored)?;
        info!(
            user_id = %stored.user_id,
            expires_at = ?stored.expires_at,
            "Session refreshed"
        );
        Ok(stored)
    }

    /// Keep `session` fresh until the task is aborted.
    pub async fn run(self, mut session: StoredSession) {
        loop {
            let Some(delay) = refresh_delay(session.expires_at, Utc::now().timestamp()) else {
                debug!("Session has no expiry, not refreshing");
                return;
            };
            tokio::time::sleep(delay).await;

            match self.refresh(&session).await {
                Ok(next) => session = next,
                Err(e) => {
                    warn!(error = %e, "Session refresh failed, retrying");
                    tokio::time::sleep(RETRY_AFTER).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use saathi_config_and_utils::Paths;
    use serde_json::json;
    use supabase_gateway::RealtimeConfig;
    use tempfile::tempdir;

    fn realtime() -> Arc<RealtimeClient> {
        let client = RealtimeClient::new(RealtimeConfig::new(
            "ws://127.0.0.1:9/realtime/v1/websocket",
        ));
        client.set_access_token(Some("jwt-1".to_string()));
        Arc::new(client)
    }

    fn expiring_session(expires_in: i64) -> StoredSession {
        StoredSession {
            access_token: "jwt-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at: Some(Utc::now().timestamp() + expires_in),
            user_id: "u1".to_string(),
            email: None,
        }
    }

    #[test]
    fn delay_leaves_a_minute_of_slack() {
        assert_eq!(refresh_delay(Some(4_000), 400), Some(Duration::from_secs(3_540)));
        assert_eq!(refresh_delay(Some(430), 400), Some(Duration::ZERO));
        assert_eq!(refresh_delay(Some(100), 400), Some(Duration::ZERO));
        assert_eq!(refresh_delay(None, 400), None);
    }

    #[tokio::test]
    async fn expiring_session_is_refreshed_everywhere() {
        let server = MockServer::start_async().await;
        let next_expiry = Utc::now().timestamp() + 3600;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/auth/v1/token")
                    .query_param("grant_type", "refresh_token")
                    .json_body(json!({ "refresh_token": "refresh-1" }));
                then.status(200).json_body(json!({
                    "access_token": "jwt-2",
                    "refresh_token": "refresh-2",
                    "expires_at": next_expiry,
                    "user": { "id": "u1", "email": "shop@example.com" }
                }));
            })
            .await;

        let dir = tempdir().unwrap();
        let sessions = SessionStore::new(Paths::with_base_dir(dir.path().to_path_buf()));
        let client = SupabaseClient::new(server.base_url(), "pk");
        client.set_access_token(Some("jwt-1".to_string()));
        // Panels hold clones of the client.
        let panel_client = client.clone();
        let realtime = realtime();

        let keeper = SessionKeeper::new(client, realtime.clone(), sessions.clone());
        let task = tokio::spawn(keeper.run(expiring_session(30)));
        for _ in 0..100 {
            if sessions.load().unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        task.abort();

        mock.assert_async().await;
        assert_eq!(panel_client.access_token().as_deref(), Some("jwt-2"));
        assert_eq!(realtime.access_token().as_deref(), Some("jwt-2"));
        let saved = sessions.load().unwrap().unwrap();
        assert_eq!(saved.access_token, "jwt-2");
        assert_eq!(saved.refresh_token, "refresh-2");
        assert_eq!(saved.expires_at, Some(next_expiry));
    }

    #[tokio::test]
    async fn rejected_refresh_keeps_the_current_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth/v1/token");
                then.status(400)
                    .json_body(json!({ "error": "invalid_grant" }));
            })
            .await;

        let dir = tempdir().unwrap();
        let sessions = SessionStore::new(Paths::with_base_dir(dir.path().to_path_buf()));
        let client = SupabaseClient::new(server.base_url(), "pk");
        client.set_access_token(Some("jwt-1".to_string()));
        let realtime = realtime();

        let keeper = SessionKeeper::new(client.clone(), realtime.clone(), sessions.clone());
        assert!(keeper.refresh(&expiring_session(0)).await.is_err());

        assert_eq!(client.access_token().as_deref(), Some("jwt-1"));
        assert_eq!(realtime.access_token().as_deref(), Some("jwt-1"));
        assert!(sessions.load().unwrap().is_none());
    }
}
