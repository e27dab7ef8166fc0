//! Supabase REST (PostgREST) and auth client.

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use saathi_backend::{BackendResult, OwnerId, RowQuery, RowStore, SortOrder, OWNER_COLUMN};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// Authenticated user returned by the auth endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Session returned by a successful sign-in or token refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) at which the access token expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn owner_id(&self) -> OwnerId {
        OwnerId::new(self.user.id.clone())
    }

    /// Whether the access token expires within `skew_secs` of `now`.
    pub fn expires_within(&self, now: chrono::DateTime<chrono::Utc>, skew_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - now.timestamp() <= skew_secs,
            None => false,
        }
    }
}

/// Supabase REST API client.
///
/// Requests carry the publishable key as `apikey` and, once set, the user's
/// access token as bearer; row-level security does the rest.
#[derive(Clone)]
pub struct SupabaseClient {
    http_client: reqwest::Client,
    api_url: String,
    publishable_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl SupabaseClient {
    /// Create a new Supabase client.
    ///
    /// # Arguments
    /// * `api_url` - The Supabase project API URL (e.g., `https://xyz.supabase.co`)
    /// * `publishable_key` - The project's publishable (anon) key
    pub fn new(api_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            publishable_key: publishable_key.into(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn publishable_key(&self) -> &str {
        &self.publishable_key
    }

    /// Use `token` as bearer for every following request.
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token.read().clone()
    }

    /// Build the REST API URL for a table.
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    fn auth_url(&self, grant_type: &str) -> String {
        format!("{}/auth/v1/token?grant_type={}", self.api_url, grant_type)
    }

    fn bearer(&self) -> String {
        let token = self
            .access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.publishable_key.clone());
        format!("Bearer {}", token)
    }

    // =========================================================================
    // Auth
    // =========================================================================

    /// Sign in with email and password.
    ///
    /// On success the returned access token is also installed on this client.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> GatewayResult<AuthSession> {
        debug!(email, "Signing in with password");
        let body = serde_json::json!({ "email": email, "password": password });
        let session = self.token_request("password", &body).await?;
        debug!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    /// Exchange a refresh token for a new session.
    pub async fn refresh_session(&self, refresh_token: &str) -> GatewayResult<AuthSession> {
        debug!("Refreshing auth session");
        let body = serde_json::json!({ "refresh_token": refresh_token });
        self.token_request("refresh_token", &body).await
    }

    async fn token_request(&self, grant_type: &str, body: &Value) -> GatewayResult<AuthSession> {
        let response = self
            .http_client
            .post(self.auth_url(grant_type))
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        let response = self.check_response(response).await?;
        let session: AuthSession = response.json().await?;
        self.set_access_token(Some(session.access_token.clone()));
        Ok(session)
    }

    // =========================================================================
    // Rows
    // =========================================================================

    /// Fetch rows matching `query`.
    pub async fn select_rows(&self, query: &RowQuery) -> GatewayResult<Vec<Value>> {
        let params = select_params(query);
        debug!(table = %query.table, params = ?params, "Selecting rows");

        let response = self
            .http_client
            .get(self.rest_url(&query.table))
            .header("apikey", &self.publishable_key)
            .header("Authorization", self.bearer())
            .query(&params)
            .send()
            .await?;
        let response = self.check_response(response).await?;
        Ok(response.json().await?)
    }

    /// Insert one row and return the stored representation.
    pub async fn insert_row(&self, table: &str, row: &Value) -> GatewayResult<Value> {
        debug!(table, "Inserting row");
        let response = self
            .http_client
            .post(self.rest_url(table))
            .header("apikey", &self.publishable_key)
            .header("Authorization", self.bearer())
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        let response = self.check_response(response).await?;
        let mut rows: Vec<Value> = response.json().await?;
        if rows.is_empty() {
            return Err(GatewayError::Supabase {
                status: 200,
                message: "insert returned no representation".to_string(),
            });
        }
        Ok(rows.swap_remove(0))
    }

    /// Patch the owner's row with `id`.
    pub async fn update_row(
        &self,
        table: &str,
        owner_id: &OwnerId,
        id: &str,
        patch: &Value,
    ) -> GatewayResult<()> {
        debug!(table, id, "Updating row");
        let response = self
            .http_client
            .patch(self.rest_url(table))
            .header("apikey", &self.publishable_key)
            .header("Authorization", self.bearer())
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .query(&row_filter(owner_id, id))
            .json(patch)
            .send()
            .await?;
        self.expect_affected(response, table, id).await
    }

    /// Delete the owner's row with `id`.
    pub async fn delete_row(&self, table: &str, owner_id: &OwnerId, id: &str) -> GatewayResult<()> {
        debug!(table, id, "Deleting row");
        let response = self
            .http_client
            .delete(self.rest_url(table))
            .header("apikey", &self.publishable_key)
            .header("Authorization", self.bearer())
            .header("Prefer", "return=representation")
            .query(&row_filter(owner_id, id))
            .send()
            .await?;
        self.expect_affected(response, table, id).await
    }

    // =========================================================================
    // HTTP helpers
    // =========================================================================

    async fn expect_affected(
        &self,
        response: reqwest::Response,
        table: &str,
        id: &str,
    ) -> GatewayResult<()> {
        let response = self.check_response(response).await?;
        let rows: Vec<Value> = response.json().await?;
        if rows.is_empty() {
            return Err(GatewayError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Check HTTP response for errors.
    async fn check_response(&self, response: reqwest::Response) -> GatewayResult<reqwest::Response> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("Supabase request failed: {} - {}", status, body);
            return Err(GatewayError::Supabase {
                status,
                message: body,
            });
        }
        Ok(response)
    }
}

/// PostgREST query parameters for a row query.
fn select_params(query: &RowQuery) -> Vec<(String, String)> {
    let mut params = vec![
        ("select".to_string(), "*".to_string()),
        (OWNER_COLUMN.to_string(), format!("eq.{}", query.owner_id)),
    ];
    if let Some((column, since)) = &query.since {
        params.push((column.clone(), format!("gte.{}", since.to_rfc3339())));
    }
    if let Some((column, order)) = &query.order_by {
        let direction = match order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        params.push(("order".to_string(), format!("{}.{}", column, direction)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn row_filter(owner_id: &OwnerId, id: &str) -> [(String, String); 2] {
    [
        ("id".to_string(), format!("eq.{}", id)),
        (OWNER_COLUMN.to_string(), format!("eq.{}", owner_id)),
    ]
}

#[async_trait]
impl RowStore for SupabaseClient {
    async fn select(&self, query: RowQuery) -> BackendResult<Vec<Value>> {
        Ok(self.select_rows(&query).await?)
    }

    async fn insert(&self, table: &str, row: Value) -> BackendResult<Value> {
        Ok(self.insert_row(table, &row).await?)
    }

    async fn update(
        &self,
        table: &str,
        owner_id: &OwnerId,
        id: &str,
        patch: Value,
    ) -> BackendResult<()> {
        Ok(self.update_row(table, owner_id, id, &patch).await?)
    }

    async fn delete(&self, table: &str, owner_id: &OwnerId, id: &str) -> BackendResult<()> {
        Ok(self.delete_row(table, owner_id, id).await?)
    }
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("api_url", &self.api_url)
            .field("authenticated", &self.access_token.read().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_client_creation() {
        let client = SupabaseClient::new("https://test.supabase.co/", "test-key");
        assert_eq!(client.api_url(), "https://test.supabase.co");
        assert_eq!(client.publishable_key(), "test-key");
        assert!(client.access_token().is_none());
    }

    #[test]
    fn test_rest_url() {
        let client = SupabaseClient::new("https://test.supabase.co", "test-key");
        assert_eq!(
            client.rest_url("sales"),
            "https://test.supabase.co/rest/v1/sales"
        );
    }

    #[test]
    fn bearer_falls_back_to_publishable_key() {
        let client = SupabaseClient::new("https://test.supabase.co", "test-key");
        assert_eq!(client.bearer(), "Bearer test-key");
        client.set_access_token(Some("jwt".to_string()));
        assert_eq!(client.bearer(), "Bearer jwt");
    }

    #[test]
    fn select_params_cover_scope_window_order_and_limit() {
        let since = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let query = RowQuery::new("sales", OwnerId::new("u1"))
            .since("created_at", since)
            .order_by("created_at", SortOrder::Descending)
            .limit(50);

        assert_eq!(
            select_params(&query),
            vec![
                ("select".to_string(), "*".to_string()),
                ("user_id".to_string(), "eq.u1".to_string()),
                (
                    "created_at".to_string(),
                    "gte.2026-03-01T00:00:00+00:00".to_string()
                ),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn session_expiry_check() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let session = AuthSession {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: Some(now.timestamp() + 30),
            user: AuthUser {
                id: "u1".to_string(),
                email: None,
            },
        };
        assert!(session.expires_within(now, 60));
        assert!(!session.expires_within(now, 10));
        assert_eq!(session.owner_id().as_str(), "u1");
    }
}
