//! Contracts for the Backend Service boundary.

use crate::error::BackendResult;
use crate::types::{ChannelHandle, ChannelRequest, OwnerId, RowChange};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Where a channel pushes its row changes.
///
/// Implementations drop the sender when the channel dies (socket loss,
/// server-side error), which the receiving side observes as end-of-stream.
pub type ChangeSink = mpsc::UnboundedSender<RowChange>;

/// Publish/subscribe half of the Backend Service.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a channel for `request`, delivering matching changes into `sink`.
    ///
    /// Resolves once the service has confirmed the subscription.
    async fn subscribe(
        &self,
        request: ChannelRequest,
        sink: ChangeSink,
    ) -> BackendResult<ChannelHandle>;

    /// Close a channel previously returned by [`ChangeFeed::subscribe`].
    async fn remove_channel(&self, handle: ChannelHandle) -> BackendResult<()>;
}

/// Sort direction for [`RowQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// An owner-scoped select.
#[derive(Debug, Clone, PartialEq)]
pub struct RowQuery {
    pub table: String,
    pub owner_id: OwnerId,
    /// Only rows whose `column` is at or after the given instant.
    pub since: Option<(String, DateTime<Utc>)>,
    pub order_by: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn new(table: impl Into<String>, owner_id: OwnerId) -> Self {
        Self {
            table: table.into(),
            owner_id,
            since: None,
            order_by: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn since(mut self, column: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.since = Some((column.into(), at));
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((column.into(), order));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Row CRUD half of the Backend Service.
///
/// Every call is scoped to one owner; rows of other owners are invisible.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, query: RowQuery) -> BackendResult<Vec<serde_json::Value>>;

    /// Insert a row and return it as stored (with generated id/timestamps).
    async fn insert(
        &self,
        table: &str,
        row: serde_json::Value,
    ) -> BackendResult<serde_json::Value>;

    async fn update(
        &self,
        table: &str,
        owner_id: &OwnerId,
        id: &str,
        patch: serde_json::Value,
    ) -> BackendResult<()>;

    async fn delete(&self, table: &str, owner_id: &OwnerId, id: &str) -> BackendResult<()>;
}
