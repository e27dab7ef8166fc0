//! In-process backend implementing both [`RowStore`] and [`ChangeFeed`].
//!
//! Mutations publish row changes to every open channel whose request matches,
//! the way the managed service's change feed would. Counters and failure
//! switches make it usable as a test double.

use crate::error::{BackendError, BackendResult};
use crate::feed::{ChangeFeed, ChangeSink, RowQuery, RowStore, SortOrder};
use crate::types::{ChangeKind, ChannelHandle, ChannelRequest, OwnerId, RowChange, OWNER_COLUMN};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

struct OpenChannel {
    request: ChannelRequest,
    sink: ChangeSink,
}

/// In-memory Backend Service.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    channels: Mutex<HashMap<String, OpenChannel>>,
    next_channel: AtomicU64,
    subscribe_calls: AtomicUsize,
    remove_calls: AtomicUsize,
    fail_subscriptions: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of `table` without publishing changes.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.tables
            .lock()
            .expect("lock poisoned")
            .insert(table.to_string(), rows);
    }

    /// All rows of `table`, regardless of owner.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .expect("lock poisoned")
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every following `subscribe` call fail with a transport error.
    pub fn fail_subscriptions(&self, fail: bool) {
        self.fail_subscriptions.store(fail, AtomicOrdering::SeqCst);
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn open_channels(&self) -> usize {
        self.channels.lock().expect("lock poisoned").len()
    }

    pub fn open_channels_for(&self, table: &str) -> usize {
        self.channels
            .lock()
            .expect("lock poisoned")
            .values()
            .filter(|channel| channel.request.table == table)
            .count()
    }

    /// Drop every channel as a lost socket would.
    pub fn drop_all_channels(&self) {
        self.channels.lock().expect("lock poisoned").clear();
    }

    /// Deliver a change to every matching channel.
    ///
    /// Channels whose receiver is gone are pruned.
    pub fn publish(&self, change: RowChange) {
        let mut channels = self.channels.lock().expect("lock poisoned");
        channels.retain(|id, channel| {
            if !channel.request.matches(&change) {
                return true;
            }
            let delivered = channel.sink.send(change.clone()).is_ok();
            if !delivered {
                debug!(channel = %id, "Pruning channel with no receiver");
            }
            delivered
        });
    }

    fn publish_row(&self, table: &str, kind: ChangeKind, record: Option<Value>, old: Option<Value>) {
        self.publish(RowChange {
            table: table.to_string(),
            kind,
            record,
            old_record: old,
            commit_timestamp: Some(Utc::now()),
        });
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("open_channels", &self.open_channels())
            .finish_non_exhaustive()
    }
}

fn owned_by(row: &Value, owner_id: &OwnerId) -> bool {
    row.get(OWNER_COLUMN).and_then(Value::as_str) == Some(owner_id.as_str())
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn timestamp(row: &Value, column: &str) -> Option<DateTime<Utc>> {
    row.get(column)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl RowStore for MemoryBackend {
    async fn select(&self, query: RowQuery) -> BackendResult<Vec<Value>> {
        let mut rows: Vec<Value> = self
            .rows(&query.table)
            .into_iter()
            .filter(|row| owned_by(row, &query.owner_id))
            .filter(|row| match &query.since {
                Some((column, since)) => timestamp(row, column).is_some_and(|at| at >= *since),
                None => true,
            })
            .collect();

        if let Some((column, order)) = &query.order_by {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(column), b.get(column));
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> BackendResult<Value> {
        let Value::Object(mut fields) = row else {
            return Err(BackendError::Status {
                status: 400,
                message: "row must be a JSON object".to_string(),
            });
        };
        if !fields.get(OWNER_COLUMN).is_some_and(Value::is_string) {
            return Err(BackendError::Status {
                status: 400,
                message: format!("missing {OWNER_COLUMN}"),
            });
        }
        fields
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        fields
            .entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        let stored = Value::Object(fields);
        self.tables
            .lock()
            .expect("lock poisoned")
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());

        self.publish_row(table, ChangeKind::Insert, Some(stored.clone()), None);
        Ok(stored)
    }

    async fn update(
        &self,
        table: &str,
        owner_id: &OwnerId,
        id: &str,
        patch: Value,
    ) -> BackendResult<()> {
        let (old, new) = {
            let mut tables = self.tables.lock().expect("lock poisoned");
            let row = tables
                .get_mut(table)
                .and_then(|rows| {
                    rows.iter_mut()
                        .find(|row| row_id(row) == Some(id) && owned_by(row, owner_id))
                })
                .ok_or_else(|| BackendError::NotFound {
                    table: table.to_string(),
                    id: id.to_string(),
                })?;

            let old = row.clone();
            if let (Value::Object(target), Value::Object(changes)) = (&mut *row, patch) {
                for (key, value) in changes {
                    // Ownership and identity are immutable.
                    if key != "id" && key != OWNER_COLUMN {
                        target.insert(key, value);
                    }
                }
            }
            (old, row.clone())
        };

        self.publish_row(table, ChangeKind::Update, Some(new), Some(old));
        Ok(())
    }

    async fn delete(&self, table: &str, owner_id: &OwnerId, id: &str) -> BackendResult<()> {
        let removed = {
            let mut tables = self.tables.lock().expect("lock poisoned");
            let rows = tables.get_mut(table);
            rows.and_then(|rows| {
                let position = rows
                    .iter()
                    .position(|row| row_id(row) == Some(id) && owned_by(row, owner_id))?;
                Some(rows.remove(position))
            })
        };

        let Some(old) = removed else {
            return Err(BackendError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            });
        };
        self.publish_row(table, ChangeKind::Delete, None, Some(old));
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(
        &self,
        request: ChannelRequest,
        sink: ChangeSink,
    ) -> BackendResult<ChannelHandle> {
        self.subscribe_calls.fetch_add(1, AtomicOrdering::SeqCst);
        if self.fail_subscriptions.load(AtomicOrdering::SeqCst) {
            return Err(BackendError::Transport(
                "subscription refused by test backend".to_string(),
            ));
        }

        let id = format!(
            "memory:{}:{}",
            request.table,
            self.next_channel.fetch_add(1, AtomicOrdering::SeqCst)
        );
        debug!(channel = %id, filter = %request.filter_expression(), "Opened memory channel");
        self.channels
            .lock()
            .expect("lock poisoned")
            .insert(id.clone(), OpenChannel { request, sink });
        Ok(ChannelHandle::new(id))
    }

    async fn remove_channel(&self, handle: ChannelHandle) -> BackendResult<()> {
        self.remove_calls.fetch_add(1, AtomicOrdering::SeqCst);
        self.channels
            .lock()
            .expect("lock poisoned")
            .remove(handle.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeKinds;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn owner() -> OwnerId {
        OwnerId::new("u1")
    }

    #[tokio::test]
    async fn insert_assigns_id_and_publishes_to_matching_channel() {
        let backend = MemoryBackend::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = backend
            .subscribe(ChannelRequest::new("sales", owner(), ChangeKinds::ALL), tx)
            .await
            .unwrap();

        let stored = backend
            .insert("sales", json!({ "user_id": "u1", "amount": 120.0 }))
            .await
            .unwrap();
        assert!(stored.get("id").is_some());
        assert!(stored.get("created_at").is_some());

        let change = rx.recv().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(change.table, "sales");
    }

    #[tokio::test]
    async fn other_owners_changes_are_filtered_out() {
        let backend = MemoryBackend::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = backend
            .subscribe(ChannelRequest::new("sales", owner(), ChangeKinds::ALL), tx)
            .await
            .unwrap();

        backend
            .insert("sales", json!({ "user_id": "u2", "amount": 1.0 }))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn insert_without_owner_is_rejected() {
        let backend = MemoryBackend::new();
        let err = backend
            .insert("sales", json!({ "amount": 1.0 }))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn select_scopes_orders_and_limits() {
        let backend = MemoryBackend::new();
        backend.seed(
            "sales",
            vec![
                json!({ "id": "a", "user_id": "u1", "created_at": "2024-01-01T00:00:00Z" }),
                json!({ "id": "b", "user_id": "u1", "created_at": "2024-03-01T00:00:00Z" }),
                json!({ "id": "c", "user_id": "u2", "created_at": "2024-02-01T00:00:00Z" }),
                json!({ "id": "d", "user_id": "u1", "created_at": "2024-02-01T00:00:00Z" }),
            ],
        );

        let rows = backend
            .select(
                RowQuery::new("sales", owner())
                    .order_by("created_at", SortOrder::Descending)
                    .limit(2),
            )
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().filter_map(row_id).collect();
        assert_eq!(ids, vec!["b", "d"]);

        let since = DateTime::parse_from_rfc3339("2024-01-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let recent = backend
            .select(RowQuery::new("sales", owner()).since("created_at", since))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn update_and_delete_publish_old_record() {
        let backend = MemoryBackend::new();
        backend.seed(
            "inventory",
            vec![json!({ "id": "i1", "user_id": "u1", "quantity": 5 })],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = backend
            .subscribe(ChannelRequest::new("inventory", owner(), ChangeKinds::ALL), tx)
            .await
            .unwrap();

        backend
            .update("inventory", &owner(), "i1", json!({ "quantity": 3, "user_id": "u9" }))
            .await
            .unwrap();
        let updated = rx.recv().await.unwrap();
        assert_eq!(updated.kind, ChangeKind::Update);
        assert_eq!(updated.record.as_ref().unwrap()["quantity"], 3);
        assert_eq!(updated.record.as_ref().unwrap()["user_id"], "u1");
        assert_eq!(updated.old_record.as_ref().unwrap()["quantity"], 5);

        backend.delete("inventory", &owner(), "i1").await.unwrap();
        let deleted = rx.recv().await.unwrap();
        assert_eq!(deleted.kind, ChangeKind::Delete);
        assert!(deleted.record.is_none());

        let missing = backend.delete("inventory", &owner(), "i1").await;
        assert!(matches!(missing, Err(BackendError::NotFound { .. })));
    }

    #[tokio::test]
    async fn failing_subscriptions_are_counted() {
        let backend = MemoryBackend::new();
        backend.fail_subscriptions(true);
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = backend
            .subscribe(ChannelRequest::new("sales", owner(), ChangeKinds::ALL), tx)
            .await;
        assert!(result.is_err());
        assert_eq!(backend.subscribe_calls(), 1);
        assert_eq!(backend.open_channels(), 0);
    }

    #[tokio::test]
    async fn remove_channel_stops_delivery() {
        let backend = MemoryBackend::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = backend
            .subscribe(ChannelRequest::new("sales", owner(), ChangeKinds::ALL), tx)
            .await
            .unwrap();
        backend.remove_channel(handle).await.unwrap();
        assert_eq!(backend.open_channels(), 0);
        assert_eq!(backend.remove_calls(), 1);

        backend
            .insert("sales", json!({ "user_id": "u1" }))
            .await
            .unwrap();
        // Sender was dropped with the channel entry.
        assert!(rx.recv().await.is_none());
    }
}
