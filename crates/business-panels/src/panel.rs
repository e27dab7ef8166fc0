//! Panel data fetchers: one table, one owner, one local snapshot.

use crate::aggregates::{FinanceSummary, InsightsSummary, InventorySummary, SalesSummary};
use crate::error::PanelResult;
use crate::models::{decode_rows, FinanceEntry, InsightRecord, InventoryItem, SaleRecord};
use chrono::{DateTime, Utc};
use saathi_backend::{OwnerId, RowQuery, RowStore, SortOrder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// One business area shown as a panel.
pub trait PanelKind: Debug + Clone + Copy + Default + Send + Sync + 'static {
    /// Backend table the panel reads.
    const TABLE: &'static str;
    /// Human-readable panel name.
    const NAME: &'static str;

    type Row: DeserializeOwned + Clone + Debug + Send + Sync + 'static;
    type Summary: Serialize + Clone + Default + Debug + Send + Sync + 'static;

    /// Throttle window for this panel's live subscription.
    fn throttle() -> Duration {
        live_sync::DEFAULT_THROTTLE
    }

    /// Full owner-scoped row set.
    fn query(owner_id: &OwnerId) -> RowQuery {
        RowQuery::new(Self::TABLE, owner_id.clone())
    }

    fn summarize(rows: &[Self::Row], now: DateTime<Utc>) -> Self::Summary;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SalesPanel;

impl PanelKind for SalesPanel {
    const TABLE: &'static str = "sales";
    const NAME: &'static str = "Sales";
    type Row = SaleRecord;
    type Summary = SalesSummary;

    fn query(owner_id: &OwnerId) -> RowQuery {
        RowQuery::new(Self::TABLE, owner_id.clone()).order_by("created_at", SortOrder::Descending)
    }

    fn summarize(rows: &[SaleRecord], now: DateTime<Utc>) -> SalesSummary {
        SalesSummary::from_rows(rows, now)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryPanel;

impl PanelKind for InventoryPanel {
    const TABLE: &'static str = "inventory";
    const NAME: &'static str = "Inventory";
    type Row = InventoryItem;
    type Summary = InventorySummary;

    // Stock counts churn during billing; refetch less eagerly.
    fn throttle() -> Duration {
        Duration::from_millis(2000)
    }

    fn query(owner_id: &OwnerId) -> RowQuery {
        RowQuery::new(Self::TABLE, owner_id.clone()).order_by("item_name", SortOrder::Ascending)
    }

    fn summarize(rows: &[InventoryItem], _now: DateTime<Utc>) -> InventorySummary {
        InventorySummary::from_rows(rows)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FinancePanel;

impl PanelKind for FinancePanel {
    const TABLE: &'static str = "finance_entries";
    const NAME: &'static str = "Finance";
    type Row = FinanceEntry;
    type Summary = FinanceSummary;

    fn query(owner_id: &OwnerId) -> RowQuery {
        RowQuery::new(Self::TABLE, owner_id.clone()).order_by("created_at", SortOrder::Descending)
    }

    fn summarize(rows: &[FinanceEntry], _now: DateTime<Utc>) -> FinanceSummary {
        FinanceSummary::from_rows(rows)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InsightsPanel;

impl InsightsPanel {
    const HISTORY: usize = 20;
}

impl PanelKind for InsightsPanel {
    const TABLE: &'static str = "ai_insights";
    const NAME: &'static str = "Insights";
    type Row = InsightRecord;
    type Summary = InsightsSummary;

    fn query(owner_id: &OwnerId) -> RowQuery {
        RowQuery::new(Self::TABLE, owner_id.clone())
            .order_by("generated_at", SortOrder::Descending)
            .limit(Self::HISTORY)
    }

    fn summarize(rows: &[InsightRecord], _now: DateTime<Utc>) -> InsightsSummary {
        InsightsSummary::from_rows(rows)
    }
}

/// Local cache of a panel's rows and aggregates.
#[derive(Debug, Clone)]
pub struct PanelSnapshot<K: PanelKind> {
    pub rows: Vec<K::Row>,
    pub summary: K::Summary,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Sequence number of the refresh that produced this snapshot.
    pub sequence: u64,
}

impl<K: PanelKind> Default for PanelSnapshot<K> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            summary: K::Summary::default(),
            fetched_at: None,
            sequence: 0,
        }
    }
}

/// Result of one [`Panel::refresh`].
#[derive(Debug, Clone)]
pub enum RefreshOutcome<K: PanelKind> {
    Applied(PanelSnapshot<K>),
    /// A refresh started later already landed; this response was discarded.
    Superseded,
}

/// Fetches one table for one owner and keeps the latest snapshot.
pub struct Panel<K: PanelKind> {
    owner_id: OwnerId,
    store: Arc<dyn RowStore>,
    snapshot: Mutex<PanelSnapshot<K>>,
    next_sequence: AtomicU64,
}

impl<K: PanelKind> Panel<K> {
    pub fn new(owner_id: OwnerId, store: Arc<dyn RowStore>) -> Self {
        Self {
            owner_id,
            store,
            snapshot: Mutex::new(PanelSnapshot::default()),
            next_sequence: AtomicU64::new(0),
        }
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    /// Refetch the full row set and recompute the summary.
    ///
    /// Overlapping refreshes may finish out of order; only a response newer
    /// than the cached one is applied.
    pub async fn refresh(&self) -> PanelResult<RefreshOutcome<K>> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let raw = self.store.select(K::query(&self.owner_id)).await?;
        let rows: Vec<K::Row> = decode_rows(K::TABLE, raw);
        let now = Utc::now();
        let summary = K::summarize(&rows, now);

        let mut snapshot = self.snapshot.lock().expect("lock poisoned");
        if sequence <= snapshot.sequence {
            debug!(
                table = K::TABLE,
                sequence,
                applied = snapshot.sequence,
                "Discarding superseded refresh"
            );
            return Ok(RefreshOutcome::Superseded);
        }
        *snapshot = PanelSnapshot {
            rows,
            summary,
            fetched_at: Some(now),
            sequence,
        };
        debug!(table = K::TABLE, sequence, rows = snapshot.rows.len(), "Panel refreshed");
        Ok(RefreshOutcome::Applied(snapshot.clone()))
    }

    pub fn snapshot(&self) -> PanelSnapshot<K> {
        self.snapshot.lock().expect("lock poisoned").clone()
    }

    pub fn summary(&self) -> K::Summary {
        self.snapshot.lock().expect("lock poisoned").summary.clone()
    }
}

impl<K: PanelKind> Debug for Panel<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Panel")
            .field("table", &K::TABLE)
            .field("owner_id", &self.owner_id)
            .finish_non_exhaustive()
    }
}
