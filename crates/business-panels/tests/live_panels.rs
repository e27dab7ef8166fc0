//! Live panels driven by the in-memory backend on a paused clock.

use async_trait::async_trait;
use business_panels::{
    InventoryPanel, LivePanel, LiveSettings, PanelEvent, SalesPanel,
};
use live_sync::{AlwaysVisible, IdlePolicy, Notification, VisibilitySignal};
use saathi_backend::{
    BackendError, BackendResult, ChangeFeed, MemoryBackend, OwnerId, RowQuery, RowStore,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::Notify;
use tokio::time::sleep;

/// Row store whose reads can be switched off.
struct FlakyStore {
    inner: Arc<MemoryBackend>,
    failing: AtomicBool,
}

#[async_trait]
impl RowStore for FlakyStore {
    async fn select(&self, query: RowQuery) -> BackendResult<Vec<Value>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        self.inner.select(query).await
    }

    async fn insert(&self, table: &str, row: Value) -> BackendResult<Value> {
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: &str, owner_id: &OwnerId, id: &str, patch: Value) -> BackendResult<()> {
        self.inner.update(table, owner_id, id, patch).await
    }

    async fn delete(&self, table: &str, owner_id: &OwnerId, id: &str) -> BackendResult<()> {
        self.inner.delete(table, owner_id, id).await
    }
}

/// Row store whose reads can be held until released.
struct HeldStore {
    inner: Arc<MemoryBackend>,
    holding: AtomicBool,
    release: Notify,
}

#[async_trait]
impl RowStore for HeldStore {
    async fn select(&self, query: RowQuery) -> BackendResult<Vec<Value>> {
        if self.holding.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        self.inner.select(query).await
    }

    async fn insert(&self, table: &str, row: Value) -> BackendResult<Value> {
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: &str, owner_id: &OwnerId, id: &str, patch: Value) -> BackendResult<()> {
        self.inner.update(table, owner_id, id, patch).await
    }

    async fn delete(&self, table: &str, owner_id: &OwnerId, id: &str) -> BackendResult<()> {
        self.inner.delete(table, owner_id, id).await
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn sell(backend: &MemoryBackend, amount: f64) {
    backend
        .insert(
            "sales",
            json!({ "user_id": "u1", "item_name": "Chai", "amount": amount, "payment_method": "upi" }),
        )
        .await
        .unwrap();
    settle().await;
}

fn owner() -> OwnerId {
    OwnerId::new("u1")
}

#[tokio::test(start_paused = true)]
async fn mount_loads_and_changes_refresh_the_summary() {
    let backend = Arc::new(MemoryBackend::new());
    sell(&backend, 100.0).await;

    let panel = LivePanel::<SalesPanel>::mount(
        owner(),
        backend.clone(),
        backend.clone(),
        &AlwaysVisible,
        LiveSettings::default(),
    )
    .await;
    assert!(panel.is_live());
    assert_eq!(panel.summary().total_revenue, 100.0);

    let mut events = panel.events();
    sell(&backend, 50.0).await;

    match events.recv().await.unwrap() {
        PanelEvent::Refreshed {
            table,
            reason,
            summary,
        } => {
            assert_eq!(table, "sales");
            assert_eq!(reason, Notification::Leading);
            assert_eq!(summary.total_revenue, 150.0);
            assert_eq!(summary.sale_count, 2);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn burst_of_sales_refetches_twice() {
    let backend = Arc::new(MemoryBackend::new());
    let panel = LivePanel::<SalesPanel>::mount(
        owner(),
        backend.clone(),
        backend.clone(),
        &AlwaysVisible,
        LiveSettings::default(),
    )
    .await;
    let mut events = panel.events();

    for _ in 0..5 {
        sell(&backend, 10.0).await;
        sleep(Duration::from_millis(100)).await;
    }
    sleep(Duration::from_secs(3)).await;

    let mut reasons = Vec::new();
    while let Ok(PanelEvent::Refreshed { reason, summary, .. }) = events.try_recv() {
        reasons.push((reason, summary.sale_count));
    }
    assert_eq!(
        reasons,
        vec![(Notification::Leading, 1), (Notification::Trailing, 5)]
    );
}

#[tokio::test(start_paused = true)]
async fn refresh_failures_become_events() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(FlakyStore {
        inner: backend.clone(),
        failing: AtomicBool::new(false),
    });
    let panel = LivePanel::<SalesPanel>::mount(
        owner(),
        store.clone(),
        backend.clone(),
        &AlwaysVisible,
        LiveSettings::default(),
    )
    .await;
    let mut events = panel.events();

    store.failing.store(true, Ordering::SeqCst);
    sell(&backend, 10.0).await;

    match events.recv().await.unwrap() {
        PanelEvent::RefreshFailed { table, message } => {
            assert_eq!(table, "sales");
            assert!(message.contains("503"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    // The cached snapshot is kept.
    assert_eq!(panel.summary().sale_count, 0);
}

#[tokio::test(start_paused = true)]
async fn unmount_stops_refreshes() {
    let backend = Arc::new(MemoryBackend::new());
    let panel = LivePanel::<SalesPanel>::mount(
        owner(),
        backend.clone(),
        backend.clone(),
        &AlwaysVisible,
        LiveSettings::default(),
    )
    .await;
    let mut events = panel.events();

    panel.unmount().await;
    assert_eq!(backend.open_channels(), 0);

    sell(&backend, 10.0).await;
    sleep(Duration::from_secs(2)).await;
    assert!(matches!(events.try_recv(), Err(TryRecvError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn unmount_aborts_refetch_in_flight() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(HeldStore {
        inner: backend.clone(),
        holding: AtomicBool::new(false),
        release: Notify::new(),
    });
    let panel = LivePanel::<SalesPanel>::mount(
        owner(),
        store.clone(),
        backend.clone(),
        &AlwaysVisible,
        LiveSettings::default(),
    )
    .await;
    let mut events = panel.events();

    store.holding.store(true, Ordering::SeqCst);
    sell(&backend, 10.0).await;
    panel.unmount().await;
    settle().await;

    store.release.notify_waiters();
    settle().await;
    sleep(Duration::from_secs(2)).await;

    // The held refetch never published its result.
    assert!(matches!(events.try_recv(), Err(TryRecvError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn panels_hold_independent_channels_and_pacing() {
    let backend = Arc::new(MemoryBackend::new());
    let visibility = VisibilitySignal::new();
    let settings = LiveSettings {
        throttle: None,
        idle: IdlePolicy::TearDownAfter(Duration::from_secs(60)),
    };

    let sales = LivePanel::<SalesPanel>::mount(
        owner(),
        backend.clone(),
        backend.clone(),
        &visibility,
        settings,
    )
    .await;
    let inventory = LivePanel::<InventoryPanel>::mount(
        owner(),
        backend.clone(),
        backend.clone(),
        &visibility,
        settings,
    )
    .await;
    assert_eq!(backend.open_channels(), 2);

    let mut inventory_events = inventory.events();
    for quantity in [5.0, 4.0] {
        backend
            .insert(
                "inventory",
                json!({ "user_id": "u1", "item_name": "Oil", "quantity": quantity, "cost_price": 100.0 }),
            )
            .await
            .unwrap();
        settle().await;
        sleep(Duration::from_millis(1500)).await;
    }
    sleep(Duration::from_secs(1)).await;

    // Second insert at 1.5 s falls inside the 2 s inventory window.
    let mut reasons = Vec::new();
    while let Ok(PanelEvent::Refreshed { reason, summary, .. }) = inventory_events.try_recv() {
        reasons.push((reason, summary.item_count));
    }
    assert_eq!(
        reasons,
        vec![(Notification::Leading, 1), (Notification::Trailing, 2)]
    );

    visibility.hide();
    settle().await;
    sleep(Duration::from_secs(61)).await;
    assert!(!sales.is_live());
    assert!(!inventory.is_live());
    assert_eq!(backend.open_channels(), 0);

    let mut sales_events = sales.events();
    visibility.show();
    settle().await;
    match sales_events.recv().await.unwrap() {
        PanelEvent::Refreshed { reason, .. } => assert_eq!(reason, Notification::Resumed),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(sales.is_live());
}

#[tokio::test(start_paused = true)]
async fn signed_out_panel_stays_offline() {
    let backend = Arc::new(MemoryBackend::new());
    let feed: Arc<dyn ChangeFeed> = backend.clone();
    let panel = LivePanel::<SalesPanel>::mount(
        OwnerId::new(""),
        backend.clone(),
        feed,
        &AlwaysVisible,
        LiveSettings::default(),
    )
    .await;

    assert!(!panel.is_live());
    assert_eq!(backend.subscribe_calls(), 0);
    assert!(panel.panel().snapshot().fetched_at.is_none());
}
