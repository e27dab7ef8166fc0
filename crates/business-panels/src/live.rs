//! Panels kept fresh by their own throttled subscription.

use crate::panel::{Panel, PanelKind, RefreshOutcome};
use live_sync::{
    IdlePolicy, Notification, SubscriptionDescriptor, SubscriptionStatus, ThrottledSubscription,
    VisibilitySource,
};
use saathi_backend::{ChangeFeed, OwnerId, RowStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Outcome of a change-driven refresh, for the host to render or toast.
#[derive(Debug, Clone)]
pub enum PanelEvent<S> {
    Refreshed {
        table: &'static str,
        reason: Notification,
        summary: S,
    },
    RefreshFailed {
        table: &'static str,
        message: String,
    },
}

/// Per-panel live subscription settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveSettings {
    /// Overrides the panel kind's preferred throttle window.
    pub throttle: Option<Duration>,
    pub idle: IdlePolicy,
}

/// A mounted panel: local cache plus its own change subscription.
pub struct LivePanel<K: PanelKind> {
    panel: Arc<Panel<K>>,
    subscription: ThrottledSubscription,
    events: broadcast::Sender<PanelEvent<K::Summary>>,
    /// Change-driven refetches still running.
    refreshes: Arc<Mutex<JoinSet<()>>>,
}

impl<K: PanelKind> LivePanel<K> {
    /// Load the panel once and open its subscription.
    ///
    /// Each notification spawns a full refetch; the result is published on
    /// [`LivePanel::events`]. A failed initial load is logged and retried by
    /// the next notification.
    pub async fn mount(
        owner_id: OwnerId,
        store: Arc<dyn RowStore>,
        feed: Arc<dyn ChangeFeed>,
        visibility: &dyn VisibilitySource,
        settings: LiveSettings,
    ) -> Self {
        let panel = Arc::new(Panel::<K>::new(owner_id.clone(), store));
        let (events, _) = broadcast::channel(32);

        if !owner_id.is_empty() {
            if let Err(e) = panel.refresh().await {
                warn!(table = K::TABLE, error = %e, "Initial panel load failed");
            }
        }

        let refreshes = Arc::new(Mutex::new(JoinSet::new()));
        let callback_panel = panel.clone();
        let callback_events = events.clone();
        let callback_refreshes = refreshes.clone();
        let descriptor = SubscriptionDescriptor::new(K::TABLE, owner_id, move |reason| {
            let panel = callback_panel.clone();
            let events = callback_events.clone();
            let mut running = callback_refreshes.lock().expect("lock poisoned");
            // Reap finished refetches.
            while running.try_join_next().is_some() {}
            running.spawn(async move {
                let event = match panel.refresh().await {
                    Ok(RefreshOutcome::Applied(snapshot)) => PanelEvent::Refreshed {
                        table: K::TABLE,
                        reason,
                        summary: snapshot.summary,
                    },
                    Ok(RefreshOutcome::Superseded) => return,
                    Err(e) => {
                        warn!(table = K::TABLE, error = %e, "Panel refresh failed");
                        PanelEvent::RefreshFailed {
                            table: K::TABLE,
                            message: e.to_string(),
                        }
                    }
                };
                // No receivers is fine: nobody is rendering right now.
                let _ = events.send(event);
            });
        })
        .throttle(settings.throttle.unwrap_or_else(K::throttle))
        .idle_policy(settings.idle);

        let subscription = ThrottledSubscription::open(descriptor, feed, visibility).await;
        info!(
            panel = K::NAME,
            subscribed = subscription.is_subscribed(),
            "Panel mounted"
        );

        Self {
            panel,
            subscription,
            events,
            refreshes,
        }
    }

    pub fn panel(&self) -> &Panel<K> {
        &self.panel
    }

    pub fn summary(&self) -> K::Summary {
        self.panel.summary()
    }

    /// Refresh results, in completion order.
    pub fn events(&self) -> broadcast::Receiver<PanelEvent<K::Summary>> {
        self.events.subscribe()
    }

    /// The "Live" badge.
    pub fn status(&self) -> watch::Receiver<SubscriptionStatus> {
        self.subscription.status()
    }

    pub fn is_live(&self) -> bool {
        self.subscription.is_subscribed()
    }

    /// Close the subscription and abort refetches still in flight. No
    /// event is published afterwards.
    pub async fn unmount(self) {
        self.subscription.close().await;
        let aborted = {
            let mut running = self.refreshes.lock().expect("lock poisoned");
            let pending = running.len();
            running.abort_all();
            pending
        };
        info!(panel = K::NAME, aborted, "Panel unmounted");
    }
}

impl<K: PanelKind> std::fmt::Debug for LivePanel<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivePanel")
            .field("panel", &self.panel)
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}
