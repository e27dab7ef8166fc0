//! What a controller subscribes to and how it paces notifications.

use saathi_backend::{ChangeKind, ChangeKinds, ChannelRequest, OwnerId};
use std::sync::Arc;
use std::time::Duration;

/// Default throttle window.
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(1000);

/// Default time the host may stay hidden before the channel is torn down.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Why the owner's callback fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// First change after a quiet period, delivered immediately.
    Leading,
    /// Changes coalesced during an open throttle window.
    Trailing,
    /// The host came back after an idle teardown; local data may be stale.
    Resumed,
}

/// Owner callback. Runs on the controller's task and must not block.
pub type ChangeCallback = Arc<dyn Fn(Notification) + Send + Sync>;

/// Idle teardown policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePolicy {
    /// Stay subscribed for the whole mounted lifetime.
    Disabled,
    /// Tear the channel down after the host has been hidden this long.
    TearDownAfter(Duration),
}

impl Default for IdlePolicy {
    fn default() -> Self {
        IdlePolicy::TearDownAfter(DEFAULT_IDLE_THRESHOLD)
    }
}

/// Immutable description of one logical subscription.
///
/// Built once, then handed to [`crate::ThrottledSubscription::open`]; a
/// different table, owner or pacing needs a new controller.
#[derive(Clone)]
pub struct SubscriptionDescriptor {
    table: String,
    owner_id: OwnerId,
    kinds: ChangeKinds,
    throttle: Duration,
    idle: IdlePolicy,
    on_change: ChangeCallback,
}

impl SubscriptionDescriptor {
    /// Watch every change kind on `table` for `owner_id` with default pacing.
    pub fn new(
        table: impl Into<String>,
        owner_id: impl Into<OwnerId>,
        on_change: impl Fn(Notification) + Send + Sync + 'static,
    ) -> Self {
        Self {
            table: table.into(),
            owner_id: owner_id.into(),
            kinds: ChangeKinds::ALL,
            throttle: DEFAULT_THROTTLE,
            idle: IdlePolicy::default(),
            on_change: Arc::new(on_change),
        }
    }

    #[must_use]
    pub fn events(mut self, kinds: ChangeKinds) -> Self {
        self.kinds = kinds;
        self
    }

    #[must_use]
    pub fn event(self, kind: ChangeKind) -> Self {
        self.events(ChangeKinds::only(kind))
    }

    #[must_use]
    pub fn throttle(mut self, window: Duration) -> Self {
        self.throttle = window;
        self
    }

    #[must_use]
    pub fn idle_policy(mut self, idle: IdlePolicy) -> Self {
        self.idle = idle;
        self
    }

    #[must_use]
    pub fn without_idle_detection(self) -> Self {
        self.idle_policy(IdlePolicy::Disabled)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn kinds(&self) -> ChangeKinds {
        self.kinds
    }

    pub fn throttle_window(&self) -> Duration {
        self.throttle
    }

    pub fn idle(&self) -> IdlePolicy {
        self.idle
    }

    pub(crate) fn channel_request(&self) -> ChannelRequest {
        ChannelRequest::new(self.table.clone(), self.owner_id.clone(), self.kinds)
    }

    pub(crate) fn deliver(&self, notification: Notification) {
        (self.on_change)(notification);
    }
}

impl std::fmt::Debug for SubscriptionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionDescriptor")
            .field("table", &self.table)
            .field("owner_id", &self.owner_id)
            .field("kinds", &self.kinds)
            .field("throttle", &self.throttle)
            .field("idle", &self.idle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let descriptor = SubscriptionDescriptor::new("sales", "u1", |_| {});
        assert_eq!(descriptor.table(), "sales");
        assert_eq!(descriptor.owner_id().as_str(), "u1");
        assert!(descriptor.kinds().is_all());
        assert_eq!(descriptor.throttle_window(), Duration::from_millis(1000));
        assert_eq!(
            descriptor.idle(),
            IdlePolicy::TearDownAfter(Duration::from_secs(300))
        );
    }

    #[test]
    fn builder_overrides() {
        let descriptor = SubscriptionDescriptor::new("inventory", "u1", |_| {})
            .event(ChangeKind::Insert)
            .throttle(Duration::from_millis(2000))
            .without_idle_detection();
        assert!(descriptor.kinds().contains(ChangeKind::Insert));
        assert!(!descriptor.kinds().contains(ChangeKind::Delete));
        assert_eq!(descriptor.throttle_window(), Duration::from_millis(2000));
        assert_eq!(descriptor.idle(), IdlePolicy::Disabled);
    }

    #[test]
    fn channel_request_carries_owner_filter() {
        let request = SubscriptionDescriptor::new("sales", "u1", |_| {}).channel_request();
        assert_eq!(request.table, "sales");
        assert_eq!(request.filter_expression(), "user_id=eq.u1");
    }
}
