//! Live sync: throttled, idle-aware change-feed subscriptions.
//!
//! Each dashboard panel mounts one [`ThrottledSubscription`] for its table. The
//! controller keeps exactly one change-feed channel open while the host is
//! visible, delivers at most one leading and one trailing notification per
//! throttle window, and tears the channel down after the host has been hidden
//! for the idle threshold.
//!
//! # Architecture
//!
//! ```text
//! ChangeFeed ──RowChange──▶ ┐
//! VisibilitySource ────────▶ ├─ controller task (select loop) ──▶ on_change(Notification)
//! close() / drop ──────────▶ ┘            │
//!                                         └──▶ watch<SubscriptionStatus>  ("Live" badge)
//! ```
//!
//! # Design Principles
//!
//! - **One task per controller**: all state transitions happen on the
//!   controller's own task, never concurrently with each other
//! - **No shared handles**: two panels on the same table get two channels
//! - **Silent failures**: establishment failures only show up as
//!   [`SubscriptionStatus::NotSubscribed`]; there is no retry loop

mod controller;
mod descriptor;
mod lifecycle;
mod throttle;
mod visibility;

pub use controller::{SubscriptionStatus, ThrottledSubscription};
pub use descriptor::{
    ChangeCallback, IdlePolicy, Notification, SubscriptionDescriptor, DEFAULT_IDLE_THRESHOLD,
    DEFAULT_THROTTLE,
};
pub use visibility::{AlwaysVisible, HostVisibility, VisibilitySignal, VisibilitySource};
