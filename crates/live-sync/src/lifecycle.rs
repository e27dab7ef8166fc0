//! Visibility-driven subscription lifecycle.
//!
//! ```text
//! Active ──hidden──▶ Idle(deadline) ──deadline──▶ Unsubscribed
//!   ▲                    │                            │
//!   └─────visible────────┘                            │
//!   └──────────────visible (resubscribe + refresh)────┘
//! ```

use crate::descriptor::IdlePolicy;
use tokio::time::Instant;

/// Lifecycle state, generic over the open channel type.
///
/// `channel` is `None` when establishment failed or the feed closed the
/// channel; the controller is still Active/Idle from the host's point of view.
#[derive(Debug)]
pub(crate) enum Lifecycle<C> {
    Active { channel: Option<C> },
    Idle { channel: Option<C>, deadline: Instant },
    Unsubscribed,
}

/// What the controller has to do after a visible transition.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Resume {
    /// Already active.
    Nothing,
    /// Idle timer cancelled; channel untouched, no forced refresh.
    TimerCancelled,
    /// Channel was torn down: resubscribe and force a refresh.
    Resubscribe,
}

impl<C> Lifecycle<C> {
    pub(crate) fn active(channel: Option<C>) -> Self {
        Lifecycle::Active { channel }
    }

    /// Host became hidden. Starts the idle timer when idle detection is on.
    pub(crate) fn hide(&mut self, now: Instant, idle: IdlePolicy) -> bool {
        let IdlePolicy::TearDownAfter(threshold) = idle else {
            return false;
        };
        match std::mem::replace(self, Lifecycle::Unsubscribed) {
            Lifecycle::Active { channel } => {
                *self = Lifecycle::Idle {
                    channel,
                    deadline: now + threshold,
                };
                true
            }
            other => {
                *self = other;
                false
            }
        }
    }

    /// Host became visible.
    pub(crate) fn show(&mut self) -> Resume {
        match std::mem::replace(self, Lifecycle::Unsubscribed) {
            Lifecycle::Idle { channel, .. } => {
                *self = Lifecycle::Active { channel };
                Resume::TimerCancelled
            }
            Lifecycle::Unsubscribed => Resume::Resubscribe,
            active @ Lifecycle::Active { .. } => {
                *self = active;
                Resume::Nothing
            }
        }
    }

    /// Idle deadline reached; returns the channel to close.
    pub(crate) fn idle_elapsed(&mut self) -> Option<C> {
        match std::mem::replace(self, Lifecycle::Unsubscribed) {
            Lifecycle::Idle { channel, .. } => channel,
            other => {
                *self = other;
                None
            }
        }
    }

    /// Take the channel out, leaving the state otherwise unchanged.
    pub(crate) fn take_channel(&mut self) -> Option<C> {
        match self {
            Lifecycle::Active { channel } | Lifecycle::Idle { channel, .. } => channel.take(),
            Lifecycle::Unsubscribed => None,
        }
    }

    pub(crate) fn channel_mut(&mut self) -> Option<&mut C> {
        match self {
            Lifecycle::Active { channel } | Lifecycle::Idle { channel, .. } => channel.as_mut(),
            Lifecycle::Unsubscribed => None,
        }
    }

    pub(crate) fn idle_deadline(&self) -> Option<Instant> {
        match self {
            Lifecycle::Idle { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    pub(crate) fn has_channel(&self) -> bool {
        match self {
            Lifecycle::Active { channel } | Lifecycle::Idle { channel, .. } => channel.is_some(),
            Lifecycle::Unsubscribed => false,
        }
    }
}
