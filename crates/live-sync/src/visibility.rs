//! Host visibility signal.

use std::sync::Arc;
use tokio::sync::watch;

/// Whether the hosting surface is currently in front of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostVisibility {
    #[default]
    Visible,
    Hidden,
}

/// Source of host visibility transitions.
///
/// Controllers only react to changes observed on the returned receiver; the
/// value at subscription time is treated as already seen. Dropping the
/// receiver unsubscribes.
pub trait VisibilitySource: Send + Sync {
    fn watch(&self) -> watch::Receiver<HostVisibility>;
}

/// Process-wide visibility signal shared by every mounted controller.
#[derive(Debug, Clone)]
pub struct VisibilitySignal {
    sender: Arc<watch::Sender<HostVisibility>>,
}

impl VisibilitySignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(HostVisibility::Visible);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn set(&self, visibility: HostVisibility) {
        self.sender.send_if_modified(|current| {
            if *current == visibility {
                return false;
            }
            *current = visibility;
            true
        });
    }

    pub fn hide(&self) {
        self.set(HostVisibility::Hidden);
    }

    pub fn show(&self) {
        self.set(HostVisibility::Visible);
    }

    pub fn current(&self) -> HostVisibility {
        *self.sender.borrow()
    }
}

impl Default for VisibilitySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilitySource for VisibilitySignal {
    fn watch(&self) -> watch::Receiver<HostVisibility> {
        self.sender.subscribe()
    }
}

/// A host that is never hidden (headless workers, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysVisible;

impl VisibilitySource for AlwaysVisible {
    fn watch(&self) -> watch::Receiver<HostVisibility> {
        // Sender dropped right away: the receiver never reports a change.
        let (_sender, receiver) = watch::channel(HostVisibility::Visible);
        receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let signal = VisibilitySignal::new();
        let mut receiver = signal.watch();

        signal.hide();
        receiver.changed().await.unwrap();
        assert_eq!(*receiver.borrow_and_update(), HostVisibility::Hidden);
        assert_eq!(signal.current(), HostVisibility::Hidden);
    }

    #[tokio::test]
    async fn setting_same_value_is_not_a_transition() {
        let signal = VisibilitySignal::new();
        let receiver = signal.watch();
        signal.show();
        assert!(!receiver.has_changed().unwrap());
    }

    #[tokio::test]
    async fn always_visible_never_changes() {
        let mut receiver = AlwaysVisible.watch();
        assert!(receiver.changed().await.is_err());
    }
}
