//! Throttled subscription controller.

use crate::descriptor::{IdlePolicy, Notification, SubscriptionDescriptor};
use crate::lifecycle::{Lifecycle, Resume};
use crate::throttle::ThrottleWindow;
use crate::visibility::{HostVisibility, VisibilitySource};
use saathi_backend::{ChangeFeed, ChannelHandle, RowChange};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Channel status exposed to the UI (the "Live" badge).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Subscribed,
    NotSubscribed,
}

impl SubscriptionStatus {
    pub fn is_subscribed(&self) -> bool {
        matches!(self, SubscriptionStatus::Subscribed)
    }
}

enum Command {
    Close { done: oneshot::Sender<()> },
}

/// Handle to one mounted subscription.
///
/// Dropping the handle tears the subscription down in the background; call
/// [`ThrottledSubscription::close`] to wait for the teardown.
pub struct ThrottledSubscription {
    table: String,
    status: watch::Receiver<SubscriptionStatus>,
    commands: Option<mpsc::UnboundedSender<Command>>,
}

impl ThrottledSubscription {
    /// Open a subscription for `descriptor`.
    ///
    /// With an empty owner id nothing is opened and the returned controller
    /// reports [`SubscriptionStatus::NotSubscribed`] forever. Otherwise the
    /// channel is established before this returns; a failed establishment is
    /// only visible through the status.
    pub async fn open(
        descriptor: SubscriptionDescriptor,
        feed: Arc<dyn ChangeFeed>,
        visibility: &dyn VisibilitySource,
    ) -> Self {
        let table = descriptor.table().to_string();

        if descriptor.owner_id().is_empty() {
            debug!(table = %table, "No owner id, not subscribing");
            let (_status_tx, status) = watch::channel(SubscriptionStatus::NotSubscribed);
            return Self {
                table,
                status,
                commands: None,
            };
        }

        let channel = establish(&feed, &descriptor).await;
        let initial = if channel.is_some() {
            SubscriptionStatus::Subscribed
        } else {
            SubscriptionStatus::NotSubscribed
        };
        let (status_tx, status) = watch::channel(initial);

        let mut visibility = visibility.watch();
        visibility.borrow_and_update();
        let watch_visibility = matches!(descriptor.idle(), IdlePolicy::TearDownAfter(_));

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let task = SubscriptionTask {
            descriptor,
            feed,
            lifecycle: Lifecycle::active(channel),
            window: ThrottleWindow::Closed,
            visibility,
            watch_visibility,
            commands: commands_rx,
            status: status_tx,
        };
        tokio::spawn(task.run());

        Self {
            table,
            status,
            commands: Some(commands_tx),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Observable subscription status.
    pub fn status(&self) -> watch::Receiver<SubscriptionStatus> {
        self.status.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.status.borrow().is_subscribed()
    }

    /// Tear down the channel and cancel all timers.
    ///
    /// Idempotent. Once this returns the callback will not fire again.
    pub async fn close(&self) {
        let Some(commands) = &self.commands else {
            return;
        };
        let (done, finished) = oneshot::channel();
        if commands.send(Command::Close { done }).is_err() {
            // Task already gone.
            return;
        }
        let _ = finished.await;
    }
}

impl std::fmt::Debug for ThrottledSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledSubscription")
            .field("table", &self.table)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

/// A live channel plus the receiving end of its events.
struct OpenChannel {
    handle: ChannelHandle,
    events: mpsc::UnboundedReceiver<RowChange>,
}

async fn establish(
    feed: &Arc<dyn ChangeFeed>,
    descriptor: &SubscriptionDescriptor,
) -> Option<OpenChannel> {
    let request = descriptor.channel_request();
    let filter = request.filter_expression();
    let (sink, events) = mpsc::unbounded_channel();

    match feed.subscribe(request, sink).await {
        Ok(handle) => {
            info!(
                table = descriptor.table(),
                filter = %filter,
                channel = handle.id(),
                "Realtime subscription established"
            );
            Some(OpenChannel { handle, events })
        }
        Err(err) => {
            warn!(
                table = descriptor.table(),
                filter = %filter,
                error = %err,
                "Realtime subscription failed"
            );
            None
        }
    }
}

/// Everything the select loop can wake up for.
enum Wake {
    Command(Option<Command>),
    Change(Option<RowChange>),
    WindowElapsed,
    Visibility(bool),
    IdleElapsed,
}

struct SubscriptionTask {
    descriptor: SubscriptionDescriptor,
    feed: Arc<dyn ChangeFeed>,
    lifecycle: Lifecycle<OpenChannel>,
    window: ThrottleWindow,
    visibility: watch::Receiver<HostVisibility>,
    watch_visibility: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<SubscriptionStatus>,
}

async fn next_change(lifecycle: &mut Lifecycle<OpenChannel>) -> Option<RowChange> {
    match lifecycle.channel_mut() {
        Some(channel) => channel.events.recv().await,
        None => std::future::pending().await,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365)
}

// A task that ends for any reason must not leave the badge on Live.
impl Drop for SubscriptionTask {
    fn drop(&mut self) {
        self.set_status(SubscriptionStatus::NotSubscribed);
    }
}

impl SubscriptionTask {
    async fn run(mut self) {
        loop {
            let window_deadline = self.window.deadline();
            let idle_deadline = self.lifecycle.idle_deadline();

            let wake = tokio::select! {
                biased;
                command = self.commands.recv() => Wake::Command(command),
                change = next_change(&mut self.lifecycle) => Wake::Change(change),
                _ = sleep_until(window_deadline.unwrap_or_else(far_future)), if window_deadline.is_some() => {
                    Wake::WindowElapsed
                }
                changed = self.visibility.changed(), if self.watch_visibility => {
                    Wake::Visibility(changed.is_ok())
                }
                _ = sleep_until(idle_deadline.unwrap_or_else(far_future)), if idle_deadline.is_some() => {
                    Wake::IdleElapsed
                }
            };

            match wake {
                Wake::Command(Some(Command::Close { done })) => {
                    self.teardown().await;
                    let _ = done.send(());
                    return;
                }
                Wake::Command(None) => {
                    debug!(table = self.descriptor.table(), "Controller dropped");
                    self.teardown().await;
                    return;
                }
                Wake::Change(Some(change)) => self.on_change(change),
                Wake::Change(None) => self.on_channel_lost(),
                Wake::WindowElapsed => {
                    if self.window.on_deadline() {
                        self.deliver(Notification::Trailing);
                    }
                }
                Wake::Visibility(true) => {
                    let visibility = *self.visibility.borrow_and_update();
                    self.on_visibility(visibility).await;
                }
                Wake::Visibility(false) => {
                    debug!(table = self.descriptor.table(), "Visibility source gone");
                    self.watch_visibility = false;
                }
                Wake::IdleElapsed => self.on_idle_elapsed().await,
            }
        }
    }

    fn on_change(&mut self, change: RowChange) {
        debug!(
            table = %change.table,
            kind = %change.kind,
            "Row change received"
        );
        if self
            .window
            .on_event(Instant::now(), self.descriptor.throttle_window())
        {
            self.deliver(Notification::Leading);
        }
    }

    fn on_channel_lost(&mut self) {
        if self.lifecycle.take_channel().is_some() {
            warn!(
                table = self.descriptor.table(),
                "Change feed closed the channel; live updates stopped"
            );
        }
        self.set_status(SubscriptionStatus::NotSubscribed);
    }

    async fn on_visibility(&mut self, visibility: HostVisibility) {
        match visibility {
            HostVisibility::Hidden => {
                if self.lifecycle.hide(Instant::now(), self.descriptor.idle()) {
                    debug!(table = self.descriptor.table(), "Host hidden, idle timer started");
                }
            }
            HostVisibility::Visible => match self.lifecycle.show() {
                Resume::Nothing => {}
                Resume::TimerCancelled => {
                    debug!(table = self.descriptor.table(), "Host visible, idle timer cancelled");
                }
                Resume::Resubscribe => self.resume().await,
            },
        }
    }

    async fn on_idle_elapsed(&mut self) {
        let channel = self.lifecycle.idle_elapsed();
        self.window.reset();
        if let Some(channel) = channel {
            self.remove(channel).await;
        }
        self.set_status(SubscriptionStatus::NotSubscribed);
        info!(
            table = self.descriptor.table(),
            "Idle threshold reached, subscription torn down"
        );
    }

    async fn resume(&mut self) {
        let channel = establish(&self.feed, &self.descriptor).await;
        let status = if channel.is_some() {
            SubscriptionStatus::Subscribed
        } else {
            SubscriptionStatus::NotSubscribed
        };
        self.lifecycle = Lifecycle::active(channel);
        self.set_status(status);

        info!(table = self.descriptor.table(), "Resumed after idle, forcing refresh");
        self.window
            .open(Instant::now(), self.descriptor.throttle_window());
        self.deliver(Notification::Resumed);
    }

    async fn teardown(&mut self) {
        self.window.reset();
        if let Some(channel) = self.lifecycle.take_channel() {
            self.remove(channel).await;
        }
        self.lifecycle = Lifecycle::Unsubscribed;
        self.set_status(SubscriptionStatus::NotSubscribed);
        debug!(table = self.descriptor.table(), "Subscription closed");
    }

    async fn remove(&self, channel: OpenChannel) {
        let OpenChannel { handle, events } = channel;
        drop(events);
        let id = handle.id().to_string();
        if let Err(err) = self.feed.remove_channel(handle).await {
            warn!(
                table = self.descriptor.table(),
                channel = %id,
                error = %err,
                "Failed to remove realtime channel"
            );
        }
    }

    /// Run the owner's callback. A panicking callback is logged and the
    /// controller keeps its channel and timers.
    fn deliver(&self, notification: Notification) {
        debug!(
            table = self.descriptor.table(),
            ?notification,
            "Notifying subscriber"
        );
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
            self.descriptor.deliver(notification)
        }));
        if let Err(payload) = delivered {
            error!(
                table = self.descriptor.table(),
                ?notification,
                panic = panic_message(payload.as_ref()),
                "Subscriber callback panicked"
            );
        }
    }

    fn set_status(&self, status: SubscriptionStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}
