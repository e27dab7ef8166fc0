//! Leading-edge throttle with trailing coalescing.

use std::time::Duration;
use tokio::time::Instant;

/// Throttle window state.
///
/// The pending flag only exists inside `Open`, so "pending without a window"
/// cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ThrottleWindow {
    Closed,
    Open { until: Instant, pending: bool },
}

impl ThrottleWindow {
    /// Record an event; returns true when the callback must fire now.
    pub(crate) fn on_event(&mut self, now: Instant, period: Duration) -> bool {
        match self {
            ThrottleWindow::Open { until, pending } if now < *until => {
                *pending = true;
                false
            }
            // No window, or one whose deadline passed before its timer was
            // handled: a single immediate delivery covers anything pending.
            _ => {
                self.open(now, period);
                true
            }
        }
    }

    /// Window deadline reached; returns true when a trailing call is due.
    ///
    /// The window is not re-opened by the trailing call.
    pub(crate) fn on_deadline(&mut self) -> bool {
        let due = matches!(self, ThrottleWindow::Open { pending: true, .. });
        *self = ThrottleWindow::Closed;
        due
    }

    /// Start a fresh window with nothing pending.
    pub(crate) fn open(&mut self, now: Instant, period: Duration) {
        *self = ThrottleWindow::Open {
            until: now + period,
            pending: false,
        };
    }

    pub(crate) fn reset(&mut self) {
        *self = ThrottleWindow::Closed;
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        match self {
            ThrottleWindow::Open { until, .. } => Some(*until),
            ThrottleWindow::Closed => None,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(self, ThrottleWindow::Open { pending: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(1000);

    #[test]
    fn first_event_fires_and_opens_window() {
        let now = Instant::now();
        let mut window = ThrottleWindow::Closed;
        assert!(window.on_event(now, WINDOW));
        assert_eq!(window.deadline(), Some(now + WINDOW));
        assert!(!window.is_pending());
    }

    #[test]
    fn burst_inside_window_coalesces_into_one_trailing_call() {
        let start = Instant::now();
        let mut window = ThrottleWindow::Closed;
        let mut fired = 0;

        for offset in [0u64, 100, 200, 300, 900] {
            if window.on_event(start + Duration::from_millis(offset), WINDOW) {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert!(window.is_pending());

        assert!(window.on_deadline());
        assert_eq!(window, ThrottleWindow::Closed);
    }

    #[test]
    fn deadline_without_pending_is_silent() {
        let mut window = ThrottleWindow::Closed;
        window.on_event(Instant::now(), WINDOW);
        assert!(!window.on_deadline());
        assert_eq!(window.deadline(), None);
    }

    #[test]
    fn late_event_on_expired_window_fires_once() {
        let start = Instant::now();
        let mut window = ThrottleWindow::Closed;
        window.on_event(start, WINDOW);
        window.on_event(start + Duration::from_millis(500), WINDOW);
        assert!(window.is_pending());

        // Deadline passed but the timer has not been handled yet.
        let late = start + Duration::from_millis(1000);
        assert!(window.on_event(late, WINDOW));
        assert!(!window.is_pending());
        assert_eq!(window.deadline(), Some(late + WINDOW));
    }

    #[test]
    fn reset_clears_pending() {
        let start = Instant::now();
        let mut window = ThrottleWindow::Closed;
        window.on_event(start, WINDOW);
        window.on_event(start, WINDOW);
        assert!(window.is_pending());
        window.reset();
        assert!(!window.is_pending());
        assert!(!window.on_deadline());
    }
}
