// Tick-driven tasks and cancellation
//
// Suspended work (long-press timing, waiting for devices) is polled once per
// driver tick with the current simulated time instead of running on its own.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: Cell<bool>,
    parent: Option<CancellationToken>,
}

/// Cooperative cancellation flag
///
/// Child tokens observe cancellation of any ancestor.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Rc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is cancelled with this one, or on its own
    pub fn child_token(&self) -> Self {
        Self {
            inner: Rc::new(TokenInner {
                cancelled: Cell::new(false),
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.get()
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Result of polling a tick task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPoll<T> {
    Pending,
    Ready(T),
    Cancelled,
}

/// Work advanced by the driver tick
pub trait TickTask {
    type Output;

    /// Advance to `now` (time since the driver started)
    fn poll(&mut self, now: Duration) -> TaskPoll<Self::Output>;
}

/// Completes once a duration has elapsed in driver time
#[derive(Debug, Clone)]
pub struct Timer {
    started: Duration,
    duration: Duration,
    token: CancellationToken,
}

impl Timer {
    pub fn new(started: Duration, duration: Duration, token: CancellationToken) -> Self {
        Self {
            started,
            duration,
            token,
        }
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.started)
    }

    pub fn remaining(&self, now: Duration) -> Duration {
        self.duration.saturating_sub(self.elapsed(now))
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl TickTask for Timer {
    type Output = ();

    fn poll(&mut self, now: Duration) -> TaskPoll<()> {
        if self.token.is_cancelled() {
            TaskPoll::Cancelled
        } else if self.elapsed(now) >= self.duration {
            TaskPoll::Ready(())
        } else {
            TaskPoll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_timer_completes_after_duration() {
        let mut timer = Timer::new(ms(100), ms(50), CancellationToken::new());
        assert_eq!(timer.poll(ms(100)), TaskPoll::Pending);
        assert_eq!(timer.poll(ms(149)), TaskPoll::Pending);
        assert_eq!(timer.poll(ms(150)), TaskPoll::Ready(()));
        assert_eq!(timer.remaining(ms(120)), ms(30));
    }

    #[test]
    fn test_cancel_wins_over_completion() {
        let token = CancellationToken::new();
        let mut timer = Timer::new(ms(0), ms(10), token.clone());
        token.cancel();
        assert_eq!(timer.poll(ms(500)), TaskPoll::Cancelled);
    }

    #[test]
    fn test_child_token_follows_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let grandchild = child.child_token();
        assert!(!grandchild.is_cancelled());

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_cancel_leaves_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_elapsed_before_start_is_zero() {
        let timer = Timer::new(ms(100), ms(50), CancellationToken::new());
        assert_eq!(timer.elapsed(ms(40)), Duration::ZERO);
    }
}
