// Long-press detection
//
// Idle -> Timing on the press edge, Timing -> Fired once the hold reaches the
// configured duration, back to Idle on release or cancel. Fires at most once
// per press cycle.

use super::task::{CancellationToken, TaskPoll, TickTask, Timer};
use std::time::Duration;

/// Sub-state of a long-press detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongPressState {
    Idle,
    Timing,
    Fired,
}

#[derive(Debug)]
pub struct LongPressDetector {
    duration: Duration,
    state: LongPressState,
    timer: Option<Timer>,
    token: CancellationToken,
}

impl LongPressDetector {
    /// Create a detector whose timers are cancelled together with `token`
    pub fn new(duration: Duration, token: CancellationToken) -> Self {
        Self {
            duration,
            state: LongPressState::Idle,
            timer: None,
            token,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn state(&self) -> LongPressState {
        self.state
    }

    /// Feed the current actuation, returns true on the tick the long-press fires
    pub fn update(&mut self, actuated: bool, now: Duration) -> bool {
        if !actuated {
            self.cancel();
            return false;
        }

        match self.state {
            LongPressState::Idle => {
                self.timer = Some(Timer::new(now, self.duration, self.token.child_token()));
                self.state = LongPressState::Timing;
                self.poll_timer(now)
            }
            LongPressState::Timing => self.poll_timer(now),
            LongPressState::Fired => false,
        }
    }

    fn poll_timer(&mut self, now: Duration) -> bool {
        let Some(timer) = self.timer.as_mut() else {
            self.state = LongPressState::Idle;
            return false;
        };

        match timer.poll(now) {
            TaskPoll::Pending => false,
            TaskPoll::Ready(()) => {
                self.timer = None;
                self.state = LongPressState::Fired;
                true
            }
            TaskPoll::Cancelled => {
                self.timer = None;
                self.state = LongPressState::Idle;
                false
            }
        }
    }

    /// Abort any timing and return to idle
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.state = LongPressState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    /// Hold from `start` to `end` in 10 ms steps, counting fires
    fn hold(detector: &mut LongPressDetector, start: u64, end: u64) -> usize {
        (start..=end)
            .step_by(10)
            .filter(|t| detector.update(true, ms(*t)))
            .count()
    }

    #[test]
    fn test_fires_once_when_held() {
        let mut detector = LongPressDetector::new(ms(500), CancellationToken::new());
        assert_eq!(hold(&mut detector, 0, 1000), 1);
        assert_eq!(detector.state(), LongPressState::Fired);
    }

    #[test]
    fn test_fires_exactly_at_duration() {
        let mut detector = LongPressDetector::new(ms(500), CancellationToken::new());
        assert!(!detector.update(true, ms(0)));
        assert!(!detector.update(true, ms(490)));
        assert!(detector.update(true, ms(500)));
    }

    #[test]
    fn test_early_release_never_fires() {
        let mut detector = LongPressDetector::new(ms(500), CancellationToken::new());
        assert_eq!(hold(&mut detector, 0, 400), 0);
        assert!(!detector.update(false, ms(410)));
        assert_eq!(detector.state(), LongPressState::Idle);
        assert_eq!(hold(&mut detector, 420, 800), 0);
    }

    #[test]
    fn test_repress_fires_again() {
        let mut detector = LongPressDetector::new(ms(500), CancellationToken::new());
        assert_eq!(hold(&mut detector, 0, 600), 1);
        detector.update(false, ms(610));
        assert_eq!(hold(&mut detector, 620, 1200), 1);
    }

    #[test]
    fn test_cancelled_token_stops_timing() {
        let token = CancellationToken::new();
        let mut detector = LongPressDetector::new(ms(100), token.clone());
        detector.update(true, ms(0));
        token.cancel();

        assert!(!detector.update(true, ms(200)));
        assert_eq!(detector.state(), LongPressState::Idle);
        assert_eq!(hold(&mut detector, 210, 600), 0);
    }

    #[test]
    fn test_cancel_resets() {
        let mut detector = LongPressDetector::new(ms(100), CancellationToken::new());
        detector.update(true, ms(0));
        detector.cancel();
        assert_eq!(detector.state(), LongPressState::Idle);
        assert!(!detector.update(true, ms(150)));
        assert!(detector.update(true, ms(250)));
    }
}
