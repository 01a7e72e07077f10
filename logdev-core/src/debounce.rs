//! Leading-edge debounce gate.
//!
//! At most one event is accepted per interval. Suppressed events are dropped,
//! not queued. A gate built with a trailing edge also remembers that something
//! was suppressed, so one more read can be taken once the burst quiets down.

use std::time::Duration;

use parking_lot::Mutex;

use crate::types::Timestamp;

/// Snapshot of the gate's mutable state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceState {
    /// Timestamp of the last accepted event.
    pub last_accepted: Option<Timestamp>,
    /// Timestamp of the latest event suppressed since then. Only tracked by
    /// gates built with [`DebounceGate::with_trailing_edge`].
    pub pending: Option<Timestamp>,
}

#[derive(Debug)]
pub struct DebounceGate {
    interval: Duration,
    trailing: bool,
    // Check-and-update happens under one lock so two racing events cannot
    // both pass.
    state: Mutex<DebounceState>,
}

impl DebounceGate {
    /// Leading-edge only: a rejected event leaves the state untouched.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            trailing: false,
            state: Mutex::new(DebounceState::default()),
        }
    }

    /// Leading edge plus one trailing read owed to each suppressed burst.
    pub fn with_trailing_edge(interval: Duration) -> Self {
        Self {
            trailing: true,
            ..Self::new(interval)
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn trailing_edge(&self) -> bool {
        self.trailing
    }

    /// Accept `now` iff at least one interval has passed since the last
    /// accepted event. Timestamps earlier than the last accepted one are
    /// rejected.
    pub fn should_accept(&self, now: Timestamp) -> bool {
        let mut state = self.state.lock();
        if self.elapsed_enough(&state, now) {
            state.last_accepted = Some(now);
            state.pending = None;
            true
        } else {
            if self.trailing {
                state.pending = Some(now);
            }
            false
        }
    }

    /// Accept a trailing read if an event was suppressed and the interval has
    /// since elapsed. Consumes the pending marker.
    pub fn flush_trailing(&self, now: Timestamp) -> bool {
        let mut state = self.state.lock();
        if state.pending.is_none() || !self.elapsed_enough(&state, now) {
            return false;
        }
        state.last_accepted = Some(now);
        state.pending = None;
        true
    }

    pub fn snapshot(&self) -> DebounceState {
        *self.state.lock()
    }

    /// Forget every accepted and pending event, as if freshly built.
    pub fn reset(&self) {
        *self.state.lock() = DebounceState::default();
    }

    fn elapsed_enough(&self, state: &DebounceState, now: Timestamp) -> bool {
        match state.last_accepted {
            None => true,
            Some(last) => now
                .checked_since(last)
                .is_some_and(|elapsed| elapsed >= self.interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    const INTERVAL: Duration = Duration::from_millis(500);

    fn ms(value: u64) -> Timestamp {
        Timestamp::from_millis(value)
    }

    #[test]
    fn burst_inside_interval_accepts_only_first() {
        let gate = DebounceGate::new(INTERVAL);
        let accepted: Vec<bool> = [1_000, 1_010, 1_100, 1_300, 1_499]
            .into_iter()
            .map(|t| gate.should_accept(ms(t)))
            .collect();
        assert_eq!(accepted, vec![true, false, false, false, false]);
        assert_eq!(gate.snapshot().last_accepted, Some(ms(1_000)));
    }

    #[test]
    fn rejection_does_not_move_the_window() {
        // Gaps are each < interval but the sum is not: the gate measures from
        // the last accepted event, so the 5th event passes.
        let gate = DebounceGate::new(INTERVAL);
        assert!(gate.should_accept(ms(0)));
        assert!(!gate.should_accept(ms(200)));
        assert!(!gate.should_accept(ms(400)));
        assert!(gate.should_accept(ms(600)));
    }

    #[test]
    fn event_after_interval_renews() {
        let gate = DebounceGate::new(INTERVAL);
        assert!(gate.should_accept(ms(10_000)));
        assert!(gate.should_accept(ms(10_501)));
    }

    #[test]
    fn exactly_one_interval_is_accepted() {
        let gate = DebounceGate::new(INTERVAL);
        assert!(gate.should_accept(ms(0)));
        assert!(gate.should_accept(ms(500)));
    }

    #[test]
    fn out_of_order_timestamp_is_rejected() {
        let gate = DebounceGate::new(INTERVAL);
        assert!(gate.should_accept(ms(5_000)));
        assert!(!gate.should_accept(ms(1_000)));
        assert_eq!(gate.snapshot().last_accepted, Some(ms(5_000)));
    }

    #[test]
    fn zero_interval_accepts_everything_in_order() {
        let gate = DebounceGate::new(Duration::ZERO);
        assert!(gate.should_accept(ms(1)));
        assert!(gate.should_accept(ms(1)));
        assert!(gate.should_accept(ms(2)));
    }

    #[test]
    fn leading_only_rejection_leaves_state_unchanged() {
        let gate = DebounceGate::new(INTERVAL);
        assert!(gate.should_accept(ms(0)));
        let before = gate.snapshot();
        assert!(!gate.should_accept(ms(100)));
        assert_eq!(gate.snapshot(), before);
        assert!(!gate.flush_trailing(ms(5_000)));
    }

    #[test]
    fn reset_reopens_the_window() {
        let gate = DebounceGate::with_trailing_edge(INTERVAL);
        assert!(gate.should_accept(ms(1_000)));
        assert!(!gate.should_accept(ms(1_050)));

        gate.reset();
        assert_eq!(gate.snapshot(), DebounceState::default());
        assert!(gate.should_accept(ms(1_100)));
    }

    #[test]
    fn trailing_flush_fires_once_after_quiet_period() {
        let gate = DebounceGate::with_trailing_edge(INTERVAL);
        assert!(gate.should_accept(ms(0)));
        assert!(!gate.should_accept(ms(100)));
        assert!(!gate.should_accept(ms(200)));

        assert!(!gate.flush_trailing(ms(300)), "still inside the interval");
        assert!(gate.flush_trailing(ms(520)));
        assert!(!gate.flush_trailing(ms(2_000)), "pending marker consumed");
    }

    #[test]
    fn trailing_flush_without_suppression_is_noop() {
        let gate = DebounceGate::with_trailing_edge(INTERVAL);
        assert!(gate.should_accept(ms(0)));
        assert!(!gate.flush_trailing(ms(5_000)));
    }

    #[test]
    fn concurrent_events_pass_the_gate_once() {
        let gate = Arc::new(DebounceGate::new(INTERVAL));
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    gate.should_accept(ms(42))
                })
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|accepted| *accepted)
            .count();
        assert_eq!(accepted, 1);
    }
}
