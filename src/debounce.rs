//! Resettable single-shot timer.
//!
//! There is no background timer: the owner records a deadline and checks it
//! from its regular tick with the current time. Rescheduling replaces the
//! previous deadline, so at most one is ever pending.

use std::time::Duration;
use web_time::Instant;

#[derive(Debug, Clone)]
pub struct Debouncer {
    /// Delay used by [`schedule`](Self::schedule)
    delay: Duration,
    /// When the pending timer fires, if one is pending
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// (Re)start the timer with the default delay.
    pub fn schedule(&mut self, now: Instant) {
        self.schedule_after(now, self.delay);
    }

    /// (Re)start the timer with an explicit delay.
    pub fn schedule_after(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    /// Drop the pending timer, if any.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns true exactly once when the deadline has been reached.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
