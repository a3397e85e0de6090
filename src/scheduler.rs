//! Debounced scheduling of full resyncs.
//!
//! Every configuration change asks for a resync; the scheduler coalesces
//! those requests into a single pending deadline a short fixed delay out.
//! The first request arms the deadline, later requests while one is
//! pending are absorbed. Time comes from an injected [`Clock`] so the
//! debounce window is testable without sleeping.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::Clock;

pub struct ResyncScheduler {
    delay: Duration,
    pending: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
}

impl ResyncScheduler {
    pub fn new(delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
            clock,
        }
    }

    /// Arm a resync `delay` from now unless one is already pending.
    pub fn schedule(&self) {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_none() {
            *pending = Some(self.clock.now() + self.delay);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    /// Consume the pending deadline if it has elapsed. Returns true at
    /// most once per scheduled resync.
    pub fn pop_due(&self) -> bool {
        let mut pending = self.pending.lock().unwrap();
        match *pending {
            Some(deadline) if deadline <= self.clock.now() => {
                *pending = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn scheduler(clock: Arc<ManualClock>) -> ResyncScheduler {
        ResyncScheduler::new(Duration::from_secs(5), clock)
    }

    #[test]
    fn test_not_due_before_delay_elapses() {
        let clock = Arc::new(ManualClock::new());
        let s = scheduler(clock.clone());
        s.schedule();
        assert!(s.is_pending());
        assert!(!s.pop_due());

        clock.advance(Duration::from_secs(4));
        assert!(!s.pop_due());

        clock.advance(Duration::from_secs(2));
        assert!(s.pop_due());
        assert!(!s.is_pending());
    }

    #[test]
    fn test_rapid_schedules_coalesce_into_one() {
        let clock = Arc::new(ManualClock::new());
        let s = scheduler(clock.clone());
        s.schedule();
        clock.advance(Duration::from_secs(2));
        // Edits keep arriving; the original deadline stands
        s.schedule();
        s.schedule();

        clock.advance(Duration::from_secs(3));
        assert!(s.pop_due());
        // Only one resync fires for the whole burst
        assert!(!s.pop_due());
    }

    #[test]
    fn test_schedule_after_fire_arms_again() {
        let clock = Arc::new(ManualClock::new());
        let s = scheduler(clock.clone());
        s.schedule();
        clock.advance(Duration::from_secs(6));
        assert!(s.pop_due());

        s.schedule();
        clock.advance(Duration::from_secs(6));
        assert!(s.pop_due());
    }
}
