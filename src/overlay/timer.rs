//! Polled timers for overlay state machines.
//!
//! Nothing here spawns threads or registers platform callbacks: a timer only
//! records a deadline, and the embedder polls due timers through
//! `Session::advance_timers`. Each state machine owns at most one
//! [`DebounceTimer`], and arming it replaces any pending deadline.

use std::cell::Cell;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }
}

/// One pending deadline at most. Firing consumes it.
#[derive(Debug, Default)]
pub struct DebounceTimer {
    deadline: Cell<Option<Instant>>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a fire at `now + delay`, replacing any pending deadline.
    pub fn arm(&self, now: Instant, delay: Duration) {
        self.deadline.set(Some(now + delay));
    }

    /// Returns whether a deadline was pending.
    pub fn cancel(&self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.get().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get()
    }

    /// Consumes the deadline when it has passed. Returns true exactly once per
    /// arming.
    pub fn fire_if_due(&self, now: Instant) -> bool {
        match self.deadline.get() {
            Some(deadline) if deadline <= now => {
                self.deadline.set(None);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_after_deadline() {
        let clock = ManualClock::new();
        let timer = DebounceTimer::new();
        timer.arm(clock.now(), Duration::from_millis(100));
        clock.advance(Duration::from_millis(99));
        assert!(!timer.fire_if_due(clock.now()));
        clock.advance(Duration::from_millis(1));
        assert!(timer.fire_if_due(clock.now()));
        assert!(!timer.fire_if_due(clock.now()));
        assert!(!timer.is_armed());
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let clock = ManualClock::new();
        let timer = DebounceTimer::new();
        timer.arm(clock.now(), Duration::from_millis(50));
        clock.advance(Duration::from_millis(40));
        timer.arm(clock.now(), Duration::from_millis(50));
        clock.advance(Duration::from_millis(20));
        assert!(!timer.fire_if_due(clock.now()));
        clock.advance(Duration::from_millis(30));
        assert!(timer.fire_if_due(clock.now()));
    }

    #[test]
    fn test_cancel_reports_pending() {
        let timer = DebounceTimer::new();
        assert!(!timer.cancel());
        timer.arm(Instant::now(), Duration::from_secs(1));
        assert!(timer.cancel());
        assert_eq!(timer.deadline(), None);
    }
}
