use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Time source and blocking wait used by every poll loop and retry backoff.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Virtual clock: `sleep` advances time instantly and is recorded.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        *elapsed += duration;
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        self.advance(duration);
    }
}

/// Overall budget of one lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    pub fn after(clock: &dyn Clock, budget: Duration) -> Self {
        let started = clock.now();
        Self {
            started,
            at: started + budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.at.saturating_duration_since(self.started)
    }

    pub fn elapsed(&self, clock: &dyn Clock) -> Duration {
        clock.now().saturating_duration_since(self.started)
    }

    pub fn remaining(&self, clock: &dyn Clock) -> Duration {
        self.at.saturating_duration_since(clock.now())
    }

    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        clock.now() >= self.at
    }

    /// True when a wait of `duration` would still end inside the budget.
    pub fn allows(&self, clock: &dyn Clock, duration: Duration) -> bool {
        duration <= self.remaining(clock)
    }

    /// Sleeps for `duration`, cut short at the deadline. Returns false when
    /// the budget was already spent and no sleep happened.
    pub fn sleep(&self, clock: &dyn Clock, duration: Duration) -> bool {
        let remaining = self.remaining(clock);
        if remaining.is_zero() {
            return false;
        }
        clock.sleep(duration.min(remaining));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_only_on_sleep() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_secs(3));
        clock.sleep(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(3250));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(3), Duration::from_millis(250)]
        );
    }

    #[test]
    fn deadline_caps_sleep_at_remaining_budget() {
        let clock = ManualClock::new();
        let deadline = Deadline::after(&clock, Duration::from_secs(25));
        assert!(deadline.sleep(&clock, Duration::from_secs(10)));
        assert!(deadline.sleep(&clock, Duration::from_secs(10)));
        assert!(!deadline.is_expired(&clock));
        assert!(deadline.sleep(&clock, Duration::from_secs(10)));
        assert_eq!(clock.sleeps().last(), Some(&Duration::from_secs(5)));
        assert!(deadline.is_expired(&clock));
        assert!(!deadline.sleep(&clock, Duration::from_secs(10)));
        assert_eq!(deadline.elapsed(&clock), Duration::from_secs(25));
        assert_eq!(deadline.budget(), Duration::from_secs(25));
    }

    #[test]
    fn allows_compares_against_remaining_budget() {
        let clock = ManualClock::new();
        let deadline = Deadline::after(&clock, Duration::from_secs(4));
        assert!(deadline.allows(&clock, Duration::from_secs(4)));
        clock.advance(Duration::from_secs(1));
        assert!(!deadline.allows(&clock, Duration::from_secs(4)));
        assert_eq!(deadline.remaining(&clock), Duration::from_secs(3));
    }
}
