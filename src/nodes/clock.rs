use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::mem;
use std::time::{Duration, Instant};

/// A scheduled action to be executed at a specific time.
#[derive(Debug, Clone)]
pub struct TimerEvent {
    pub when: Instant,
    pub action: ClockAction,
}

impl PartialEq for TimerEvent {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when
    }
}

impl Eq for TimerEvent {}

impl PartialOrd for TimerEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest first)
        other.when.cmp(&self.when)
    }
}

/// Actions that can be scheduled for later execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockAction {
    /// No message arrived within the inactivity window; become a candidate.
    Inactivity,
}

/// Trait for different clock implementations.
pub trait ClockProvider {
    /// Get the current time.
    fn now(&self) -> Instant;

    /// Schedule an action to occur after the given duration.
    fn schedule(&mut self, action: ClockAction, delay: Duration);

    /// Cancel all pending actions of the same kind.
    fn cancel(&mut self, action: &ClockAction);

    /// Time left until the earliest pending action, if any.
    fn next_timeout(&self) -> Option<Duration>;

    /// Pop and return every action whose deadline has passed.
    fn check_timers(&mut self) -> Vec<ClockAction>;
}

/// Deadline heap shared by the clock implementations.
#[derive(Debug, Default)]
struct TimerQueue {
    timers: BinaryHeap<TimerEvent>,
}

impl TimerQueue {
    fn push(&mut self, action: ClockAction, when: Instant) {
        self.timers.push(TimerEvent { when, action });
    }

    fn cancel(&mut self, action: &ClockAction) {
        self.timers
            .retain(|timer| mem::discriminant(&timer.action) != mem::discriminant(action));
    }

    fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.timers
            .peek()
            .map(|timer| timer.when.saturating_duration_since(now))
    }

    fn expired(&mut self, now: Instant) -> Vec<ClockAction> {
        let mut expired = Vec::new();
        while self.timers.peek().is_some_and(|timer| timer.when <= now) {
            if let Some(timer) = self.timers.pop() {
                expired.push(timer.action);
            }
        }
        expired
    }

    fn pending(&self) -> Vec<&TimerEvent> {
        self.timers.iter().collect()
    }
}

/// A real-time clock provider for production use.
///
/// Reads tokio's clock, so a runtime with paused time also pauses
/// these deadlines.
#[derive(Debug, Default)]
pub struct SystemClock {
    timers: TimerQueue,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClockProvider for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn schedule(&mut self, action: ClockAction, delay: Duration) {
        let when = self.now() + delay;
        self.timers.push(action, when);
    }

    fn cancel(&mut self, action: &ClockAction) {
        self.timers.cancel(action);
    }

    fn next_timeout(&self) -> Option<Duration> {
        self.timers.next_timeout(self.now())
    }

    fn check_timers(&mut self) -> Vec<ClockAction> {
        let now = self.now();
        self.timers.expired(now)
    }
}

/// A controllable clock for testing.
#[derive(Debug)]
pub struct MockClock {
    current_time: Instant,
    timers: TimerQueue,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    pub fn new() -> Self {
        MockClock {
            current_time: Instant::now(),
            timers: TimerQueue::default(),
        }
    }

    /// Advance the mock clock by the given duration.
    pub fn advance(&mut self, duration: Duration) {
        self.current_time += duration;
    }

    /// Get all pending timers (for testing).
    pub fn pending_timers(&self) -> Vec<&TimerEvent> {
        self.timers.pending()
    }
}

impl ClockProvider for MockClock {
    fn now(&self) -> Instant {
        self.current_time
    }

    fn schedule(&mut self, action: ClockAction, delay: Duration) {
        let when = self.current_time + delay;
        self.timers.push(action, when);
    }

    fn cancel(&mut self, action: &ClockAction) {
        self.timers.cancel(action);
    }

    fn next_timeout(&self) -> Option<Duration> {
        self.timers.next_timeout(self.current_time)
    }

    fn check_timers(&mut self) -> Vec<ClockAction> {
        self.timers.expired(self.current_time)
    }
}
