//! Latest-value-wins publish throttling.

use std::time::Duration;

use tokio::time::Instant;

/// Collapses a burst of values into at most one publish per window.
///
/// The first value offered while idle opens a window; every value offered before
/// the window closes replaces the pending one, and only the last is released once
/// the window elapses.
#[derive(Debug)]
pub struct Throttle<T> {
    window: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Throttle<T> {
    /// Creates a throttle with the given window.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            deadline: None,
        }
    }

    /// Stores `value` as the pending publish, opening a window if none is open.
    pub fn offer(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
    }

    /// When the pending value becomes due, if there is one.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Releases the pending value if its window has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Drops whatever is pending; used when a status change supersedes it.
    pub fn clear(&mut self) {
        self.pending = None;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_within_window_releases_only_the_last_value() {
        let t0 = Instant::now();
        let window = Duration::from_millis(100);
        let mut throttle = Throttle::new(window);

        for (i, value) in (1..=5).enumerate() {
            throttle.offer(value, t0 + Duration::from_millis(i as u64 * 10));
            assert_eq!(throttle.take_due(t0 + Duration::from_millis(i as u64 * 10)), None);
        }

        assert_eq!(throttle.deadline(), Some(t0 + window));
        assert_eq!(throttle.take_due(t0 + window), Some(5));
        assert_eq!(throttle.take_due(t0 + window * 2), None);
        assert_eq!(throttle.deadline(), None);
    }

    #[test]
    fn next_value_after_release_opens_a_new_window() {
        let t0 = Instant::now();
        let window = Duration::from_millis(100);
        let mut throttle = Throttle::new(window);

        throttle.offer("a", t0);
        assert_eq!(throttle.take_due(t0 + window), Some("a"));

        let t1 = t0 + Duration::from_millis(150);
        throttle.offer("b", t1);
        assert_eq!(throttle.deadline(), Some(t1 + window));
        assert_eq!(throttle.take_due(t1 + Duration::from_millis(50)), None);
        assert_eq!(throttle.take_due(t1 + window), Some("b"));
    }

    #[test]
    fn clear_discards_pending_value() {
        let t0 = Instant::now();
        let mut throttle = Throttle::new(Duration::from_millis(10));
        throttle.offer(1, t0);
        throttle.clear();
        assert_eq!(throttle.deadline(), None);
        assert_eq!(throttle.take_due(t0 + Duration::from_secs(1)), None);
    }
}
