//! Per-stream progress bookkeeping and the session-wide aggregate.

use std::time::Instant;

/// Last observed state of one stream transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFetchState {
    /// Bytes received so far, as of the last sample.
    pub last_progress: u64,
    /// Estimated total size, as of the last sample.
    pub last_size: u64,
    /// When the last sample was recorded (the stream's start before any sample).
    pub last_sample: Instant,
    pub is_done: bool,
    pub is_errored: bool,
}

impl StreamFetchState {
    /// Creates the state of a stream that has not produced any bytes yet.
    #[must_use]
    pub const fn new(started: Instant) -> Self {
        Self {
            last_progress: 0,
            last_size: 0,
            last_sample: started,
            is_done: false,
            is_errored: false,
        }
    }

    /// Returns true once the stream has ended or failed.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.is_done || self.is_errored
    }
}

/// Composite progress of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub progress: u64,
    pub size: u64,
    /// Bytes per second.
    pub speed: u64,
}

/// Running totals across all streams of a session.
///
/// Each stream's contribution is replaced on every sample rather than accumulated,
/// so a stream whose size estimate shrinks never underflows the total.
#[derive(Debug, Clone, Default)]
pub struct ProgressAggregator {
    progress: u64,
    size: u64,
    speed: u64,
}

impl ProgressAggregator {
    /// Creates an aggregator with nothing recorded.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            progress: 0,
            size: 0,
            speed: 0,
        }
    }

    /// Records a sample for `stream` and returns the updated aggregate.
    ///
    /// `received` is the stream's byte count so far and `estimated_size` its current
    /// size estimate. The estimate is raised to `received` when the server under-reported it.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn record(
        &mut self,
        stream: &mut StreamFetchState,
        received: u64,
        estimated_size: u64,
        now: Instant,
    ) -> ProgressSnapshot {
        let size = estimated_size.max(received);

        // A stream's own contribution is always part of the total, so these never underflow.
        self.progress = self.progress - stream.last_progress + received;
        self.size = self.size - stream.last_size + size;

        let delta = received.saturating_sub(stream.last_progress);
        let elapsed = now.saturating_duration_since(stream.last_sample);
        if !elapsed.is_zero() {
            self.speed = (delta as f64 / elapsed.as_secs_f64()) as u64;
        }

        stream.last_progress = received;
        stream.last_size = size;
        stream.last_sample = now;

        self.snapshot()
    }

    /// Marks the download phase as complete: size collapses to the bytes actually received.
    pub const fn freeze(&mut self) -> ProgressSnapshot {
        self.size = self.progress;
        self.speed = 0;
        self.snapshot()
    }

    /// Returns the current aggregate.
    #[must_use]
    pub const fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            progress: self.progress,
            size: self.size,
            speed: self.speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn totals_sum_across_streams() {
        let t0 = Instant::now();
        let mut video = StreamFetchState::new(t0);
        let mut audio = StreamFetchState::new(t0);
        let mut agg = ProgressAggregator::new();

        agg.record(&mut video, 100, 1000, t0 + Duration::from_secs(1));
        let snap = agg.record(&mut audio, 50, 2000, t0 + Duration::from_secs(1));
        assert_eq!(snap.progress, 150);
        assert_eq!(snap.size, 3000);

        let snap = agg.record(&mut video, 400, 1000, t0 + Duration::from_secs(2));
        assert_eq!(snap.progress, 450);
        assert_eq!(snap.size, 3000);
        assert_eq!(video.last_progress, 400);
    }

    #[test]
    fn shrinking_size_estimate_replaces_previous_contribution() {
        let t0 = Instant::now();
        let mut s = StreamFetchState::new(t0);
        let mut agg = ProgressAggregator::new();

        agg.record(&mut s, 10, 5000, t0 + Duration::from_millis(10));
        let snap = agg.record(&mut s, 20, 800, t0 + Duration::from_millis(20));
        assert_eq!(snap.size, 800);
        assert_eq!(snap.progress, 20);
    }

    #[test]
    fn size_is_raised_to_received_bytes() {
        let t0 = Instant::now();
        let mut s = StreamFetchState::new(t0);
        let mut agg = ProgressAggregator::new();

        let snap = agg.record(&mut s, 700, 500, t0 + Duration::from_millis(10));
        assert_eq!(snap.size, 700);
        assert_eq!(s.last_size, 700);
    }

    #[test]
    fn speed_uses_elapsed_since_previous_sample() {
        let t0 = Instant::now();
        let mut s = StreamFetchState::new(t0);
        let mut agg = ProgressAggregator::new();

        agg.record(&mut s, 1000, 10_000, t0 + Duration::from_secs(1));
        let snap = agg.record(&mut s, 3000, 10_000, t0 + Duration::from_millis(1500));
        assert_eq!(snap.speed, 4000);
    }

    #[test]
    fn zero_interval_keeps_previous_speed() {
        let t0 = Instant::now();
        let mut s = StreamFetchState::new(t0);
        let mut agg = ProgressAggregator::new();

        let t1 = t0 + Duration::from_secs(1);
        agg.record(&mut s, 500, 10_000, t1);
        let snap = agg.record(&mut s, 900, 10_000, t1);
        assert_eq!(snap.speed, 500);
        assert_eq!(snap.progress, 900);
    }

    #[test]
    fn freeze_equalises_size_and_progress() {
        let t0 = Instant::now();
        let mut a = StreamFetchState::new(t0);
        let mut b = StreamFetchState::new(t0);
        let mut agg = ProgressAggregator::new();

        agg.record(&mut a, 1000, 1000, t0 + Duration::from_secs(1));
        agg.record(&mut b, 2000, 2500, t0 + Duration::from_secs(1));
        let snap = agg.freeze();
        assert_eq!(snap.progress, 3000);
        assert_eq!(snap.size, 3000);
        assert_eq!(snap.speed, 0);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn progress_never_exceeds_size(
                samples in prop::collection::vec((0usize..3, 0u64..10_000, 0u64..20_000), 1..64)
            ) {
                let t0 = Instant::now();
                let mut streams = [StreamFetchState::new(t0); 3];
                let mut agg = ProgressAggregator::new();

                for (i, (idx, step, size)) in samples.into_iter().enumerate() {
                    let stream = &mut streams[idx];
                    let received = stream.last_progress + step;
                    let now = t0 + Duration::from_millis(i as u64);
                    let snap = agg.record(stream, received, size, now);
                    prop_assert!(snap.progress <= snap.size);
                }
            }
        }
    }
}
