//! Session completion state machine.
//!
//! ```text
//! progress ──all streams ended──▶ convert ──backend ok──▶ finish
//!    │                              └──backend failed──▶ errored
//!    ├──any stream failed──▶ errored
//!    └──cancel──▶ cancelled
//! ```
//!
//! The coordinator only decides; the session performs the side effects each
//! [`Transition`] calls for. Once a terminal status is reached every further
//! input is ignored.

use std::time::Instant;

use crate::error::FetchError;
use crate::events::SessionStatus;
use crate::progress::{ProgressAggregator, ProgressSnapshot, StreamFetchState};

/// What the session has to do in response to an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to publish.
    Ignore,
    /// Publish the aggregate through the throttle.
    Progress(ProgressSnapshot),
    /// Every stream ended: publish the frozen aggregate and post-process.
    Convert(ProgressSnapshot),
    /// A stream failed: tear down every sibling and clean up.
    Abort { stream: usize, cause: String },
    /// The session was cancelled: tear down every stream and clean up.
    Cancel,
}

/// Tracks per-stream completion for one session.
#[derive(Debug)]
pub struct CompletionCoordinator {
    status: SessionStatus,
    streams: Vec<StreamFetchState>,
    done: usize,
    aggregator: ProgressAggregator,
}

impl CompletionCoordinator {
    /// Creates a coordinator for `stream_count` streams started at `started`.
    #[must_use]
    pub fn new(stream_count: usize, started: Instant) -> Self {
        Self {
            status: SessionStatus::Progress,
            streams: vec![StreamFetchState::new(started); stream_count],
            done: 0,
            aggregator: ProgressAggregator::new(),
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Per-stream state, in stream order.
    #[must_use]
    pub fn streams(&self) -> &[StreamFetchState] {
        &self.streams
    }

    /// Current aggregate.
    #[must_use]
    pub const fn snapshot(&self) -> ProgressSnapshot {
        self.aggregator.snapshot()
    }

    /// Returns the state of `stream` if it can still accept input.
    fn live_stream(&mut self, stream: usize) -> Option<&mut StreamFetchState> {
        if self.status != SessionStatus::Progress {
            return None;
        }
        self.streams.get_mut(stream).filter(|s| !s.is_settled())
    }

    /// A stream received more bytes.
    pub fn on_progress(
        &mut self,
        stream: usize,
        received: u64,
        estimated_size: u64,
        now: Instant,
    ) -> Transition {
        if self.status != SessionStatus::Progress {
            return Transition::Ignore;
        }
        let Some(state) = self.streams.get_mut(stream).filter(|s| !s.is_settled()) else {
            return Transition::Ignore;
        };
        Transition::Progress(self.aggregator.record(state, received, estimated_size, now))
    }

    /// A stream finished successfully.
    pub fn on_end(&mut self, stream: usize) -> Transition {
        let Some(state) = self.live_stream(stream) else {
            return Transition::Ignore;
        };
        state.is_done = true;
        self.done += 1;

        if self.done == self.streams.len() {
            self.status = SessionStatus::Convert;
            Transition::Convert(self.aggregator.freeze())
        } else {
            Transition::Ignore
        }
    }

    /// A stream stopped early.
    pub fn on_error(&mut self, stream: usize, cause: &FetchError) -> Transition {
        let Some(state) = self.live_stream(stream) else {
            return Transition::Ignore;
        };
        state.is_errored = true;

        if cause.is_cancelled() {
            return Transition::Ignore;
        }
        self.status = SessionStatus::Errored;
        Transition::Abort {
            stream,
            cause: cause.to_string(),
        }
    }

    /// The session was asked to stop. Only honoured while downloading.
    pub fn on_cancel(&mut self) -> Transition {
        if self.status != SessionStatus::Progress {
            return Transition::Ignore;
        }
        self.status = SessionStatus::Cancelled;
        Transition::Cancel
    }

    /// The conversion/merge backend returned. Returns the resulting status, or
    /// `None` if the session was not converting.
    pub fn on_post_processed(&mut self, success: bool) -> Option<SessionStatus> {
        if self.status != SessionStatus::Convert {
            return None;
        }
        self.status = if success {
            SessionStatus::Finish
        } else {
            SessionStatus::Errored
        };
        Some(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn transport(msg: &str) -> FetchError {
        FetchError::Transport(msg.to_string())
    }

    #[test]
    fn single_stream_success_path() {
        let t0 = Instant::now();
        let mut c = CompletionCoordinator::new(1, t0);

        assert!(matches!(
            c.on_progress(0, 10, 100, t0 + Duration::from_millis(5)),
            Transition::Progress(_)
        ));
        assert_eq!(
            c.on_end(0),
            Transition::Convert(ProgressSnapshot {
                progress: 10,
                size: 10,
                speed: 0
            })
        );
        assert_eq!(c.status(), SessionStatus::Convert);
        assert_eq!(c.on_post_processed(true), Some(SessionStatus::Finish));
        assert_eq!(c.status(), SessionStatus::Finish);
    }

    #[test]
    fn convert_waits_for_every_stream() {
        let t0 = Instant::now();
        let mut c = CompletionCoordinator::new(2, t0);
        let t1 = t0 + Duration::from_millis(5);

        c.on_progress(0, 1000, 1000, t1);
        c.on_progress(1, 2000, 2000, t1);
        assert_eq!(c.on_end(1), Transition::Ignore);
        assert_eq!(c.status(), SessionStatus::Progress);
        // A duplicate end for the same stream must not count twice.
        assert_eq!(c.on_end(1), Transition::Ignore);

        match c.on_end(0) {
            Transition::Convert(snap) => {
                assert_eq!(snap.size, 3000);
                assert_eq!(snap.progress, 3000);
            }
            other => panic!("expected convert, got {other:?}"),
        }
    }

    #[test]
    fn stream_failure_aborts_session_once() {
        let t0 = Instant::now();
        let mut c = CompletionCoordinator::new(3, t0);

        assert_eq!(c.on_end(0), Transition::Ignore);
        assert_eq!(
            c.on_error(2, &transport("reset")),
            Transition::Abort {
                stream: 2,
                cause: "transport error: reset".to_string()
            }
        );
        assert_eq!(c.status(), SessionStatus::Errored);

        assert_eq!(c.on_error(1, &transport("again")), Transition::Ignore);
        assert_eq!(c.on_error(1, &FetchError::Cancelled), Transition::Ignore);
        assert_eq!(c.on_end(1), Transition::Ignore);
        assert_eq!(c.on_progress(1, 5, 5, t0), Transition::Ignore);
        assert_eq!(c.on_cancel(), Transition::Ignore);
        assert_eq!(c.status(), SessionStatus::Errored);
    }

    #[test]
    fn cancellation_sentinel_is_not_a_failure() {
        let mut c = CompletionCoordinator::new(2, Instant::now());
        assert_eq!(c.on_error(0, &FetchError::Cancelled), Transition::Ignore);
        assert_eq!(c.status(), SessionStatus::Progress);
        assert!(c.streams()[0].is_errored);
    }

    #[test]
    fn cancel_only_while_downloading() {
        let mut c = CompletionCoordinator::new(1, Instant::now());
        assert_eq!(c.on_cancel(), Transition::Cancel);
        assert_eq!(c.status(), SessionStatus::Cancelled);
        assert_eq!(c.on_cancel(), Transition::Ignore);
        assert_eq!(c.on_end(0), Transition::Ignore);

        let mut converting = CompletionCoordinator::new(1, Instant::now());
        converting.on_end(0);
        assert_eq!(converting.on_cancel(), Transition::Ignore);
        assert_eq!(converting.status(), SessionStatus::Convert);
    }

    #[test]
    fn failed_post_processing_errors_the_session() {
        let mut c = CompletionCoordinator::new(1, Instant::now());
        assert_eq!(c.on_post_processed(true), None);
        c.on_end(0);
        assert_eq!(c.on_post_processed(false), Some(SessionStatus::Errored));
        assert_eq!(c.on_post_processed(true), None);
    }

    #[test]
    fn unknown_stream_index_is_ignored() {
        let mut c = CompletionCoordinator::new(1, Instant::now());
        assert_eq!(c.on_end(7), Transition::Ignore);
        assert_eq!(c.on_error(7, &transport("x")), Transition::Ignore);
        assert_eq!(c.status(), SessionStatus::Progress);
    }
}
