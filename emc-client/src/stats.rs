//! # Dispatch Stats
//!
//! Provide lightweight counters describing how requests were retired, so a
//! host application can check the exactly-once accounting at a glance.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Plain counters bumped on the dispatch path.
//! 2. **Single Owner**: The dispatcher runs on one control thread, so no atomics
//!    are needed; the snapshot is a `Copy` struct.
//!
//! ## Notes
//! - `issued` counts successful issues. Every one of them is later counted in
//!   exactly one of `responses`, `connection_lost`, `shutdown`, `timed_out`,
//!   or `cancelled`, or is still `in_flight`.

use crate::completion::Status;

/// Snapshot of dispatcher counters at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    /// Requests handed to the transport.
    pub issued: u64,
    /// `issue` calls that returned an error.
    pub issue_failures: u64,
    /// Requests retired by a matching response.
    pub responses: u64,
    /// Responses dropped because the completion was `Discard`.
    pub discarded: u64,
    /// Requests faulted by connection loss.
    pub connection_lost: u64,
    /// Requests faulted by teardown.
    pub shutdown: u64,
    /// Requests faulted by the timeout sweep.
    pub timed_out: u64,
    /// Requests faulted by `prune_pending`.
    pub cancelled: u64,
    /// Connections opened.
    pub connects: u64,
    /// Requests currently pending.
    pub in_flight: u64,
}

impl DispatchStats {
    /// Requests retired so far, by any path.
    pub fn retired(&self) -> u64 {
        self.responses + self.connection_lost + self.shutdown + self.timed_out + self.cancelled
    }
}

/// Counter accumulator owned by the dispatcher.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    counters: DispatchStats,
}

impl StatsRecorder {
    pub(crate) fn record_issued(&mut self) {
        self.counters.issued += 1;
    }

    pub(crate) fn record_issue_failure(&mut self) {
        self.counters.issue_failures += 1;
    }

    pub(crate) fn record_response(&mut self, discarded: bool) {
        self.counters.responses += 1;
        if discarded {
            self.counters.discarded += 1;
        }
    }

    pub(crate) fn record_connect(&mut self) {
        self.counters.connects += 1;
    }

    pub(crate) fn record_faults(&mut self, status: Status, count: usize) {
        let count = count as u64;
        match status {
            Status::ConnectionLost => self.counters.connection_lost += count,
            Status::Shutdown => self.counters.shutdown += count,
            Status::TimedOut => self.counters.timed_out += count,
            Status::Cancelled => self.counters.cancelled += count,
            Status::Server(_) => {}
        }
    }

    /// Returns the counters with the current in-flight gauge.
    pub(crate) fn snapshot(&self, in_flight: usize) -> DispatchStats {
        DispatchStats {
            in_flight: in_flight as u64,
            ..self.counters
        }
    }
}
