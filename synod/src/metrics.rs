//! Metrics for the Synod client.
//!
//! Recorded through the `metrics` crate facade; nothing is exported unless
//! the application installs a recorder.
//!
//! # Metrics
//!
//! ## Counters
//! - `synod_operations_total` - Client operations by kind and outcome
//! - `synod_rounds_total` - Proposals issued by `choose`
//! - `synod_conflicts_total` - Accept phases lost to a higher proposal
//! - `synod_peer_unavailable_total` - Abstentions by phase
//!
//! ## Histograms
//! - `synod_phase_latency_seconds` - Fan-out latency by phase

use metrics::{counter, histogram};
use std::time::Instant;

use crate::peer::Phase;

/// Metric names as constants for consistency.
pub mod names {
    /// Client operations counter.
    pub const OPERATIONS_TOTAL: &str = "synod_operations_total";
    /// Proposals issued.
    pub const ROUNDS_TOTAL: &str = "synod_rounds_total";
    /// Conflicts detected during accept.
    pub const CONFLICTS_TOTAL: &str = "synod_conflicts_total";
    /// Unavailable peer replies.
    pub const PEER_UNAVAILABLE_TOTAL: &str = "synod_peer_unavailable_total";
    /// Phase latency histogram.
    pub const PHASE_LATENCY: &str = "synod_phase_latency_seconds";
}

/// Operation labels.
pub mod operation {
    pub const CHOOSE: &str = "choose";
    pub const GET: &str = "get";
}

/// Outcome labels.
pub mod outcome {
    pub const OK: &str = "ok";
    pub const TOO_FEW_PEERS: &str = "too_few_peers";
    pub const TOO_MANY_CONFLICTS: &str = "too_many_conflicts";
    pub const PEER_ERROR: &str = "peer_error";
    pub const CONFIG: &str = "config";
}

/// Record a finished client operation.
pub fn record_operation(op: &'static str, outcome: &'static str) {
    counter!(names::OPERATIONS_TOTAL, "op" => op, "outcome" => outcome).increment(1);
}

/// Record a new proposal.
pub fn record_round() {
    counter!(names::ROUNDS_TOTAL).increment(1);
}

/// Record a lost accept race.
pub fn record_conflict() {
    counter!(names::CONFLICTS_TOTAL).increment(1);
}

/// Record a peer that abstained.
pub fn record_unavailable(phase: Phase) {
    counter!(names::PEER_UNAVAILABLE_TOTAL, "phase" => phase.as_str()).increment(1);
}

/// Record how long a phase took.
pub fn record_phase_latency(phase: Phase, duration_secs: f64) {
    histogram!(names::PHASE_LATENCY, "phase" => phase.as_str()).record(duration_secs);
}

/// Timer that records phase latency when dropped.
pub struct Timer {
    start: Instant,
    phase: Phase,
}

impl Timer {
    /// Start timing a phase.
    pub fn phase(phase: Phase) -> Self {
        Self {
            start: Instant::now(),
            phase,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        record_phase_latency(self.phase, self.start.elapsed().as_secs_f64());
    }
}
