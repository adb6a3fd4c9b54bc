//! Tracing span helpers for the Synod client.
//!
//! # Spans
//!
//! - `synod.client.choose` - One write operation, across all retries
//! - `synod.client.get` - One read operation
//! - `synod.phase.propose|accept|confirm|get` - One fan-out, with its proposal
//! - `synod.peer` - One call to one peer

use std::fmt;
use tracing::{debug_span, info_span, trace_span, Span};

use crate::peer::Phase;

/// Span names used by the client.
pub mod span_names {
    /// Write operation.
    pub const CHOOSE: &str = "synod.client.choose";
    /// Read operation.
    pub const GET: &str = "synod.client.get";
    /// Propose fan-out.
    pub const PROPOSE: &str = "synod.phase.propose";
    /// Accept fan-out.
    pub const ACCEPT: &str = "synod.phase.accept";
    /// Confirm fan-out.
    pub const CONFIRM: &str = "synod.phase.confirm";
    /// Read fan-out.
    pub const READ: &str = "synod.phase.get";
    /// Single peer call.
    pub const PEER: &str = "synod.peer";
}

/// Attribute keys for spans.
pub mod attributes {
    /// Local client id.
    pub const CLIENT_ID: &str = "synod.client_id";
    /// Peer id.
    pub const PEER_ID: &str = "synod.peer_id";
    /// Protocol phase.
    pub const PHASE: &str = "synod.phase";
    /// Proposal sent in the phase.
    pub const PROPOSAL: &str = "synod.proposal";
    /// Quorum a read was sent to.
    pub const QUORUM: &str = "synod.quorum";
    /// Number of proposals issued by a write.
    pub const ROUNDS: &str = "synod.rounds";
}

/// Create a span for a write operation.
pub fn choose_span(client_id: &dyn fmt::Display) -> Span {
    info_span!(
        target: "synod",
        "synod.client.choose",
        synod.client_id = %client_id,
        synod.rounds = tracing::field::Empty,
        otel.name = span_names::CHOOSE,
    )
}

/// Create a span for a read operation.
pub fn get_span(client_id: &dyn fmt::Display) -> Span {
    info_span!(
        target: "synod",
        "synod.client.get",
        synod.client_id = %client_id,
        otel.name = span_names::GET,
    )
}

/// Create a span for one fan-out.
///
/// `subject` is the proposal for write phases and the quorum for reads.
pub fn phase_span(phase: Phase, subject: &dyn fmt::Display) -> Span {
    match phase {
        Phase::Propose => debug_span!(
            target: "synod",
            "synod.phase.propose",
            synod.proposal = %subject,
            otel.name = span_names::PROPOSE,
        ),
        Phase::Accept => debug_span!(
            target: "synod",
            "synod.phase.accept",
            synod.proposal = %subject,
            otel.name = span_names::ACCEPT,
        ),
        Phase::Confirm => debug_span!(
            target: "synod",
            "synod.phase.confirm",
            synod.proposal = %subject,
            otel.name = span_names::CONFIRM,
        ),
        Phase::Get => debug_span!(
            target: "synod",
            "synod.phase.get",
            synod.quorum = %subject,
            otel.name = span_names::READ,
        ),
    }
}

/// Create a span for a single peer call.
pub fn peer_span(phase: Phase, peer: &dyn fmt::Display) -> Span {
    trace_span!(
        target: "synod",
        "synod.peer",
        synod.phase = %phase,
        synod.peer_id = %peer,
        otel.name = span_names::PEER,
    )
}

/// Record on the current span how many proposals a write needed.
pub fn record_rounds(rounds: u32) {
    Span::current().record(attributes::ROUNDS, rounds);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_spans_without_subscriber() {
        // Spans are no-ops without a subscriber
        let _span = choose_span(&1u16);
        let _span = get_span(&"client-a");
        let _span = phase_span(Phase::Propose, &"v0:r1@1");
        let _span = peer_span(Phase::Accept, &3u16);
        record_rounds(2);
    }

    #[test]
    fn test_span_names() {
        assert_eq!(span_names::CHOOSE, "synod.client.choose");
        assert_eq!(span_names::GET, "synod.client.get");
        assert_eq!(span_names::ACCEPT, "synod.phase.accept");
        assert_eq!(attributes::ROUNDS, "synod.rounds");
    }

    #[test]
    #[traced_test]
    fn test_phase_spans_are_named_per_phase() {
        let span = phase_span(Phase::Confirm, &"v0:r1@1");
        span.in_scope(|| tracing::debug!("inside confirm"));
        let span = peer_span(Phase::Accept, &3u16);
        span.in_scope(|| tracing::trace!("inside peer"));

        assert!(logs_contain("synod.phase.confirm"));
        assert!(logs_contain("synod.peer_id=3"));
    }
}
