//! Concurrent fan-out of one operation to every peer.
//!
//! Each peer call runs as its own future; replies are folded in arrival
//! order. The fold decides whether to keep going, and breaking out drops
//! every call still in flight.

use futures_util::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use tracing::Instrument;

use crate::error::{Result, SynodError};
use crate::metrics::{self, Timer};
use crate::peer::{PeerError, Phase};
use crate::tracing_ext;

/// Outcome of one peer call once failures have been classified.
#[derive(Debug, PartialEq, Eq)]
pub enum Response<R> {
    /// The peer answered
    Vote(R),
    /// The peer was unavailable and does not count either way
    Abstain,
}

impl<R> Response<R> {
    /// Sort a raw peer result into vote or abstention.
    ///
    /// Only [`PeerError::Unavailable`] is absorbed; other failures are
    /// handed back to the caller.
    pub fn classify(result: std::result::Result<R, PeerError>) -> std::result::Result<Self, PeerError> {
        match result {
            Ok(reply) => Ok(Self::Vote(reply)),
            Err(PeerError::Unavailable(_)) => Ok(Self::Abstain),
            Err(e) => Err(e),
        }
    }
}

/// Result of a completed fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    /// Replies the fold accepted
    pub reached: usize,
    /// The fold stopped early and pending calls were dropped
    pub interrupted: bool,
}

/// Run every `(peer, call)` pair concurrently and fold the replies.
///
/// `fold` sees each reply once. Returning `ControlFlow::Break` stops the
/// fan-out: the reply that triggered it is not counted in `reached`, and
/// calls that have not finished yet are cancelled and never counted.
/// Unavailable peers are logged and skipped; any other peer error aborts
/// the fan-out with [`SynodError::Peer`].
pub async fn fan_out<K, R, Fut, G>(
    phase: Phase,
    calls: impl IntoIterator<Item = (K, Fut)>,
    mut fold: G,
) -> Result<Tally>
where
    K: fmt::Display,
    Fut: Future<Output = std::result::Result<R, PeerError>>,
    G: FnMut(&K, R) -> ControlFlow<()>,
{
    let _timer = Timer::phase(phase);

    let mut pending: FuturesUnordered<_> = calls
        .into_iter()
        .map(|(peer, call)| {
            let span = tracing_ext::peer_span(phase, &peer);
            async move {
                let result = call.await;
                (peer, result)
            }
            .instrument(span)
        })
        .collect();

    let mut tally = Tally::default();

    while let Some((peer, result)) = pending.next().await {
        let reply = match result {
            Err(PeerError::Unavailable(reason)) => {
                tracing::debug!(%peer, %phase, "peer unavailable: {}", reason);
                metrics::record_unavailable(phase);
                Response::Abstain
            }
            other => Response::classify(other).map_err(|source| SynodError::Peer {
                peer: peer.to_string(),
                source,
            })?,
        };

        let Response::Vote(reply) = reply else {
            continue;
        };

        match fold(&peer, reply) {
            ControlFlow::Continue(()) => tally.reached += 1,
            ControlFlow::Break(()) => {
                tracing::trace!(%phase, in_flight = pending.len(), "cancelling pending calls");
                tally.interrupted = true;
                break;
            }
        }
    }

    Ok(tally)
}
