//! Peer abstraction for talking to acceptors.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::proposal::{Accepted, Proposal};
use crate::quorum::Quorum;
use crate::value::Value;

/// Failure of a single peer call.
///
/// `Unavailable` is the only failure the protocol tolerates: the peer
/// abstains and the phase goes on as long as a majority still answers.
#[derive(Error, Debug)]
pub enum PeerError {
    /// The peer could not be reached
    #[error("peer unavailable: {0}")]
    Unavailable(String),

    /// Anything else, propagated to the caller untouched
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PeerError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Protocol step a peer call belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Propose,
    Accept,
    Confirm,
    Get,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propose => "propose",
            Self::Accept => "accept",
            Self::Confirm => "confirm",
            Self::Get => "get",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote acceptor as seen by the client.
///
/// Every call carries the caller's full quorum so the peer can validate the
/// membership view. Implementations must be usable concurrently; deadlines
/// belong here too, the client never times a call out.
///
/// This trait allows different implementations:
/// - networked peers for production use
/// - [`MemoryPeer`](crate::memory::MemoryPeer) for tests
#[async_trait]
pub trait Peer<T, V, C>: Send + Sync {
    /// Stable identity of this peer within the quorum.
    fn id(&self) -> C;

    /// Prepare/promise. Returns whatever the peer already accepted under a
    /// proposal not greater than `proposal`.
    async fn propose(
        &self,
        quorum: &Quorum<C>,
        proposal: &Proposal<V, C>,
    ) -> Result<Option<Accepted<T, V, C>>, PeerError>;

    /// Ask the peer to accept `value` under `proposal`.
    ///
    /// Returns the lowest proposal the peer will still honour. A result
    /// greater than `proposal` means another proposer got ahead.
    async fn accept(
        &self,
        quorum: &Quorum<C>,
        proposal: &Proposal<V, C>,
        value: &Value<T, C>,
    ) -> Result<Proposal<V, C>, PeerError>;

    /// Mark the value accepted under `proposal` as chosen. Idempotent.
    async fn confirm(&self, quorum: &Quorum<C>, proposal: &Proposal<V, C>) -> Result<(), PeerError>;

    /// Read whatever the peer currently has accepted.
    async fn get(&self, quorum: &Quorum<C>) -> Result<Option<Accepted<T, V, C>>, PeerError>;
}
