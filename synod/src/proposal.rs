//! Proposal tickets and accepted values.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::Value;

/// Round counter within a version.
pub type Round = u64;

/// Totally ordered ticket sequencing competing agreement attempts.
///
/// Proposals compare lexicographically by `(version, round, proposer)`: a
/// newer version always wins, then the higher round, and the proposer id
/// breaks ties between clients that picked the same round. Field order
/// matters here since `Ord` is derived.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Proposal<V, C> {
    /// Epoch of the decree
    pub version: V,
    /// Attempt number within the version
    pub round: Round,
    /// Client that issued the proposal
    pub proposer: C,
}

impl<V, C> Proposal<V, C> {
    pub fn new(version: V, round: Round, proposer: C) -> Self {
        Self {
            version,
            round,
            proposer,
        }
    }
}

impl<V: fmt::Display, C: fmt::Display> fmt::Display for Proposal<V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}:r{}@{}", self.version, self.round, self.proposer)
    }
}

/// A value a peer reports as accepted, with the proposal it was accepted under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize, V: Serialize, C: Serialize",
    deserialize = "T: Deserialize<'de>, V: Deserialize<'de>, C: Ord + Deserialize<'de>"
))]
pub struct Accepted<T, V, C> {
    pub proposal: Proposal<V, C>,
    pub value: Value<T, C>,
}

impl<T, V: Ord, C: Ord> Accepted<T, V, C> {
    pub fn new(proposal: Proposal<V, C>, value: Value<T, C>) -> Self {
        Self { proposal, value }
    }

    /// Whether this reply is strictly more authoritative than `other`.
    pub fn supersedes(&self, other: &Self) -> bool {
        self.proposal > other.proposal
    }

    /// Keep the strictly greatest of `current` and `candidate`.
    ///
    /// Ties keep `current`, so the outcome never depends on reply arrival
    /// order for distinct proposals.
    pub fn keep_greatest(current: &mut Option<Self>, candidate: Self) -> bool {
        match current {
            Some(existing) if !candidate.supersedes(existing) => false,
            _ => {
                *current = Some(candidate);
                true
            }
        }
    }
}
