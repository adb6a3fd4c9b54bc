//! Quorum membership and the majority rule.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Result, SynodError};

/// Set of peer ids that defines membership for one decree.
///
/// For a quorum of size N, a strict majority is floor(N/2) + 1.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[serde(bound(deserialize = "C: Ord + Deserialize<'de>"))]
pub struct Quorum<C> {
    members: BTreeSet<C>,
}

impl<C: Ord> Quorum<C> {
    pub fn new() -> Self {
        Self {
            members: BTreeSet::new(),
        }
    }

    /// Add a member. Returns false if it was already present.
    pub fn insert(&mut self, id: C) -> bool {
        self.members.insert(id)
    }

    pub fn contains(&self, id: &C) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &C> {
        self.members.iter()
    }

    /// Number of answers needed for a strict majority.
    pub fn majority(&self) -> usize {
        self.len() / 2 + 1
    }

    /// Fail with [`SynodError::TooFewPeers`] unless `reached` is a strict
    /// majority of this quorum.
    pub fn check_headcount(&self, reached: usize) -> Result<()> {
        let total = self.len();
        tracing::debug!(reached, total, "headcount");
        if reached <= total / 2 {
            tracing::warn!(
                "too few peers to reach consensus: {} of {}",
                reached,
                total
            );
            return Err(SynodError::TooFewPeers { reached, total });
        }
        Ok(())
    }
}

impl<C: Ord> Default for Quorum<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Ord> FromIterator<C> for Quorum<C> {
    fn from_iter<I: IntoIterator<Item = C>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

impl<C: fmt::Display> fmt::Display for Quorum<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, id) in self.members.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id}")?;
        }
        f.write_str("}")
    }
}
