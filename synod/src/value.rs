//! Values agreed upon by the protocol.

use serde::{Deserialize, Serialize};

use crate::quorum::Quorum;

/// What a decree carries: either an application payload or a new quorum
/// membership.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize, C: Serialize",
    deserialize = "T: Deserialize<'de>, C: Ord + Deserialize<'de>"
))]
pub enum Value<T, C> {
    /// Application data
    Payload(T),
    /// Membership change
    Quorum(Quorum<C>),
}

impl<T, C> Value<T, C> {
    pub fn payload(&self) -> Option<&T> {
        match self {
            Self::Payload(payload) => Some(payload),
            Self::Quorum(_) => None,
        }
    }

    pub fn into_payload(self) -> Option<T> {
        match self {
            Self::Payload(payload) => Some(payload),
            Self::Quorum(_) => None,
        }
    }

    pub fn as_quorum(&self) -> Option<&Quorum<C>> {
        match self {
            Self::Quorum(quorum) => Some(quorum),
            Self::Payload(_) => None,
        }
    }

    pub fn is_quorum(&self) -> bool {
        matches!(self, Self::Quorum(_))
    }
}

impl<T, C> From<Quorum<C>> for Value<T, C> {
    fn from(quorum: Quorum<C>) -> Self {
        Self::Quorum(quorum)
    }
}
