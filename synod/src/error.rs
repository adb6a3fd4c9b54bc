//! Error types for Synod consensus.

use thiserror::Error;

use crate::peer::PeerError;

/// Errors that can end a [`Client`](crate::Client) operation.
#[derive(Error, Debug)]
pub enum SynodError {
    /// Fewer than a strict majority of the quorum answered a phase
    #[error("too few peers are available to reach consensus: {reached} of {total}")]
    TooFewPeers { reached: usize, total: usize },

    /// Retry budget exhausted by competing proposers
    #[error("gave up after {attempts} conflicting attempts")]
    TooManyConflicts { attempts: u32 },

    /// A peer failed in a way the peer contract does not cover
    #[error("peer {peer} failed: {source}")]
    Peer {
        peer: String,
        #[source]
        source: PeerError,
    },

    /// Invalid client construction or configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl SynodError {
    /// Check if retrying the whole operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TooFewPeers { .. } | Self::TooManyConflicts { .. }
        )
    }
}

/// Result type for Synod operations
pub type Result<T> = std::result::Result<T, SynodError>;
