//! Client-side single-decree Paxos (Synod) consensus.
//!
//! A [`Client`] drives agreement on exactly one value across a quorum of
//! replicated peers, or discovers the value that was already chosen. Peers
//! are reached through the [`Peer`] trait; transports, encoding and the
//! acceptor side live outside this crate.
//!
//! # Protocol
//!
//! ```text
//!   choose(value)
//!        │
//!        ▼
//!   round += 1 ──► PROPOSE ──► ACCEPT ──► CONFIRM ──► done
//!        ▲                        │
//!        └──────── conflict ──────┘
//! ```
//!
//! 1. **Propose**: promise request; peers report any value they already accepted.
//! 2. **Accept**: submit the discovered value (or ours) under the proposal.
//!    A peer answering with a higher minimum proposal means we lost a race
//!    and the round restarts.
//! 3. **Confirm**: mark the accepted value as chosen.
//!
//! Every phase needs a strict majority of the quorum to answer. Peers that
//! report [`PeerError::Unavailable`] abstain instead of failing the call.
//!
//! # Quick Start
//!
//! ```ignore
//! use synod::{Client, Value};
//!
//! let mut client = Client::new(1, peers)?;
//!
//! // None: our value was chosen. Some(accepted): somebody else's was.
//! let previous = client.choose(Value::Payload("X")).await?;
//!
//! let current = client.get().await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod fanout;
#[cfg(feature = "memory")]
pub mod memory;
pub mod metrics;
pub mod peer;
pub mod proposal;
pub mod quorum;
pub mod tracing_ext;
pub mod value;

pub use client::Client;
pub use config::{ClientConfig, RetryConfig};
pub use error::{Result, SynodError};
pub use fanout::{fan_out, Response, Tally};
#[cfg(feature = "memory")]
pub use memory::{Hold, MemoryAcceptor, MemoryPeer};
pub use peer::{Peer, PeerError, Phase};
pub use proposal::{Accepted, Proposal, Round};
pub use quorum::Quorum;
pub use value::Value;
