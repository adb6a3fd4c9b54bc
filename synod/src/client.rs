//! Client - the proposer side of single-decree Paxos.

use std::fmt;
use std::ops::ControlFlow;
use tracing::Instrument;

use crate::config::ClientConfig;
use crate::error::{Result, SynodError};
use crate::fanout::fan_out;
use crate::metrics::{self, operation, outcome};
use crate::peer::{Peer, Phase};
use crate::proposal::{Accepted, Proposal, Round};
use crate::quorum::Quorum;
use crate::tracing_ext;
use crate::value::Value;

/// Drives agreement on one value across a fixed set of peers.
///
/// The client keeps a round counter that survives between calls, so a
/// long-lived client keeps issuing fresh proposals. Writes take `&mut self`:
/// a single client never runs two `choose` calls at once. Share one across
/// tasks behind a `tokio::sync::Mutex` if needed.
///
/// # Example
///
/// ```ignore
/// let mut client = Client::new(1, peers)?;
///
/// match client.choose(Value::Payload(block)).await? {
///     None => { /* our block was chosen */ }
///     Some(accepted) => { /* someone else's block won */ }
/// }
/// ```
pub struct Client<T, V, C> {
    id: C,
    peers: Vec<Box<dyn Peer<T, V, C>>>,
    round: Round,
    config: ClientConfig,
}

impl<T, V, C> Client<T, V, C>
where
    T: fmt::Debug + Send + Sync,
    V: Clone + Ord + Default + fmt::Display + fmt::Debug + Send + Sync,
    C: Clone + Ord + fmt::Display + fmt::Debug + Send + Sync,
{
    /// Create a client with the default configuration.
    pub fn new(id: C, peers: Vec<Box<dyn Peer<T, V, C>>>) -> Result<Self> {
        Self::with_config(id, peers, ClientConfig::default())
    }

    /// Create a client with a custom configuration.
    ///
    /// Fails if `peers` is empty, holds two peers with the same id, or the
    /// configuration is invalid.
    pub fn with_config(
        id: C,
        peers: Vec<Box<dyn Peer<T, V, C>>>,
        config: ClientConfig,
    ) -> Result<Self> {
        if peers.is_empty() {
            return Err(SynodError::Config(
                "a client needs at least one peer".into(),
            ));
        }

        let mut quorum = Quorum::new();
        for peer in &peers {
            let peer_id = peer.id();
            if quorum.contains(&peer_id) {
                return Err(SynodError::Config(format!("duplicate peer ID: {peer_id}")));
            }
            quorum.insert(peer_id);
        }

        config.validate()?;

        Ok(Self {
            id,
            peers,
            round: 0,
            config,
        })
    }

    pub fn id(&self) -> &C {
        &self.id
    }

    /// Round of the last proposal issued.
    pub fn round(&self) -> Round {
        self.round
    }

    pub fn peers(&self) -> &[Box<dyn Peer<T, V, C>>] {
        &self.peers
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Membership formed by every configured peer.
    pub fn quorum(&self) -> Quorum<C> {
        self.peers.iter().map(|peer| peer.id()).collect()
    }

    /// Propose `value` under the default version.
    ///
    /// See [`Client::choose_version`].
    pub async fn choose(&mut self, value: Value<T, C>) -> Result<Option<Accepted<T, V, C>>> {
        self.choose_version(V::default(), value).await
    }

    /// Get `value` chosen, or learn what was chosen before.
    ///
    /// Returns `None` when `value` itself was chosen, and the previously
    /// accepted value otherwise: the client always converges onto what a
    /// quorum already accepted rather than its own proposal. If a peer
    /// reports a value accepted under a newer version, the client moves to
    /// that version and restarts its round count.
    ///
    /// Fails with [`SynodError::TooFewPeers`] as soon as a phase misses a
    /// strict majority; no later phase runs in that case.
    pub async fn choose_version(
        &mut self,
        version: V,
        value: Value<T, C>,
    ) -> Result<Option<Accepted<T, V, C>>> {
        let span = tracing_ext::choose_span(&self.id);
        let result = self.run_choose(version, value).instrument(span).await;
        metrics::record_operation(operation::CHOOSE, outcome_label(&result));
        result
    }

    /// Like [`Client::choose`], but return the agreed value itself.
    pub async fn decide(&mut self, value: Value<T, C>) -> Result<Value<T, C>>
    where
        T: Clone,
    {
        let own = value.clone();
        Ok(match self.choose(value).await? {
            Some(previous) => previous.value,
            None => own,
        })
    }

    /// Read the currently accepted value, if any.
    ///
    /// Among the peers that answer, the reply with the greatest proposal
    /// wins. Does not touch the round counter.
    pub async fn get(&self) -> Result<Option<Value<T, C>>> {
        let span = tracing_ext::get_span(&self.id);
        let result = self.run_get().instrument(span).await;
        metrics::record_operation(operation::GET, outcome_label(&result));
        result
    }

    async fn run_choose(
        &mut self,
        mut version: V,
        value: Value<T, C>,
    ) -> Result<Option<Accepted<T, V, C>>> {
        let quorum = self.quorum();
        tracing::debug!(%quorum, "{}: choose {:?}", self, value);

        let mut previous: Option<Accepted<T, V, C>> = None;
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            self.round += 1;
            metrics::record_round();
            tracing_ext::record_rounds(attempts);

            let proposal = Proposal::new(version.clone(), self.round, self.id.clone());
            tracing::debug!("{}: send proposal {}", self, proposal);

            // Phase 1: Propose
            let tally = fan_out(
                Phase::Propose,
                self.peers
                    .iter()
                    .map(|peer| (peer.id(), peer.propose(&quorum, &proposal))),
                |peer, reply| {
                    if let Some(accepted) = reply {
                        tracing::debug!(
                            %peer,
                            "value already accepted at {}: {:?}",
                            accepted.proposal,
                            accepted.value
                        );
                        Accepted::keep_greatest(&mut previous, accepted);
                    }
                    ControlFlow::Continue(())
                },
            )
            .instrument(tracing_ext::phase_span(Phase::Propose, &proposal))
            .await?;
            quorum.check_headcount(tally.reached)?;

            if let Some(previous) = &previous {
                tracing::debug!("replace value with {:?}", previous.value);
                if previous.proposal.version > version {
                    tracing::debug!(
                        "move from version {} to newer version {}",
                        version,
                        previous.proposal.version
                    );
                    version = previous.proposal.version.clone();
                    self.round = 0;
                }
            }

            // Phase 2: Accept
            let candidate = previous.as_ref().map_or(&value, |previous| &previous.value);
            let mut conflict: Option<Proposal<V, C>> = None;
            let tally = fan_out(
                Phase::Accept,
                self.peers
                    .iter()
                    .map(|peer| (peer.id(), peer.accept(&quorum, &proposal, candidate))),
                |peer, minimum| {
                    // A single higher minimum is enough to restart, even if a
                    // majority might have accepted already.
                    if proposal < minimum {
                        tracing::debug!(%peer, "conflicted proposal {}: minimum is {}", proposal, minimum);
                        conflict = Some(minimum);
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                },
            )
            .instrument(tracing_ext::phase_span(Phase::Accept, &proposal))
            .await?;

            if let Some(minimum) = conflict {
                metrics::record_conflict();
                self.round = minimum.round;
                tracing::debug!("{}: conflicted proposal, retry from round {}", self, self.round);

                if let Some(max_attempts) = self.config.retry.max_attempts {
                    if attempts >= max_attempts {
                        return Err(SynodError::TooManyConflicts { attempts });
                    }
                }
                if let Some(delay) = self.config.retry.delay(attempts) {
                    tracing::trace!(?delay, "backing off before retry");
                    tokio::time::sleep(delay).await;
                }
                continue;
            }
            quorum.check_headcount(tally.reached)?;

            tracing::debug!("{}: chose {:?}", self, candidate);

            // Phase 3: Confirm
            let tally = fan_out(
                Phase::Confirm,
                self.peers
                    .iter()
                    .map(|peer| (peer.id(), peer.confirm(&quorum, &proposal))),
                |_, ()| ControlFlow::Continue(()),
            )
            .instrument(tracing_ext::phase_span(Phase::Confirm, &proposal))
            .await?;
            quorum.check_headcount(tally.reached)?;

            break;
        }

        Ok(previous)
    }

    async fn run_get(&self) -> Result<Option<Value<T, C>>> {
        let quorum = self.quorum();
        tracing::debug!(%quorum, "{}: get value", self);

        let mut latest: Option<Accepted<T, V, C>> = None;
        let tally = fan_out(
            Phase::Get,
            self.peers
                .iter()
                .map(|peer| (peer.id(), peer.get(&quorum))),
            |peer, reply| {
                if let Some(accepted) = reply {
                    tracing::trace!(%peer, "accepted at {}", accepted.proposal);
                    Accepted::keep_greatest(&mut latest, accepted);
                }
                ControlFlow::Continue(())
            },
        )
        .instrument(tracing_ext::phase_span(Phase::Get, &quorum))
        .await?;
        quorum.check_headcount(tally.reached)?;

        Ok(latest.map(|accepted| accepted.value))
    }
}

impl<T, V, C: fmt::Display> fmt::Display for Client<T, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "synod::Client({})", self.id)
    }
}

impl<T, V, C: fmt::Debug> fmt::Debug for Client<T, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("peers", &self.peers.len())
            .field("round", &self.round)
            .finish()
    }
}

fn outcome_label<R>(result: &Result<R>) -> &'static str {
    match result {
        Ok(_) => outcome::OK,
        Err(SynodError::TooFewPeers { .. }) => outcome::TOO_FEW_PEERS,
        Err(SynodError::TooManyConflicts { .. }) => outcome::TOO_MANY_CONFLICTS,
        Err(SynodError::Peer { .. }) => outcome::PEER_ERROR,
        Err(SynodError::Config(_)) => outcome::CONFIG,
    }
}
