//! In-memory peers for tests and simulations.
//!
//! A [`MemoryAcceptor`] holds the state of one acceptor. Each client talks
//! to it through its own [`MemoryPeer`] handle, which can inject faults:
//! the acceptor can be switched off, a handle can be parked at a phase with
//! a [`Hold`], or delayed by a fixed latency.
//!
//! These acceptors keep everything in memory and are not meant to back a
//! real deployment.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::peer::{Peer, PeerError, Phase};
use crate::proposal::{Accepted, Proposal};
use crate::quorum::Quorum;
use crate::value::Value;

struct AcceptorState<T, V, C> {
    promised: Option<Proposal<V, C>>,
    accepted: Option<Accepted<T, V, C>>,
    chosen: Option<Proposal<V, C>>,
    calls: HashMap<Phase, usize>,
}

/// State of a single in-memory acceptor.
pub struct MemoryAcceptor<T, V, C> {
    state: Mutex<AcceptorState<T, V, C>>,
    available: AtomicBool,
}

impl<T, V, C> MemoryAcceptor<T, V, C>
where
    T: Clone,
    V: Clone + Ord,
    C: Clone + Ord,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(AcceptorState {
                promised: None,
                accepted: None,
                chosen: None,
                calls: HashMap::new(),
            }),
            available: AtomicBool::new(true),
        })
    }

    /// Create an acceptor that already accepted `value` under `proposal`.
    pub fn with_accepted(proposal: Proposal<V, C>, value: Value<T, C>) -> Arc<Self> {
        let acceptor = Self::new();
        {
            let mut state = acceptor.state.lock();
            state.promised = Some(proposal.clone());
            state.accepted = Some(Accepted::new(proposal, value));
        }
        acceptor
    }

    /// Switch the acceptor on or off. Calls to an unavailable acceptor fail
    /// with [`PeerError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn promised(&self) -> Option<Proposal<V, C>> {
        self.state.lock().promised.clone()
    }

    pub fn accepted(&self) -> Option<Accepted<T, V, C>> {
        self.state.lock().accepted.clone()
    }

    /// Proposal of the last confirmed value.
    pub fn chosen(&self) -> Option<Proposal<V, C>> {
        self.state.lock().chosen.clone()
    }

    /// Number of calls for `phase` that reached this acceptor, including
    /// those refused while unavailable.
    pub fn calls(&self, phase: Phase) -> usize {
        self.state.lock().calls.get(&phase).copied().unwrap_or(0)
    }

    fn record(&self, phase: Phase) {
        *self.state.lock().calls.entry(phase).or_default() += 1;
    }

    fn promise(&self, proposal: &Proposal<V, C>) -> Option<Accepted<T, V, C>> {
        let mut state = self.state.lock();
        if state.promised.as_ref().map_or(true, |promised| proposal > promised) {
            state.promised = Some(proposal.clone());
        }
        state.accepted.clone()
    }

    fn accept(&self, proposal: &Proposal<V, C>, value: &Value<T, C>) -> Proposal<V, C> {
        let mut state = self.state.lock();
        if let Some(promised) = &state.promised {
            if promised > proposal {
                return promised.clone();
            }
        }
        state.promised = Some(proposal.clone());
        state.accepted = Some(Accepted::new(proposal.clone(), value.clone()));
        proposal.clone()
    }

    fn confirm(&self, proposal: &Proposal<V, C>) {
        let mut state = self.state.lock();
        let matches = state
            .accepted
            .as_ref()
            .is_some_and(|accepted| &accepted.proposal == proposal);
        if matches {
            state.chosen = Some(proposal.clone());
        }
    }

    fn current(&self) -> Option<Accepted<T, V, C>> {
        self.state.lock().accepted.clone()
    }
}

struct HoldInner {
    open: watch::Sender<bool>,
    arrived: watch::Sender<usize>,
}

/// Gate that parks peer calls until released.
///
/// Clones share the same gate.
#[derive(Clone)]
pub struct Hold {
    inner: Arc<HoldInner>,
}

impl Hold {
    /// Create a closed gate.
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        let (arrived, _) = watch::channel(0);
        Self {
            inner: Arc::new(HoldInner { open, arrived }),
        }
    }

    /// Let every parked and future call through.
    pub fn release(&self) {
        self.inner.open.send_replace(true);
    }

    /// Wait until at least `count` calls reached the gate.
    pub async fn arrivals(&self, count: usize) {
        let mut arrived = self.inner.arrived.subscribe();
        let _ = arrived.wait_for(|arrived| *arrived >= count).await;
    }

    async fn pass(&self) {
        self.inner.arrived.send_modify(|arrived| *arrived += 1);
        let mut open = self.inner.open.subscribe();
        let _ = open.wait_for(|open| *open).await;
    }
}

impl Default for Hold {
    fn default() -> Self {
        Self::new()
    }
}

/// One client's handle on a [`MemoryAcceptor`].
pub struct MemoryPeer<T, V, C> {
    id: C,
    acceptor: Arc<MemoryAcceptor<T, V, C>>,
    hold: Option<(Phase, Hold)>,
    latency: Option<Duration>,
}

impl<T, V, C> MemoryPeer<T, V, C>
where
    T: Clone,
    V: Clone + Ord,
    C: Clone + Ord + fmt::Display,
{
    pub fn new(id: C, acceptor: Arc<MemoryAcceptor<T, V, C>>) -> Self {
        Self {
            id,
            acceptor,
            hold: None,
            latency: None,
        }
    }

    /// Park calls for `phase` on `hold` until it is released.
    pub fn with_hold(mut self, phase: Phase, hold: Hold) -> Self {
        self.hold = Some((phase, hold));
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn acceptor(&self) -> &Arc<MemoryAcceptor<T, V, C>> {
        &self.acceptor
    }

    async fn enter(&self, phase: Phase, quorum: &Quorum<C>) -> Result<(), PeerError> {
        if let Some((held, hold)) = &self.hold {
            if *held == phase {
                hold.pass().await;
            }
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.acceptor.record(phase);
        if !self.acceptor.is_available() {
            return Err(PeerError::unavailable(format!("acceptor {} is down", self.id)));
        }
        if !quorum.contains(&self.id) {
            return Err(anyhow::anyhow!("{} is not a member of quorum {}", self.id, quorum).into());
        }
        Ok(())
    }
}

#[async_trait]
impl<T, V, C> Peer<T, V, C> for MemoryPeer<T, V, C>
where
    T: Clone + Send + Sync,
    V: Clone + Ord + Send + Sync,
    C: Clone + Ord + fmt::Display + Send + Sync,
{
    fn id(&self) -> C {
        self.id.clone()
    }

    async fn propose(
        &self,
        quorum: &Quorum<C>,
        proposal: &Proposal<V, C>,
    ) -> Result<Option<Accepted<T, V, C>>, PeerError> {
        self.enter(Phase::Propose, quorum).await?;
        Ok(self.acceptor.promise(proposal))
    }

    async fn accept(
        &self,
        quorum: &Quorum<C>,
        proposal: &Proposal<V, C>,
        value: &Value<T, C>,
    ) -> Result<Proposal<V, C>, PeerError> {
        self.enter(Phase::Accept, quorum).await?;
        Ok(self.acceptor.accept(proposal, value))
    }

    async fn confirm(&self, quorum: &Quorum<C>, proposal: &Proposal<V, C>) -> Result<(), PeerError> {
        self.enter(Phase::Confirm, quorum).await?;
        self.acceptor.confirm(proposal);
        Ok(())
    }

    async fn get(&self, quorum: &Quorum<C>) -> Result<Option<Accepted<T, V, C>>, PeerError> {
        self.enter(Phase::Get, quorum).await?;
        Ok(self.acceptor.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Acceptor = MemoryAcceptor<&'static str, u32, u16>;

    fn p(version: u32, round: u64, proposer: u16) -> Proposal<u32, u16> {
        Proposal::new(version, round, proposer)
    }

    #[test]
    fn test_accept_requires_promise() {
        let acceptor = Acceptor::new();

        assert!(acceptor.promise(&p(0, 2, 1)).is_none());

        // Lower proposal is refused with the promise
        assert_eq!(acceptor.accept(&p(0, 1, 2), &Value::Payload("x")), p(0, 2, 1));
        assert!(acceptor.accepted().is_none());

        assert_eq!(acceptor.accept(&p(0, 2, 1), &Value::Payload("y")), p(0, 2, 1));
        assert_eq!(acceptor.accepted().unwrap().value, Value::Payload("y"));
    }

    #[test]
    fn test_promise_reports_accepted_value() {
        let acceptor = Acceptor::with_accepted(p(3, 5, 9), Value::Payload("z"));

        // Even a stale proposal learns about the accepted value
        let accepted = acceptor.promise(&p(0, 1, 1)).unwrap();
        assert_eq!(accepted.proposal, p(3, 5, 9));
        assert_eq!(acceptor.promised(), Some(p(3, 5, 9)));
    }

    #[test]
    fn test_confirm_is_idempotent() {
        let acceptor = Acceptor::new();
        acceptor.accept(&p(0, 1, 1), &Value::Payload("x"));

        acceptor.confirm(&p(0, 9, 9));
        assert!(acceptor.chosen().is_none());

        acceptor.confirm(&p(0, 1, 1));
        acceptor.confirm(&p(0, 1, 1));
        assert_eq!(acceptor.chosen(), Some(p(0, 1, 1)));
    }

    #[tokio::test]
    async fn test_unavailable_peer() {
        let acceptor = Acceptor::new();
        let peer = MemoryPeer::new(1, acceptor.clone());
        let quorum = Quorum::from_iter([1]);

        acceptor.set_available(false);
        let err = peer.get(&quorum).await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(acceptor.calls(Phase::Get), 1);

        acceptor.set_available(true);
        assert!(peer.get(&quorum).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_foreign_quorum_is_rejected() {
        let peer = MemoryPeer::new(4, Acceptor::new());
        let err = peer.get(&Quorum::from_iter([1, 2, 3])).await.unwrap_err();
        assert!(!err.is_unavailable());
    }

    #[tokio::test]
    async fn test_hold_parks_until_release() {
        let hold = Hold::new();
        let acceptor = Acceptor::new();
        let peer = MemoryPeer::new(1, acceptor.clone()).with_hold(Phase::Accept, hold.clone());
        let quorum = Quorum::from_iter([1]);

        let task = tokio::spawn(async move {
            peer.accept(&quorum, &p(0, 1, 1), &Value::Payload("x")).await
        });

        hold.arrivals(1).await;
        assert!(acceptor.accepted().is_none());

        hold.release();
        assert_eq!(task.await.unwrap().unwrap(), p(0, 1, 1));
        assert!(acceptor.accepted().is_some());
    }
}
