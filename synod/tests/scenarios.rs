#![cfg(feature = "memory")]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use synod::{
    Accepted, Client, ClientConfig, Hold, MemoryAcceptor, MemoryPeer, Peer, PeerError, Phase,
    Proposal, Quorum, RetryConfig, SynodError, Value,
};
use tracing_test::traced_test;

type Acceptor = MemoryAcceptor<String, u64, u16>;
type Handle = Box<dyn Peer<String, u64, u16>>;

fn cluster(size: usize) -> Vec<Arc<Acceptor>> {
    (0..size).map(|_| Acceptor::new()).collect()
}

fn handles(acceptors: &[Arc<Acceptor>]) -> Vec<Handle> {
    acceptors
        .iter()
        .enumerate()
        .map(|(id, acceptor)| Box::new(MemoryPeer::new(id as u16, acceptor.clone())) as Handle)
        .collect()
}

fn client(id: u16, acceptors: &[Arc<Acceptor>]) -> Client<String, u64, u16> {
    Client::new(id, handles(acceptors)).unwrap()
}

fn payload(value: &str) -> Value<String, u16> {
    Value::Payload(value.to_owned())
}

fn calls(acceptors: &[Arc<Acceptor>], phase: Phase) -> usize {
    acceptors.iter().map(|acceptor| acceptor.calls(phase)).sum()
}

/// Peer whose acceptor goes down right after answering `phase`.
struct DownAfter {
    inner: MemoryPeer<String, u64, u16>,
    phase: Phase,
}

impl DownAfter {
    fn trip(&self, phase: Phase) {
        if phase == self.phase {
            self.inner.acceptor().set_available(false);
        }
    }
}

#[async_trait]
impl Peer<String, u64, u16> for DownAfter {
    fn id(&self) -> u16 {
        self.inner.id()
    }

    async fn propose(
        &self,
        quorum: &Quorum<u16>,
        proposal: &Proposal<u64, u16>,
    ) -> Result<Option<Accepted<String, u64, u16>>, PeerError> {
        let reply = self.inner.propose(quorum, proposal).await;
        self.trip(Phase::Propose);
        reply
    }

    async fn accept(
        &self,
        quorum: &Quorum<u16>,
        proposal: &Proposal<u64, u16>,
        value: &Value<String, u16>,
    ) -> Result<Proposal<u64, u16>, PeerError> {
        let reply = self.inner.accept(quorum, proposal, value).await;
        self.trip(Phase::Accept);
        reply
    }

    async fn confirm(&self, quorum: &Quorum<u16>, proposal: &Proposal<u64, u16>) -> Result<(), PeerError> {
        let reply = self.inner.confirm(quorum, proposal).await;
        self.trip(Phase::Confirm);
        reply
    }

    async fn get(&self, quorum: &Quorum<u16>) -> Result<Option<Accepted<String, u64, u16>>, PeerError> {
        let reply = self.inner.get(quorum).await;
        self.trip(Phase::Get);
        reply
    }
}

/// Peer 0 stays up, peers 1 and 2 drop out after `phase`.
fn failing_after(phase: Phase, acceptors: &[Arc<Acceptor>]) -> Vec<Handle> {
    acceptors
        .iter()
        .enumerate()
        .map(|(id, acceptor)| {
            let inner = MemoryPeer::new(id as u16, acceptor.clone());
            if id == 0 {
                Box::new(inner) as Handle
            } else {
                Box::new(DownAfter { inner, phase }) as Handle
            }
        })
        .collect()
}

#[tokio::test]
async fn choose_then_get_from_another_client() {
    let acceptors = cluster(3);
    let mut a = client(100, &acceptors);
    let b = client(200, &acceptors);

    // Nothing accepted before: our own value wins
    assert!(a.choose(payload("X")).await.unwrap().is_none());
    assert_eq!(b.get().await.unwrap(), Some(payload("X")));

    for acceptor in &acceptors {
        assert_eq!(acceptor.chosen(), Some(Proposal::new(0, 1, 100)));
    }
}

#[tokio::test]
async fn later_choose_converges_on_chosen_value() {
    let acceptors = cluster(3);
    let mut a = client(100, &acceptors);
    let mut b = client(200, &acceptors);

    assert_eq!(a.decide(payload("X")).await.unwrap(), payload("X"));
    assert_eq!(b.decide(payload("Y")).await.unwrap(), payload("X"));
    assert_eq!(a.get().await.unwrap(), Some(payload("X")));
}

#[tokio::test]
async fn get_without_accepted_value_is_empty() {
    let acceptors = cluster(3);
    let reader = client(100, &acceptors);

    assert_eq!(reader.get().await.unwrap(), None);
    assert_eq!(reader.round(), 0);
}

#[tokio::test]
async fn stalled_writer_adopts_competing_value() {
    let acceptors = cluster(3);
    let hold = Hold::new();
    let stalled: Vec<Handle> = acceptors
        .iter()
        .enumerate()
        .map(|(id, acceptor)| {
            Box::new(
                MemoryPeer::new(id as u16, acceptor.clone()).with_hold(Phase::Accept, hold.clone()),
            ) as Handle
        })
        .collect();
    let mut a = Client::new(100, stalled).unwrap();
    let mut b = client(200, &acceptors);

    let writer = tokio::spawn(async move {
        let result = a.choose(payload("X")).await;
        (a, result)
    });

    // A promised everywhere and is now parked before accept
    hold.arrivals(3).await;
    assert!(b.choose(payload("Y")).await.unwrap().is_none());

    hold.release();
    let (a, result) = writer.await.unwrap();
    let previous = result.unwrap().expect("A must discover Y");

    assert_eq!(previous.value, payload("Y"));
    assert_eq!(previous.proposal, Proposal::new(0, 1, 200));
    assert_eq!(a.round(), 2);
    assert_eq!(b.get().await.unwrap(), Some(payload("Y")));
    for acceptor in &acceptors {
        assert_eq!(acceptor.accepted().unwrap().value, payload("Y"));
    }
}

#[tokio::test]
#[traced_test]
async fn minority_down_still_reaches_consensus() {
    let acceptors = cluster(5);
    acceptors[3].set_available(false);
    acceptors[4].set_available(false);
    let mut a = client(100, &acceptors);

    assert!(a.choose(payload("X")).await.unwrap().is_none());
    assert_eq!(a.get().await.unwrap(), Some(payload("X")));
    assert!(logs_contain("peer unavailable"));

    // Peers coming back see the value through any majority
    acceptors[3].set_available(true);
    acceptors[4].set_available(true);
    acceptors[0].set_available(false);
    acceptors[1].set_available(false);
    assert_eq!(a.get().await.unwrap(), Some(payload("X")));
}

#[tokio::test]
async fn majority_down_fails_with_too_few_peers() {
    let acceptors = cluster(5);
    for acceptor in &acceptors[2..] {
        acceptor.set_available(false);
    }
    let mut a = client(100, &acceptors);

    let err = a.choose(payload("X")).await.unwrap_err();
    assert!(matches!(
        err,
        SynodError::TooFewPeers {
            reached: 2,
            total: 5
        }
    ));
    assert!(err.is_retryable());

    let err = a.get().await.unwrap_err();
    assert!(matches!(
        err,
        SynodError::TooFewPeers {
            reached: 2,
            total: 5
        }
    ));

    // The write stopped after propose
    assert_eq!(calls(&acceptors, Phase::Accept), 0);
    assert_eq!(calls(&acceptors, Phase::Confirm), 0);
    assert_eq!(a.round(), 1);
}

#[tokio::test]
async fn half_of_an_even_quorum_is_not_enough() {
    let acceptors = cluster(4);
    acceptors[0].set_available(false);
    acceptors[1].set_available(false);
    let mut a = client(100, &acceptors);

    assert!(matches!(
        a.choose(payload("X")).await,
        Err(SynodError::TooFewPeers {
            reached: 2,
            total: 4
        })
    ));
    assert_eq!(calls(&acceptors, Phase::Confirm), 0);
}

#[tokio::test]
async fn majority_lost_before_accept_chooses_nothing() {
    let acceptors = cluster(3);
    let mut a = Client::new(100, failing_after(Phase::Propose, &acceptors)).unwrap();

    assert!(matches!(
        a.choose(payload("X")).await,
        Err(SynodError::TooFewPeers {
            reached: 1,
            total: 3
        })
    ));

    assert_eq!(calls(&acceptors, Phase::Accept), 3);
    assert_eq!(calls(&acceptors, Phase::Confirm), 0);
    for acceptor in &acceptors {
        assert_eq!(acceptor.chosen(), None);
    }
}

#[tokio::test]
async fn majority_lost_before_confirm_fails() {
    let acceptors = cluster(3);
    let mut a = Client::new(100, failing_after(Phase::Accept, &acceptors)).unwrap();

    assert!(matches!(
        a.choose(payload("X")).await,
        Err(SynodError::TooFewPeers {
            reached: 1,
            total: 3
        })
    ));

    // Every acceptor took the value, only the live one saw the confirm
    for acceptor in &acceptors {
        assert_eq!(acceptor.accepted().unwrap().value, payload("X"));
    }
    assert_eq!(calls(&acceptors, Phase::Confirm), 3);
    assert_eq!(acceptors[0].chosen(), Some(Proposal::new(0, 1, 100)));
    assert_eq!(acceptors[1].chosen(), None);
    assert_eq!(acceptors[2].chosen(), None);
}

#[tokio::test]
async fn stale_client_moves_to_newer_version() {
    let chosen = Proposal::new(3, 5, 9);
    let acceptors: Vec<Arc<Acceptor>> = (0..3)
        .map(|_| Acceptor::with_accepted(chosen.clone(), payload("Z")))
        .collect();
    let mut a = client(100, &acceptors);

    let previous = a.choose_version(0, payload("X")).await.unwrap().unwrap();

    assert_eq!(previous.proposal, chosen);
    assert_eq!(previous.value, payload("Z"));
    // First attempt at version 0 conflicts, the retry runs at version 3
    assert_eq!(a.round(), 6);
    for acceptor in &acceptors {
        let accepted = acceptor.accepted().unwrap();
        assert_eq!(accepted.proposal, Proposal::new(3, 6, 100));
        assert_eq!(accepted.value, payload("Z"));
    }
}

#[tokio::test]
async fn membership_change_is_a_value() {
    let acceptors = cluster(3);
    let mut a = client(100, &acceptors);
    let next = Quorum::from_iter([0, 1, 2, 3]);

    assert!(a.choose(Value::Quorum(next.clone())).await.unwrap().is_none());

    let value = a.get().await.unwrap().unwrap();
    assert_eq!(value.as_quorum(), Some(&next));
    assert!(value.payload().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn competing_writers_agree_on_one_value() {
    let acceptors = cluster(3);
    let config = ClientConfig::default().with_retry(RetryConfig::jittered());

    let writers: Vec<_> = [(100, "X"), (200, "Y")]
        .into_iter()
        .map(|(id, value)| {
            let peers = acceptors
                .iter()
                .enumerate()
                .map(|(peer, acceptor)| {
                    Box::new(
                        MemoryPeer::new(peer as u16, acceptor.clone())
                            .with_latency(Duration::from_millis(1)),
                    ) as Handle
                })
                .collect();
            let mut writer = Client::with_config(id, peers, config.clone()).unwrap();
            tokio::spawn(async move { writer.decide(payload(value)).await })
        })
        .collect();

    let mut decided = Vec::new();
    for writer in writers {
        decided.push(writer.await.unwrap().unwrap());
    }

    assert_eq!(decided[0], decided[1]);
    assert_eq!(client(300, &acceptors).get().await.unwrap(), Some(decided[0].clone()));
}

#[tokio::test]
async fn shared_client_serializes_writes() {
    let acceptors = cluster(3);
    let shared = Arc::new(tokio::sync::Mutex::new(client(100, &acceptors)));

    let tasks: Vec<_> = ["X", "Y", "Z"]
        .into_iter()
        .map(|value| {
            let shared = shared.clone();
            tokio::spawn(async move { shared.lock().await.decide(payload(value)).await })
        })
        .collect();

    let mut decided = Vec::new();
    for task in tasks {
        decided.push(task.await.unwrap().unwrap());
    }

    assert!(decided.iter().all(|value| *value == decided[0]));
    assert_eq!(shared.lock().await.round(), 3);
}
