use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{Result, SessionError};

/// Identity of one registered peer, unique among live peers of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Write side of a registered peer connection.
pub trait PeerSink: Send + Sync {
    /// Write one complete, delimited frame.
    fn send_frame(&self, frame: &[u8]) -> linecast_frame::Result<()>;

    /// Close the connection, waking any reader blocked on it.
    fn close(&self);
}

struct Entry<S> {
    addr: SocketAddr,
    sink: Arc<S>,
}

struct Inner<S> {
    peers: BTreeMap<PeerId, Entry<S>>,
    next_id: u64,
    closed: bool,
}

impl<S> Inner<S> {
    fn allocate_id(&mut self) -> PeerId {
        loop {
            let candidate = PeerId(self.next_id);
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if !self.peers.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

/// The live set of peers connected to a host.
///
/// Cloning yields another handle to the same set. Every mutation happens
/// under one lock; writes to peers happen outside it.
pub struct Registry<S> {
    inner: Arc<Mutex<Inner<S>>>,
}

impl<S> Clone for Registry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: PeerSink> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PeerSink> Registry<S> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                peers: BTreeMap::new(),
                next_id: 1,
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        // Each mutation is a single map operation, so the state is consistent
        // even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assign a fresh identity to `sink` and add it to the live set.
    pub fn register(&self, addr: SocketAddr, sink: S) -> Result<PeerId> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(SessionError::RegistryClosed);
        }

        let id = inner.allocate_id();
        inner.peers.insert(
            id,
            Entry {
                addr,
                sink: Arc::new(sink),
            },
        );
        debug!(%id, %addr, peers = inner.peers.len(), "registered peer");
        Ok(id)
    }

    /// Write `frame` to every registered peer.
    ///
    /// Peers whose write fails are closed and removed; the rest still receive
    /// the frame. Returns how many peers the frame was delivered to.
    pub fn broadcast(&self, frame: &[u8]) -> usize {
        let snapshot: Vec<(PeerId, Arc<S>)> = self
            .lock()
            .peers
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(&entry.sink)))
            .collect();

        let mut delivered = 0usize;
        let mut failed = Vec::new();
        for (id, sink) in snapshot {
            match sink.send_frame(frame) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    debug!(%id, error = %err, "pruning peer after failed write");
                    failed.push((id, sink));
                }
            }
        }

        if !failed.is_empty() {
            let mut inner = self.lock();
            for (id, sink) in &failed {
                // Only remove the entry the snapshot saw.
                let same = inner
                    .peers
                    .get(id)
                    .is_some_and(|entry| Arc::ptr_eq(&entry.sink, sink));
                if same {
                    inner.peers.remove(id);
                }
            }
            drop(inner);
            for (_, sink) in failed {
                sink.close();
            }
        }

        delivered
    }

    /// Write `frame` to a single peer.
    ///
    /// A failed write is returned to the caller and does not remove the peer.
    pub fn send_to(&self, id: PeerId, frame: &[u8]) -> Result<()> {
        let sink = self
            .lock()
            .peers
            .get(&id)
            .map(|entry| Arc::clone(&entry.sink))
            .ok_or(SessionError::UnknownPeer(id))?;
        sink.send_frame(frame)?;
        Ok(())
    }

    /// Close and remove one peer. Returns whether it was registered.
    pub fn remove(&self, id: PeerId) -> bool {
        let removed = self.lock().peers.remove(&id);
        match removed {
            Some(entry) => {
                entry.sink.close();
                debug!(%id, "removed peer");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.lock().peers.contains_key(&id)
    }

    /// Registered identities in ascending order.
    pub fn ids(&self) -> Vec<PeerId> {
        self.lock().peers.keys().copied().collect()
    }

    /// Remote address of a registered peer.
    pub fn addr_of(&self, id: PeerId) -> Option<SocketAddr> {
        self.lock().peers.get(&id).map(|entry| entry.addr)
    }

    pub fn len(&self) -> usize {
        self.lock().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().peers.is_empty()
    }

    /// Refuse further registrations and close every registered peer.
    ///
    /// Idempotent.
    pub fn close(&self) {
        let drained = {
            let mut inner = self.lock();
            inner.closed = true;
            std::mem::take(&mut inner.peers)
        };
        for (id, entry) in drained {
            debug!(%id, "closing peer");
            entry.sink.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::ErrorKind;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use linecast_frame::{encode_to_vec, FrameError};
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct MockSink {
        received: Mutex<Vec<u8>>,
        fail: AtomicBool,
        closed: AtomicBool,
    }

    impl MockSink {
        fn failing() -> Self {
            let sink = Self::default();
            sink.fail.store(true, Ordering::SeqCst);
            sink
        }
    }

    impl PeerSink for Arc<MockSink> {
        fn send_frame(&self, frame: &[u8]) -> linecast_frame::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(FrameError::Io(ErrorKind::ConnectionReset.into()));
            }
            self.received.lock().unwrap().extend_from_slice(frame);
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn broadcast_isolates_failed_peer() {
        let registry = Registry::new();
        let a = Arc::new(MockSink::default());
        let b = Arc::new(MockSink::failing());
        let c = Arc::new(MockSink::default());

        let id_a = registry.register(addr(1), Arc::clone(&a)).unwrap();
        let id_b = registry.register(addr(2), Arc::clone(&b)).unwrap();
        let id_c = registry.register(addr(3), Arc::clone(&c)).unwrap();

        let frame = encode_to_vec("chat", &json!({"msg": "hi"})).unwrap();
        let delivered = registry.broadcast(&frame);

        let expected = b"{\"PT\":\"chat\",\"DATA\":{\"msg\":\"hi\"}}\n";
        assert_eq!(delivered, 2);
        assert_eq!(a.received.lock().unwrap().as_slice(), expected);
        assert_eq!(c.received.lock().unwrap().as_slice(), expected);
        assert!(b.received.lock().unwrap().is_empty());
        assert!(b.closed.load(Ordering::SeqCst));
        assert_eq!(registry.ids(), vec![id_a, id_c]);
        assert!(!registry.contains(id_b));
    }

    #[test]
    fn pruned_peer_is_not_attempted_again() {
        let registry = Registry::new();
        let good = Arc::new(MockSink::default());
        let bad = Arc::new(MockSink::failing());
        registry.register(addr(1), Arc::clone(&good)).unwrap();
        registry.register(addr(2), Arc::clone(&bad)).unwrap();

        assert_eq!(registry.broadcast(b"one\n"), 1);

        // Were the peer still registered, this write would now succeed.
        bad.fail.store(false, Ordering::SeqCst);
        assert_eq!(registry.broadcast(b"two\n"), 1);
        assert!(bad.received.lock().unwrap().is_empty());
        assert_eq!(good.received.lock().unwrap().as_slice(), b"one\ntwo\n");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn send_to_failure_does_not_prune() {
        let registry = Registry::new();
        let bad = Arc::new(MockSink::failing());
        let id = registry.register(addr(1), Arc::clone(&bad)).unwrap();

        let err = registry.send_to(id, b"x\n").unwrap_err();
        assert!(matches!(err, SessionError::Frame(FrameError::Io(_))));
        assert!(registry.contains(id));
        assert!(!bad.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn send_to_unknown_peer() {
        let registry: Registry<Arc<MockSink>> = Registry::new();
        let err = registry.send_to(PeerId(42), b"x\n").unwrap_err();
        assert!(matches!(err, SessionError::UnknownPeer(PeerId(42))));
    }

    #[test]
    fn sequential_ids_are_distinct() {
        let registry = Registry::new();
        let ids: Vec<PeerId> = (0..50)
            .map(|i| {
                registry
                    .register(addr(i), Arc::new(MockSink::default()))
                    .unwrap()
            })
            .collect();

        let unique: HashSet<PeerId> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 50);
        assert_eq!(registry.ids(), ids);
        assert_eq!(ids[0].to_string(), "peer-1");
    }

    #[test]
    fn concurrent_registrations_get_distinct_ids() {
        let registry = Registry::new();
        let handles: Vec<_> = (0..8u16)
            .map(|t| {
                let registry = registry.clone();
                thread::spawn(move || {
                    (0..100u16)
                        .map(|i| {
                            registry
                                .register(addr(t * 100 + i), Arc::new(MockSink::default()))
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let all: Vec<PeerId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<PeerId> = all.iter().copied().collect();
        assert_eq!(all.len(), 800);
        assert_eq!(unique.len(), 800);
        assert_eq!(registry.len(), 800);
    }

    #[test]
    fn concurrent_broadcast_and_register() {
        let registry = Registry::new();
        for i in 0..10 {
            registry
                .register(addr(i), Arc::new(MockSink::default()))
                .unwrap();
        }

        let broadcaster = {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let delivered = registry.broadcast(b"tick\n");
                    assert!(delivered >= 10);
                }
            })
        };
        for i in 10..60 {
            registry
                .register(addr(i), Arc::new(MockSink::default()))
                .unwrap();
        }
        broadcaster.join().unwrap();
        assert_eq!(registry.len(), 60);
    }

    #[test]
    fn allocation_skips_live_ids_after_wraparound() {
        let registry = Registry::new();
        let first = registry
            .register(addr(1), Arc::new(MockSink::default()))
            .unwrap();
        assert_eq!(first, PeerId(1));

        registry.lock().next_id = u64::MAX;
        let last = registry
            .register(addr(2), Arc::new(MockSink::default()))
            .unwrap();
        assert_eq!(last, PeerId(u64::MAX));

        // Counter wraps to 1, which is still live, so 2 is chosen.
        let wrapped = registry
            .register(addr(3), Arc::new(MockSink::default()))
            .unwrap();
        assert_eq!(wrapped, PeerId(2));
    }

    #[test]
    fn remove_closes_peer() {
        let registry = Registry::new();
        let sink = Arc::new(MockSink::default());
        let id = registry.register(addr(1), Arc::clone(&sink)).unwrap();
        assert_eq!(registry.addr_of(id), Some(addr(1)));

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(sink.closed.load(Ordering::SeqCst));
        assert!(registry.is_empty());
    }

    #[test]
    fn close_is_idempotent_and_rejects_registration() {
        let registry = Registry::new();
        let sink = Arc::new(MockSink::default());
        registry.register(addr(1), Arc::clone(&sink)).unwrap();

        registry.close();
        registry.close();
        assert!(registry.is_closed());
        assert!(registry.is_empty());
        assert!(sink.closed.load(Ordering::SeqCst));
        assert!(matches!(
            registry.register(addr(2), Arc::new(MockSink::default())),
            Err(SessionError::RegistryClosed)
        ));
        assert_eq!(registry.broadcast(b"late\n"), 0);
    }
}
