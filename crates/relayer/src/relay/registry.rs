//! Registry of live sessions.
//!
//! All mutation and snapshotting goes through one mutex. Nothing that can
//! block on the network ever runs while it is held: a session is reached
//! only through its bounded outbound queue, and enqueueing never waits.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Opaque, never-reused session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Serialized frame shared by every recipient of a broadcast.
pub type Frame = Arc<str>;

/// Handle on a connected client's outbound queue.
///
/// The transport itself stays with the connection handler; the registry only
/// ever holds this sender.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    tx: mpsc::Sender<Frame>,
}

impl Session {
    /// New session with a fresh identifier and its queue receiver.
    pub fn open(queue_capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let session = Self {
            id: SessionId::generate(),
            tx,
        };
        (session, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Enqueue a frame without waiting. Returns `false` if it was dropped.
    pub fn deliver(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(session = %self.id, "outbound queue full, frame dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(session = %self.id, "outbound queue closed, frame dropped");
                false
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),
}

/// Point-in-time copy of the registry's membership, in join order.
#[derive(Debug, Clone, Default)]
pub struct Snapshot(Vec<Session>);

impl Snapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, Session> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.0.iter().map(Session::id).collect()
    }

    /// Enqueue `frame` to every member; returns how many accepted it.
    pub fn deliver(&self, frame: &Frame) -> usize {
        deliver_all(&self.0, frame)
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Session;
    type IntoIter = std::slice::Iter<'a, Session>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn deliver_all(sessions: &[Session], frame: &Frame) -> usize {
    sessions
        .iter()
        .filter(|s| s.deliver(Arc::clone(frame)))
        .count()
}

/// The set of sessions that completed their connect handshake.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Mutex<Vec<Session>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, session: Session) -> Result<(), RegistryError> {
        let mut sessions = self.lock();
        if sessions.iter().any(|s| s.id == session.id) {
            return Err(RegistryError::DuplicateSession(session.id));
        }
        sessions.push(session);
        Ok(())
    }

    /// Announce `frame` to the current members and to `session`, then add it.
    ///
    /// Runs as a single critical section, so no member joins or leaves
    /// between the announcement and the insertion, and nothing can be
    /// broadcast to the new session ahead of its own announcement.
    pub fn admit(&self, session: Session, frame: &Frame) -> Result<usize, RegistryError> {
        let mut sessions = self.lock();
        if sessions.iter().any(|s| s.id == session.id) {
            return Err(RegistryError::DuplicateSession(session.id));
        }
        let delivered = deliver_all(&sessions, frame);
        session.deliver(Arc::clone(frame));
        sessions.push(session);
        Ok(delivered)
    }

    /// Remove by identity. Returns `false` if it was not a member.
    pub fn remove(&self, id: SessionId) -> bool {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        sessions.len() != before
    }

    /// Remove `id` and return the remaining members, taken in the same
    /// critical section. `None` if `id` was not a member.
    pub fn remove_and_snapshot(&self, id: SessionId) -> Option<Snapshot> {
        let mut sessions = self.lock();
        let pos = sessions.iter().position(|s| s.id == id)?;
        sessions.remove(pos);
        Some(Snapshot(sessions.clone()))
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.lock().clone())
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().iter().any(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(s: &str) -> Frame {
        Arc::from(s)
    }

    #[test]
    fn add_rejects_duplicate_identifier() {
        let registry = Registry::new();
        let (session, _rx) = Session::open(4);
        registry.add(session.clone()).unwrap();
        assert!(matches!(
            registry.add(session),
            Err(RegistryError::DuplicateSession(_))
        ));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn remove_absent_session_is_noop() {
        let registry = Registry::new();
        let (a, _ra) = Session::open(4);
        let (b, _rb) = Session::open(4);
        registry.add(a.clone()).unwrap();
        assert!(!registry.remove(b.id()));
        assert!(registry.contains(a.id()));
        assert!(registry.remove(a.id()));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_mutation() {
        let registry = Registry::new();
        let (a, _ra) = Session::open(4);
        let (b, _rb) = Session::open(4);
        registry.add(a.clone()).unwrap();
        let snap = registry.snapshot();
        registry.add(b.clone()).unwrap();
        registry.remove(a.id());
        assert_eq!(snap.ids(), vec![a.id()]);
        assert_eq!(registry.snapshot().ids(), vec![b.id()]);
    }

    #[test]
    fn admit_announces_to_members_then_self() {
        let registry = Registry::new();
        let (a, mut ra) = Session::open(4);
        let (b, mut rb) = Session::open(4);
        registry.add(a).unwrap();

        let delivered = registry.admit(b.clone(), &frame("b joined")).unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(&*ra.try_recv().unwrap(), "b joined");
        assert_eq!(&*rb.try_recv().unwrap(), "b joined");
        assert!(rb.try_recv().is_err());
        assert!(registry.contains(b.id()));
    }

    #[test]
    fn remove_and_snapshot_excludes_removed_session() {
        let registry = Registry::new();
        let (a, _ra) = Session::open(4);
        let (b, _rb) = Session::open(4);
        registry.add(a.clone()).unwrap();
        registry.add(b.clone()).unwrap();

        let rest = registry.remove_and_snapshot(a.id()).unwrap();
        assert_eq!(rest.ids(), vec![b.id()]);
        assert!(registry.remove_and_snapshot(a.id()).is_none());
    }

    #[test]
    fn stale_recipient_does_not_block_others() {
        let registry = Registry::new();
        let (a, ra) = Session::open(4);
        let (b, mut rb) = Session::open(4);
        registry.add(a).unwrap();
        registry.add(b).unwrap();
        drop(ra);

        let delivered = registry.snapshot().deliver(&frame("hello"));
        assert_eq!(delivered, 1);
        assert_eq!(&*rb.try_recv().unwrap(), "hello");
    }

    #[test]
    fn full_queue_drops_only_that_recipient() {
        let registry = Registry::new();
        let (slow, _rs) = Session::open(1);
        let (fast, mut rf) = Session::open(8);
        registry.add(slow).unwrap();
        registry.add(fast).unwrap();

        let snap = registry.snapshot();
        assert_eq!(snap.deliver(&frame("1")), 2);
        assert_eq!(snap.deliver(&frame("2")), 1);
        assert_eq!(&*rf.try_recv().unwrap(), "1");
        assert_eq!(&*rf.try_recv().unwrap(), "2");
    }

    #[test]
    fn concurrent_adds_and_removes_settle_to_difference() {
        let registry = Arc::new(Registry::new());
        let sessions: Vec<_> = (0..64).map(|_| Session::open(1)).collect();
        let ids: Vec<_> = sessions.iter().map(|(s, _)| s.id()).collect();

        std::thread::scope(|scope| {
            for (session, _) in &sessions {
                let registry = Arc::clone(&registry);
                let session = session.clone();
                scope.spawn(move || registry.add(session).unwrap());
            }
        });
        std::thread::scope(|scope| {
            for id in ids.iter().take(24).copied() {
                let registry = Arc::clone(&registry);
                scope.spawn(move || {
                    assert!(registry.remove(id));
                    let _ = registry.snapshot().len();
                });
            }
        });

        assert_eq!(registry.count(), 64 - 24);
    }
}
