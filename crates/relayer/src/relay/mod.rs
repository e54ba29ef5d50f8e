//! Session registry and broadcast.

pub mod connection;
mod registry;

use std::sync::Arc;

use shared::{Action, Envelope, EnvelopeError};

pub use registry::{Frame, Registry, RegistryError, Session, SessionId, Snapshot};

/// Default capacity of each session's outbound queue.
pub const DEFAULT_SEND_QUEUE: usize = 1024;

/// Relay state: the registry plus the fan-out built on top of it.
#[derive(Debug)]
pub struct RelayState {
    registry: Registry,
    send_queue: usize,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_QUEUE)
    }
}

impl RelayState {
    pub fn new(send_queue: usize) -> Self {
        Self {
            registry: Registry::new(),
            send_queue: send_queue.max(1),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of sessions that completed their handshake and have not left.
    pub fn count(&self) -> usize {
        self.registry.count()
    }

    /// Allocate an identifier and outbound queue for a freshly accepted
    /// connection. The session is not a member yet.
    pub fn open_session(&self) -> (Session, tokio::sync::mpsc::Receiver<Frame>) {
        Session::open(self.send_queue)
    }

    /// Connect handshake: tell the existing members, tell the newcomer, then
    /// register it.
    pub fn join(&self, session: Session) -> Result<(), JoinError> {
        let id = session.id();
        let frame = encode(&Envelope::system(Action::Connect, id.to_string()))?;
        let notified = self.registry.admit(session, &frame)?;
        tracing::info!(session = %id, notified, "session joined");
        Ok(())
    }

    /// Serialize once and enqueue to every member of a fresh snapshot.
    ///
    /// Best effort: recipients whose queue is closed or full are skipped.
    /// Returns how many recipients accepted the frame.
    pub fn broadcast(&self, envelope: &Envelope) -> Result<usize, EnvelopeError> {
        let frame = encode(envelope)?;
        Ok(self.registry.snapshot().deliver(&frame))
    }

    /// Re-wrap an inbound frame as a chat envelope from `sender` and
    /// broadcast it to everyone, the sender included.
    pub fn relay_chat(&self, sender: SessionId, text: &str) -> Result<usize, EnvelopeError> {
        let inbound = Envelope::from_json(text)?;
        self.broadcast(&Envelope::chat(sender.to_string(), inbound.contents))
    }

    /// Remove `id` and announce its departure to the members that remain.
    ///
    /// The leaving session is not among the recipients. Returns `false` if it
    /// was not registered.
    pub fn leave(&self, id: SessionId) -> bool {
        let Some(rest) = self.registry.remove_and_snapshot(id) else {
            tracing::warn!(session = %id, "leave for unregistered session");
            return false;
        };
        match encode(&Envelope::system(Action::Disconnect, id.to_string())) {
            Ok(frame) => {
                let notified = rest.deliver(&frame);
                tracing::info!(session = %id, notified, "session left");
            }
            Err(e) => tracing::error!(session = %id, error = %e, "encode disconnect notice"),
        }
        true
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Encode an envelope into a frame that can be shared across recipients.
pub fn encode(envelope: &Envelope) -> Result<Frame, EnvelopeError> {
    Ok(Arc::from(envelope.to_json()?))
}
