//! Per-connection handler.
//!
//! ```text
//! Connecting -> Active -> Closing -> Closed
//! ```
//!
//! The handler owns the read half of the transport and reads one frame at a
//! time. The write half belongs to a writer task that drains the session's
//! outbound queue, so the registry never waits on a socket.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use shared::{Action, Envelope};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::{encode, Frame, RelayState};

/// How long a closing session's writer may keep flushing before it is aborted.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Inbound transport frame, reduced to what the relay cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Close,
    /// Binary, ping and pong frames.
    Ignored,
}

/// Outbound transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(Frame),
    Ping,
}

/// Why a session left the `Active` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame.
    PeerClosed,
    /// Inbound stream ended without a close frame.
    StreamEnded,
    /// Read failed; handled like a clean disconnect.
    Transport(String),
    /// The handshake could not complete; the session never became a member.
    Rejected(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => f.write_str("peer closed"),
            Self::StreamEnded => f.write_str("stream ended"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Rejected(e) => write!(f, "rejected: {e}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Keepalive ping period; `None` disables pings.
    pub ping_interval: Option<Duration>,
    pub drain_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ping_interval: Some(Duration::from_secs(30)),
            drain_timeout: DRAIN_TIMEOUT,
        }
    }
}

/// Drive one connection from accept to teardown.
pub async fn run<R, W, E>(
    relay: Arc<RelayState>,
    mut inbound: R,
    outbound: W,
    peer: Option<SocketAddr>,
    settings: Settings,
) -> CloseReason
where
    R: Stream<Item = Result<Inbound, E>> + Unpin + Send,
    E: fmt::Display,
    W: Sink<Outbound> + Unpin + Send + 'static,
    W::Error: fmt::Display + Send,
{
    // Connecting
    let (session, rx) = relay.open_session();
    let id = session.id();
    let mut writer = tokio::spawn(write_frames(rx, outbound, settings.ping_interval));
    let handle = session.clone();
    if let Err(e) = relay.join(session) {
        tracing::error!(session = %id, peer = ?peer, error = %e, "handshake failed");
        drop(handle);
        writer.abort();
        return CloseReason::Rejected(e.to_string());
    }
    tracing::info!(session = %id, peer = ?peer, "connected");

    // Active
    let reason = loop {
        match inbound.next().await {
            Some(Ok(Inbound::Text(text))) => match relay.relay_chat(id, &text) {
                Ok(_) => {}
                Err(e) if e.is_client_error() => {
                    tracing::warn!(session = %id, error = %e, "bad message");
                    match encode(&Envelope::system(Action::Error, e.to_string())) {
                        Ok(frame) => {
                            handle.deliver(frame);
                        }
                        Err(e) => tracing::error!(session = %id, error = %e, "encode error notice"),
                    }
                }
                Err(e) => tracing::error!(session = %id, error = %e, "relay chat"),
            },
            Some(Ok(Inbound::Ignored)) => {
                tracing::debug!(session = %id, "ignored non-text frame");
            }
            Some(Ok(Inbound::Close)) => break CloseReason::PeerClosed,
            Some(Err(e)) => break CloseReason::Transport(e.to_string()),
            None => break CloseReason::StreamEnded,
        }
    };

    // Closing
    relay.leave(id);
    drop(handle);
    tracing::info!(session = %id, peer = ?peer, reason = %reason, "disconnected");

    // Closed once the writer has flushed or been cut off.
    if tokio::time::timeout(settings.drain_timeout, &mut writer)
        .await
        .is_err()
    {
        tracing::debug!(session = %id, "writer did not drain in time, aborting");
        writer.abort();
    }
    reason
}

/// Forward queued frames to the transport until every sender is gone or a
/// write fails.
async fn write_frames<W>(mut rx: mpsc::Receiver<Frame>, mut sink: W, ping: Option<Duration>)
where
    W: Sink<Outbound> + Unpin,
    W::Error: fmt::Display,
{
    let mut ticker = ping.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });
    loop {
        let out = tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => Outbound::Text(frame),
                None => break,
            },
            _ = tick(&mut ticker) => Outbound::Ping,
        };
        if let Err(e) = sink.send(out).await {
            tracing::debug!(error = %e, "write failed, stopping writer");
            return;
        }
    }
    let _ = sink.close().await;
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Spawned handler, for callers that do not need to await it.
pub fn spawn<R, W, E>(
    relay: Arc<RelayState>,
    inbound: R,
    outbound: W,
    peer: Option<SocketAddr>,
    settings: Settings,
) -> JoinHandle<CloseReason>
where
    R: Stream<Item = Result<Inbound, E>> + Unpin + Send + 'static,
    E: fmt::Display + Send + 'static,
    W: Sink<Outbound> + Unpin + Send + 'static,
    W::Error: fmt::Display + Send,
{
    tokio::spawn(run(relay, inbound, outbound, peer, settings))
}
