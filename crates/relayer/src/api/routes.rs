//! API route handlers.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    Json,
};
use futures_util::{future, SinkExt, StreamExt};

use crate::api::AppState;
use crate::relay::connection::{self, Inbound, Outbound};

/// Current number of registered sessions.
pub async fn num_clients(State(state): State<AppState>) -> Json<usize> {
    Json(state.relay.count())
}

// --- WebSocket ---

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

/// Adapt the axum socket to the relay's frame types and run the session.
async fn handle_socket(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let (ws_tx, ws_rx) = socket.split();
    let inbound = ws_rx.map(|msg| msg.map(inbound_frame));
    let outbound =
        ws_tx.with(|out: Outbound| future::ready(Ok::<_, axum::Error>(outbound_message(out))));
    connection::run(
        state.relay,
        inbound,
        outbound,
        Some(peer),
        state.connection,
    )
    .await;
}

fn inbound_frame(msg: Message) -> Inbound {
    match msg {
        Message::Text(t) => Inbound::Text(t.as_str().to_owned()),
        Message::Close(_) => Inbound::Close,
        Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => Inbound::Ignored,
    }
}

fn outbound_message(out: Outbound) -> Message {
    match out {
        Outbound::Text(frame) => Message::Text(frame.to_string().into()),
        Outbound::Ping => Message::Ping(axum::body::Bytes::new()),
    }
}
