//! Envelope-level reader and writer over a relayer WebSocket.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use shared::{Envelope, EnvelopeError};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("websocket: {0}")]
    Ws(#[from] tungstenite::Error),
    #[error("undecodable frame: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("connection closed by relayer")]
    Closed,
}

/// Write half: sends envelopes.
pub struct RelayWriter {
    sink: SplitSink<WsStream, Message>,
}

/// Read half: yields decoded envelopes.
pub struct RelayReader {
    stream: SplitStream<WsStream>,
}

/// Open a WebSocket to the relayer at `url` (e.g. `ws://127.0.0.1:8000/`).
pub async fn connect(url: &str) -> Result<(RelayWriter, RelayReader), ClientError> {
    let (ws, _) = connect_async(url).await?;
    let (sink, stream) = ws.split();
    Ok((RelayWriter { sink }, RelayReader { stream }))
}

impl RelayWriter {
    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        let text = envelope.to_json()?;
        self.sink.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Send `contents` as a chat envelope. The relayer replaces `sender`, so
    /// it is informational only.
    pub async fn send_chat(&mut self, sender: &str, contents: &str) -> Result<(), ClientError> {
        self.send(&Envelope::chat(sender, contents)).await
    }

    /// Send raw text, bypassing envelope encoding.
    pub async fn send_raw(&mut self, text: &str) -> Result<(), ClientError> {
        self.sink.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.sink.close().await?;
        Ok(())
    }
}

impl RelayReader {
    /// Next envelope, skipping control and binary frames.
    pub async fn next_envelope(&mut self) -> Result<Envelope, ClientError> {
        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Text(t) => return Ok(Envelope::from_json(&t)?),
                Message::Close(_) => return Err(ClientError::Closed),
                _ => continue,
            }
        }
        Err(ClientError::Closed)
    }
}
