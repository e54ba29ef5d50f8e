//! WebSocket client for the chat relayer.

mod ws;

pub use ws::{connect, ClientError, RelayReader, RelayWriter};
