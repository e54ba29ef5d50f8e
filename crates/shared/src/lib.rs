//! Shared wire types for the chat relayer and its clients.

mod envelope;

// Explicit re-exports (avoids rust-analyzer issues with `pub use envelope::*`)
pub use envelope::{now_nanos, Action, Envelope, EnvelopeError, SYSTEM_SENDER};
