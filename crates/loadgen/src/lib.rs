//! Client tooling for the chat relayer.

pub mod chat;
pub mod cli;
pub mod load;
pub mod relay_client;
