//! Chat relayer: session registry, broadcast and the WebSocket surface.

pub mod api;
pub mod cli;
pub mod config;
pub mod relay;
