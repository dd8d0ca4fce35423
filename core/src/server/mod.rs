//! Inbound HTTP and WebSocket server

pub mod handlers;
pub mod serve;
pub mod state;
pub mod ws;
