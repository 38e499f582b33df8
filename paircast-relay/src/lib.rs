//! `Paircast` relay server library.
//!
//! Exposes the relay server for use in tests and embedding. The relay
//! accepts WebSocket connections and re-broadcasts every submitted message
//! to all connected clients, the sender included.

pub mod config;
pub mod relay;
