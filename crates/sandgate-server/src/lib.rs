//! sandgate-server: real-time session gateway.
//!
//! Bridges browser clients to sandboxed compute instances over persistent
//! WebSocket connections. Every connection is authenticated against a
//! multi-tenant authorization model, registered in a live connection
//! registry, and served by a sequential per-connection read loop that
//! dispatches typed message envelopes to per-domain handlers and fans
//! events out to other viewers of the same instance.

pub mod broadcast;
pub mod config;
pub mod directory;
pub mod handlers;
pub mod handshake;
pub mod registry;
pub mod router;
pub mod sandbox;
pub mod server;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;
