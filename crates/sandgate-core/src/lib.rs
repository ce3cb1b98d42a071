//! sandgate-core: Shared protocol library for the sandgate session gateway.
//!
//! Provides the JSON message envelope types exchanged over the socket,
//! per-action payload shapes, HMAC bearer tokens, and error types.

pub mod envelope;
pub mod error;
pub mod token;

// Re-export commonly used items at crate root.
pub use envelope::{Domain, InboundEnvelope, OutboundEnvelope, ParseOutcome};
pub use error::{GatewayError, GatewayResult};
pub use token::{create_token, generate_secret, verify_token};
