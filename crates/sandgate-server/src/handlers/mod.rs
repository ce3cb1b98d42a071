//! Per-domain message handlers.
//!
//! Each handler decodes its own typed payload from the envelope's opaque
//! `data`, performs the domain operation through the connection's sandbox
//! handle, and builds the reply. Payload decode failures and other
//! unexpected errors propagate to the router, which converts them into
//! `message_error` envelopes; expected domain failures (missing file,
//! failed command) are returned as `success=false` replies instead.

pub mod collaboration;
pub mod file;
pub mod system;
pub mod terminal;
