//! Message router: dispatch on envelope `type`, contain handler failures.
//!
//! The router performs no domain logic. It touches the connection's
//! activity timestamp, hands the envelope to the handler for its domain,
//! and converts any handler error into a `message_error` envelope. This is
//! the failure-containment boundary: one malformed or failing message must
//! never terminate the socket or affect other connections.

use crate::broadcast::Broadcaster;
use crate::handlers;
use crate::registry::{Connection, ConnectionRegistry};
use futures_util::FutureExt;
use sandgate_core::envelope::Domain;
use sandgate_core::{InboundEnvelope, OutboundEnvelope};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Generic text sent to the peer when a frame cannot be processed. Details
/// stay in the server log.
const MESSAGE_ERROR_TEXT: &str = "Failed to process message";

pub struct MessageRouter {
    broadcaster: Broadcaster,
}

impl MessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            broadcaster: Broadcaster::new(registry),
        }
    }

    /// Route one decoded envelope, always producing a direct reply.
    pub async fn route(
        &self,
        connection: &Arc<Connection>,
        envelope: InboundEnvelope,
    ) -> OutboundEnvelope {
        connection.touch();
        let domain = envelope.domain;
        let action = envelope.action.clone();
        let request_id = envelope.request_id.clone();

        // Handlers call into sandbox implementations the gateway does not
        // control, so a panic is contained here the same as an error; the
        // session and every other connection keep running.
        let dispatch = async {
            match domain {
                Domain::Terminal => handlers::terminal::handle(connection, envelope).await,
                Domain::File => {
                    handlers::file::handle(connection, envelope, &self.broadcaster).await
                }
                Domain::System => handlers::system::handle(connection, envelope).await,
                Domain::Collaboration => {
                    handlers::collaboration::handle(connection, envelope, &self.broadcaster).await
                }
            }
        };
        let result = AssertUnwindSafe(dispatch).catch_unwind().await;

        match result {
            Ok(Ok(reply)) => {
                debug!(
                    connection_id = %connection.id,
                    domain = domain.as_str(),
                    action = %action,
                    success = reply.success,
                    "message handled"
                );
                reply
            }
            Ok(Err(e)) => {
                warn!(
                    connection_id = %connection.id,
                    domain = domain.as_str(),
                    action = %action,
                    error = %e,
                    "handler failed"
                );
                OutboundEnvelope::protocol_error("message_error", MESSAGE_ERROR_TEXT, request_id)
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(
                    connection_id = %connection.id,
                    domain = domain.as_str(),
                    action = %action,
                    panic = %detail,
                    "handler panicked"
                );
                OutboundEnvelope::protocol_error("message_error", MESSAGE_ERROR_TEXT, request_id)
            }
        }
    }

    /// Reply for a frame whose `type` is outside the closed set.
    pub fn unknown_type(request_id: Option<String>) -> OutboundEnvelope {
        OutboundEnvelope::protocol_error("unknown_type", "unknown message type", request_id)
    }

    /// Reply for a frame that is not a valid envelope at all.
    pub fn malformed() -> OutboundEnvelope {
        OutboundEnvelope::protocol_error("message_error", MESSAGE_ERROR_TEXT, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_connection, make_connection_with_sandbox, MockSandbox};
    use sandgate_core::envelope::OutboundKind;
    use serde_json::json;

    fn router() -> MessageRouter {
        MessageRouter::new(Arc::new(ConnectionRegistry::new()))
    }

    fn envelope(domain: Domain, action: &str, data: serde_json::Value) -> InboundEnvelope {
        InboundEnvelope {
            domain,
            action: action.into(),
            data,
            request_id: Some("req-1".into()),
        }
    }

    #[tokio::test]
    async fn handler_error_becomes_message_error() {
        let (conn, _rx) = make_connection("alice", "inst-1");
        // file/write without a path fails payload decoding inside the handler.
        let reply = router()
            .route(&conn, envelope(Domain::File, "write", json!({"content": "x"})))
            .await;
        assert_eq!(reply.kind, OutboundKind::Error);
        assert_eq!(reply.action, "message_error");
        assert!(!reply.success);
        assert_eq!(reply.request_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn connection_stays_usable_after_handler_error() {
        let (conn, _rx) = make_connection("alice", "inst-1");
        let r = router();
        let bad = r
            .route(&conn, envelope(Domain::File, "write", json!({})))
            .await;
        assert_eq!(bad.action, "message_error");

        let pong = r
            .route(&conn, envelope(Domain::System, "ping", json!({})))
            .await;
        assert_eq!(pong.action, "pong");
        assert!(pong.success);
    }

    #[tokio::test]
    async fn handler_panic_becomes_message_error() {
        let sandbox = Arc::new(MockSandbox::new());
        sandbox.panic_on_exec();
        let (conn, _rx) = make_connection_with_sandbox("alice", "inst-1", sandbox);
        let r = router();

        let reply = r
            .route(
                &conn,
                envelope(Domain::Terminal, "execute", json!({"command": "ls"})),
            )
            .await;
        assert_eq!(reply.kind, OutboundKind::Error);
        assert_eq!(reply.action, "message_error");
        assert!(!reply.success);
        assert_eq!(reply.request_id.as_deref(), Some("req-1"));

        // The panic must not poison the session.
        let pong = r
            .route(&conn, envelope(Domain::System, "ping", json!({})))
            .await;
        assert_eq!(pong.action, "pong");
        assert!(pong.success);
    }

    #[tokio::test]
    async fn reply_correlation_preserved() {
        let (conn, _rx) = make_connection("alice", "inst-1");
        let reply = router()
            .route(&conn, envelope(Domain::System, "ping", json!({})))
            .await;
        assert_eq!(reply.request_id.as_deref(), Some("req-1"));

        let mut no_id = envelope(Domain::System, "ping", json!({}));
        no_id.request_id = None;
        let reply = router().route(&conn, no_id).await;
        assert!(reply.request_id.is_none());
    }

    #[tokio::test]
    async fn touches_activity() {
        let (conn, _rx) = make_connection("alice", "inst-1");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(conn.idle().as_millis() >= 10);
        router()
            .route(&conn, envelope(Domain::System, "ping", json!({})))
            .await;
        assert!(conn.idle().as_millis() < 10);
    }

    #[test]
    fn unknown_type_reply_shape() {
        let reply = MessageRouter::unknown_type(Some("r".into()));
        assert_eq!(reply.kind, OutboundKind::Error);
        assert_eq!(reply.action, "unknown_type");
        assert!(!reply.success);
        assert_eq!(reply.request_id.as_deref(), Some("r"));
    }

    #[test]
    fn malformed_reply_shape() {
        let reply = MessageRouter::malformed();
        assert_eq!(reply.action, "message_error");
        assert_eq!(reply.data["error"], "Failed to process message");
        assert!(reply.request_id.is_none());
    }
}
