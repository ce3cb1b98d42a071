//! System domain: liveness and status introspection.

use crate::registry::Connection;
use sandgate_core::envelope::Domain;
use sandgate_core::{GatewayResult, InboundEnvelope, OutboundEnvelope};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

pub async fn handle(
    connection: &Connection,
    envelope: InboundEnvelope,
) -> GatewayResult<OutboundEnvelope> {
    let request_id = envelope.request_id;
    match envelope.action.as_str() {
        "ping" => Ok(OutboundEnvelope::reply(
            Domain::System,
            "pong",
            json!({ "timestamp": now_ms() as u64 }),
            request_id,
            true,
        )),
        "status" => {
            let status = connection.sandbox.status().await;
            Ok(OutboundEnvelope::reply(
                Domain::System,
                "status",
                json!({
                    "instanceId": connection.instance_id,
                    "workspaceId": connection.workspace_id,
                    "sandbox": status,
                }),
                request_id,
                true,
            ))
        }
        other => Ok(OutboundEnvelope::protocol_error(
            "unknown_system_action",
            &format!("unknown system action: {other}"),
            request_id,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_connection;
    use sandgate_core::envelope::OutboundKind;

    fn envelope(action: &str) -> InboundEnvelope {
        InboundEnvelope {
            domain: Domain::System,
            action: action.into(),
            data: serde_json::json!({}),
            request_id: Some("s1".into()),
        }
    }

    #[tokio::test]
    async fn ping_pongs_with_timestamp() {
        let (conn, _rx) = make_connection("alice", "inst-1");
        let reply = handle(&conn, envelope("ping")).await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.action, "pong");
        assert!(reply.data["timestamp"].as_u64().unwrap() > 0);
        assert_eq!(reply.request_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn status_reports_sandbox_and_identity() {
        let (conn, _rx) = make_connection("alice", "inst-1");
        let reply = handle(&conn, envelope("status")).await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.action, "status");
        assert_eq!(reply.data["instanceId"], "inst-1");
        assert_eq!(reply.data["sandbox"]["state"], "running");
    }

    #[tokio::test]
    async fn unknown_action() {
        let (conn, _rx) = make_connection("alice", "inst-1");
        let reply = handle(&conn, envelope("reboot")).await.unwrap();
        assert_eq!(reply.kind, OutboundKind::Error);
        assert_eq!(reply.action, "unknown_system_action");
    }
}
