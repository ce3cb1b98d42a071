//! Collaboration domain: opaque event relay between sibling connections.
//!
//! The gateway does not interpret collaboration payloads. Every action is
//! rebroadcast verbatim to the instance's other users, stamped with the
//! sender's identity so recipients can attribute it.

use crate::broadcast::Broadcaster;
use crate::registry::Connection;
use sandgate_core::envelope::Domain;
use sandgate_core::{GatewayResult, InboundEnvelope, OutboundEnvelope};
use serde_json::{json, Map, Value};

pub async fn handle(
    connection: &Connection,
    envelope: InboundEnvelope,
    broadcaster: &Broadcaster,
) -> GatewayResult<OutboundEnvelope> {
    let request_id = envelope.request_id;

    // Stamp the sender's identity into the payload. A non-object payload is
    // replaced with a bare object so the stamp always lands.
    let mut data = match envelope.data {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    data.insert("userId".into(), Value::String(connection.user_id.clone()));

    let event = OutboundEnvelope::broadcast(
        Domain::Collaboration,
        envelope.action.clone(),
        Value::Object(data),
    );
    let recipients = broadcaster
        .to_instance(&connection.instance_id, &connection.user_id, &event)
        .await;

    Ok(OutboundEnvelope::reply(
        Domain::Collaboration,
        "broadcasted",
        json!({ "action": envelope.action, "recipients": recipients }),
        request_id,
        true,
    ))
}
