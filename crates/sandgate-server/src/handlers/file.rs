//! File domain: read, write, list. Writes notify sibling editors.

use crate::broadcast::Broadcaster;
use crate::registry::Connection;
use sandgate_core::envelope::{Domain, ListRequest, ReadRequest, WriteRequest};
use sandgate_core::{GatewayResult, InboundEnvelope, OutboundEnvelope};
use serde_json::json;

pub async fn handle(
    connection: &Connection,
    envelope: InboundEnvelope,
    broadcaster: &Broadcaster,
) -> GatewayResult<OutboundEnvelope> {
    let request_id = envelope.request_id;
    match envelope.action.as_str() {
        "read" => {
            let req: ReadRequest = serde_json::from_value(envelope.data)?;
            match connection.sandbox.read_file(&req.path).await {
                Ok(content) => Ok(OutboundEnvelope::reply(
                    Domain::File,
                    "content",
                    json!({ "path": req.path, "content": content }),
                    request_id,
                    true,
                )),
                Err(e) => Ok(OutboundEnvelope::domain_failure(
                    Domain::File,
                    "content",
                    &e.to_string(),
                    request_id,
                )),
            }
        }
        "write" => {
            let req: WriteRequest = serde_json::from_value(envelope.data)?;
            match connection.sandbox.write_file(&req.path, &req.content).await {
                Ok(()) => {
                    // Notify the user's collaborators; the writer's own tabs
                    // already know.
                    let event = OutboundEnvelope::broadcast(
                        Domain::File,
                        "changed",
                        json!({ "path": req.path, "userId": connection.user_id }),
                    );
                    broadcaster
                        .to_instance(&connection.instance_id, &connection.user_id, &event)
                        .await;
                    Ok(OutboundEnvelope::reply(
                        Domain::File,
                        "saved",
                        json!({ "path": req.path }),
                        request_id,
                        true,
                    ))
                }
                Err(e) => Ok(OutboundEnvelope::domain_failure(
                    Domain::File,
                    "saved",
                    &e.to_string(),
                    request_id,
                )),
            }
        }
        "list" => {
            let req: ListRequest = serde_json::from_value(envelope.data)?;
            match connection.sandbox.list_files(&req.path).await {
                Ok(entries) => Ok(OutboundEnvelope::reply(
                    Domain::File,
                    "list",
                    json!({ "path": req.path, "entries": entries }),
                    request_id,
                    true,
                )),
                Err(e) => Ok(OutboundEnvelope::domain_failure(
                    Domain::File,
                    "list",
                    &e.to_string(),
                    request_id,
                )),
            }
        }
        other => Ok(OutboundEnvelope::protocol_error(
            "unknown_file_action",
            &format!("unknown file action: {other}"),
            request_id,
        )),
    }
}
