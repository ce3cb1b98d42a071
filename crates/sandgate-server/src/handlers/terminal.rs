//! Terminal domain: command execution and advisory resize.

use crate::registry::Connection;
use sandgate_core::envelope::{Domain, ExecuteRequest, ResizeRequest};
use sandgate_core::{GatewayResult, InboundEnvelope, OutboundEnvelope};
use serde_json::json;

pub async fn handle(
    connection: &Connection,
    envelope: InboundEnvelope,
) -> GatewayResult<OutboundEnvelope> {
    let request_id = envelope.request_id;
    match envelope.action.as_str() {
        "execute" => {
            let req: ExecuteRequest = serde_json::from_value(envelope.data)?;
            match connection
                .sandbox
                .execute(&req.command, req.options.as_ref())
                .await
            {
                Ok(result) => {
                    // success mirrors the execution's own flag, not just
                    // "the call didn't fail".
                    let success = result.success;
                    Ok(OutboundEnvelope::reply(
                        Domain::Terminal,
                        "execute_result",
                        serde_json::to_value(result)?,
                        request_id,
                        success,
                    ))
                }
                Err(e) => Ok(OutboundEnvelope::domain_failure(
                    Domain::Terminal,
                    "execute_result",
                    &e.to_string(),
                    request_id,
                )),
            }
        }
        "resize" => {
            // Advisory only; the PTY resize itself is the sandbox's concern.
            let req: ResizeRequest = serde_json::from_value(envelope.data)?;
            Ok(OutboundEnvelope::reply(
                Domain::Terminal,
                "resized",
                json!({ "rows": req.rows, "cols": req.cols }),
                request_id,
                true,
            ))
        }
        other => Ok(OutboundEnvelope::protocol_error(
            "unknown_terminal_action",
            &format!("unknown terminal action: {other}"),
            request_id,
        )),
    }
}
