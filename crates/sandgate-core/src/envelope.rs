//! JSON message envelopes for the gateway wire protocol.
//!
//! Wire format: one JSON object per UTF-8 text frame.
//!
//! ```text
//! inbound:  { "type", "action", "data", "requestId"? }
//! outbound: { "type", "action", "data", "requestId"?, "success" }
//! ```
//!
//! `type` selects the handler domain; `action` is a domain-specific verb;
//! `data` stays opaque until the matching handler decodes it into one of
//! the typed request payloads below.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Message domains a client may address. Closed set — anything else on the
/// wire is reported as an `unknown_type` protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Terminal,
    File,
    System,
    Collaboration,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Terminal => "terminal",
            Domain::File => "file",
            Domain::System => "system",
            Domain::Collaboration => "collaboration",
        }
    }
}

/// Outbound envelope `type`: a domain, or the synthetic `error` used for
/// protocol-level failures not tied to any handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundKind {
    Terminal,
    File,
    System,
    Collaboration,
    Error,
}

impl From<Domain> for OutboundKind {
    fn from(d: Domain) -> Self {
        match d {
            Domain::Terminal => OutboundKind::Terminal,
            Domain::File => OutboundKind::File,
            Domain::System => OutboundKind::System,
            Domain::Collaboration => OutboundKind::Collaboration,
        }
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub domain: Domain,
    pub action: String,
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// An outbound message: direct reply, broadcast, or protocol error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "type")]
    pub kind: OutboundKind,
    pub action: String,
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub success: bool,
}

impl OutboundEnvelope {
    /// Build a direct reply in the given domain, echoing `request_id` unchanged.
    pub fn reply(
        domain: Domain,
        action: impl Into<String>,
        data: Value,
        request_id: Option<String>,
        success: bool,
    ) -> Self {
        Self {
            kind: domain.into(),
            action: action.into(),
            data,
            request_id,
            success,
        }
    }

    /// Build a domain-level failure reply: `success=false` with a
    /// human-readable `data.error`. These are expected, recoverable outcomes.
    pub fn domain_failure(
        domain: Domain,
        action: impl Into<String>,
        message: &str,
        request_id: Option<String>,
    ) -> Self {
        Self {
            kind: domain.into(),
            action: action.into(),
            data: serde_json::json!({ "error": message }),
            request_id,
            success: false,
        }
    }

    /// Build a protocol-level error envelope (`type: "error"`).
    pub fn protocol_error(
        action: impl Into<String>,
        message: &str,
        request_id: Option<String>,
    ) -> Self {
        Self {
            kind: OutboundKind::Error,
            action: action.into(),
            data: serde_json::json!({ "error": message }),
            request_id,
            success: false,
        }
    }

    /// Build a broadcast envelope. Broadcasts are not replies to the
    /// recipient's own request, so they never carry a `requestId`.
    pub fn broadcast(domain: Domain, action: impl Into<String>, data: Value) -> Self {
        Self {
            kind: domain.into(),
            action: action.into(),
            data,
            request_id: None,
            success: true,
        }
    }
}

/// Outcome of parsing one inbound text frame.
#[derive(Debug)]
pub enum ParseOutcome {
    /// A well-formed envelope with a known domain.
    Valid(InboundEnvelope),
    /// Valid JSON with a `type` outside the closed set.
    UnknownType { request_id: Option<String> },
    /// Not valid JSON, or structurally not an envelope.
    Malformed,
}

const KNOWN_TYPES: [&str; 4] = ["terminal", "file", "system", "collaboration"];

/// Parse a raw text frame into an envelope, distinguishing unknown-type
/// frames (which get an `unknown_type` reply) from malformed ones (which
/// get a generic `message_error`).
pub fn parse_inbound(text: &str) -> ParseOutcome {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return ParseOutcome::Malformed,
    };
    let Some(obj) = value.as_object() else {
        return ParseOutcome::Malformed;
    };
    let Some(ty) = obj.get("type").and_then(Value::as_str) else {
        return ParseOutcome::Malformed;
    };
    if !KNOWN_TYPES.contains(&ty) {
        let request_id = obj
            .get("requestId")
            .and_then(Value::as_str)
            .map(str::to_string);
        return ParseOutcome::UnknownType { request_id };
    }
    match serde_json::from_value::<InboundEnvelope>(value) {
        Ok(envelope) => ParseOutcome::Valid(envelope),
        Err(_) => ParseOutcome::Malformed,
    }
}

// ── Typed per-action payloads ───────────────────────────────────────────
//
// Decoded from `data` inside the matching handler only; the router never
// looks at payload contents.

/// `terminal/execute` request.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    pub command: String,
    #[serde(default)]
    pub options: Option<ExecOptions>,
}

/// Options for a command execution, passed through to the sandbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecOptions {
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
}

/// `terminal/resize` request. Advisory only.
#[derive(Debug, Clone, Deserialize)]
pub struct ResizeRequest {
    pub rows: u16,
    pub cols: u16,
}

/// `file/read` request.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadRequest {
    pub path: String,
}

/// `file/write` request.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteRequest {
    pub path: String,
    pub content: String,
}

/// `file/list` request.
#[derive(Debug, Clone, Deserialize)]
pub struct ListRequest {
    pub path: String,
}

/// Result of one command execution inside a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// One entry in a `file/list` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub size: u64,
}

/// Sandbox status snapshot returned by `system/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxStatus {
    pub state: String,
    pub endpoint: String,
}
