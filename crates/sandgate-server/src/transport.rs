//! WebSocket transport using tokio-tungstenite.
//!
//! The upgrade is accepted through a header callback so unauthenticated
//! attempts are refused with an HTTP 401 before the socket ever
//! establishes. Frames are UTF-8 JSON text; protocol pings are answered
//! automatically.

use crate::handshake::{self, HandshakeClaims};
use futures_util::{SinkExt, StreamExt};
use sandgate_core::{GatewayError, GatewayResult, OutboundEnvelope};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::warn;

/// An upgraded socket whose bearer token already verified.
pub struct AuthenticatedSocket {
    pub stream: WebSocketStream<TcpStream>,
    pub remote_addr: SocketAddr,
    pub claims: HandshakeClaims,
}

fn error_response(status: u16, message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_string()));
    *response.status_mut() =
        StatusCode::from_u16(status).unwrap_or(StatusCode::UNAUTHORIZED);
    response
}

/// Accept a WebSocket upgrade, verifying the URL parameters and bearer
/// token inside the handshake callback. Missing parameters or a bad token
/// refuse the upgrade with HTTP 401; the peer learns nothing more.
pub async fn accept_authenticated(
    stream: TcpStream,
    remote_addr: SocketAddr,
    secret: &[u8],
) -> GatewayResult<AuthenticatedSocket> {
    let claims_slot: Arc<StdMutex<Option<HandshakeClaims>>> = Arc::new(StdMutex::new(None));
    let slot = claims_slot.clone();
    let secret = secret.to_vec();

    let callback = move |request: &Request, response: Response| {
        match handshake::authenticate(&secret, request.uri().query()) {
            Ok(claims) => {
                if let Ok(mut guard) = slot.lock() {
                    *guard = Some(claims);
                }
                Ok(response)
            }
            Err(e) => {
                warn!(remote = %remote_addr, error = %e, "rejecting handshake");
                Err(error_response(401, "unauthorized"))
            }
        }
    };

    let stream = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .map_err(|e| GatewayError::Transport(format!("WS accept failed: {e}")))?;

    let claims = claims_slot
        .lock()
        .ok()
        .and_then(|mut guard| guard.take())
        .ok_or_else(|| GatewayError::Unauthorized("handshake rejected".into()))?;

    Ok(AuthenticatedSocket {
        stream,
        remote_addr,
        claims,
    })
}

/// Send one envelope as a JSON text frame.
pub async fn send_envelope(
    ws: &mut WebSocketStream<TcpStream>,
    envelope: &OutboundEnvelope,
) -> GatewayResult<()> {
    let json = serde_json::to_string(envelope)
        .map_err(|e| GatewayError::Other(format!("envelope serialization failed: {e}")))?;
    ws.send(Message::Text(json))
        .await
        .map_err(|e| GatewayError::Transport(format!("WS send failed: {e}")))
}

/// Receive the next text frame. Returns `None` on close. Oversized frames
/// are rejected as `InvalidMessage` without consuming the connection;
/// pings are answered and binary frames ignored.
pub async fn recv_text(
    ws: &mut WebSocketStream<TcpStream>,
    max_frame_bytes: usize,
) -> GatewayResult<Option<String>> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                if text.len() > max_frame_bytes {
                    return Err(GatewayError::InvalidMessage(format!(
                        "frame too large: {} bytes (max {max_frame_bytes})",
                        text.len()
                    )));
                }
                return Ok(Some(text));
            }
            Some(Ok(Message::Close(_))) => return Ok(None),
            Some(Ok(Message::Ping(payload))) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                return Err(GatewayError::Transport(format!("WS recv failed: {e}")));
            }
            None => return Ok(None),
        }
    }
}

/// Close the socket with an application close code. Best effort — the
/// peer may already be gone.
pub async fn close_with(ws: &mut WebSocketStream<TcpStream>, code: u16, reason: &str) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_string().into(),
    };
    let _ = ws.close(Some(frame)).await;
}
