//! Connection handshake: URL parameters, token verification, membership.
//!
//! The upgrade URL carries `token` (bearer credential) and `instanceId`
//! (target). Parameter and token problems are rejected before the socket
//! upgrades (HTTP 401); directory and membership failures discovered after
//! the upgrade close the socket with [`CLOSE_UNAUTHORIZED`]. All reasons
//! collapse to one code toward the peer; details are logged server-side
//! only.

use crate::directory::{InstanceDirectory, InstanceRecord};
use sandgate_core::{verify_token, GatewayError, GatewayResult};
use tracing::warn;

/// Close code for any authorization failure after the upgrade.
pub const CLOSE_UNAUTHORIZED: u16 = 4401;
/// Close code for sandbox provisioning failures.
pub const CLOSE_UNAVAILABLE: u16 = 4503;

/// Raw parameters extracted from the connection URL.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub token: String,
    pub instance_id: String,
}

/// The authenticated identity of a connection attempt.
#[derive(Debug, Clone)]
pub struct HandshakeClaims {
    pub user_id: String,
    pub instance_id: String,
}

/// Parse the query string of the upgrade request.
pub fn parse_connect_params(query: Option<&str>) -> GatewayResult<ConnectParams> {
    let query = query.ok_or_else(|| GatewayError::Unauthorized("missing parameters".into()))?;

    let mut token = None;
    let mut instance_id = None;
    for pair in query.split('&') {
        let mut kv = pair.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("token"), Some(value)) if !value.is_empty() => token = Some(value.to_string()),
            (Some("instanceId"), Some(value)) if !value.is_empty() => {
                instance_id = Some(value.to_string())
            }
            _ => {}
        }
    }

    match (token, instance_id) {
        (Some(token), Some(instance_id)) => Ok(ConnectParams { token, instance_id }),
        (None, _) => Err(GatewayError::Unauthorized("missing token".into())),
        (_, None) => Err(GatewayError::Unauthorized("missing instanceId".into())),
    }
}

/// Validate parameters and token, producing the connection's claims.
pub fn authenticate(secret: &[u8], query: Option<&str>) -> GatewayResult<HandshakeClaims> {
    let params = parse_connect_params(query)?;
    let user_id = verify_token(secret, &params.token)?;
    Ok(HandshakeClaims {
        user_id,
        instance_id: params.instance_id,
    })
}

/// Confirm the authenticated user may access the target instance. The
/// instance is re-resolved here even though the token was already checked:
/// it may have disappeared since issuance.
pub async fn authorize(
    directory: &dyn InstanceDirectory,
    claims: &HandshakeClaims,
) -> GatewayResult<InstanceRecord> {
    let record = directory.resolve(&claims.instance_id).await?;
    if !record.is_member(&claims.user_id) {
        warn!(
            user_id = %claims.user_id,
            instance_id = %claims.instance_id,
            "membership check failed"
        );
        return Err(GatewayError::NotAMember {
            user: claims.user_id.clone(),
            instance: claims.instance_id.clone(),
        });
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use sandgate_core::create_token;

    #[test]
    fn parse_both_params() {
        let params = parse_connect_params(Some("token=abc&instanceId=inst-1")).unwrap();
        assert_eq!(params.token, "abc");
        assert_eq!(params.instance_id, "inst-1");
    }

    #[test]
    fn parse_order_independent_with_extras() {
        let params =
            parse_connect_params(Some("foo=1&instanceId=inst-2&token=tok&bar=2")).unwrap();
        assert_eq!(params.token, "tok");
        assert_eq!(params.instance_id, "inst-2");
    }

    #[test]
    fn parse_missing_pieces() {
        assert!(parse_connect_params(None).is_err());
        assert!(parse_connect_params(Some("")).is_err());
        assert!(parse_connect_params(Some("token=abc")).is_err());
        assert!(parse_connect_params(Some("instanceId=i")).is_err());
        assert!(parse_connect_params(Some("token=&instanceId=i")).is_err());
    }

    #[test]
    fn authenticate_valid_token() {
        let secret = sandgate_core::generate_secret();
        let token = create_token(&secret, "alice", 60);
        let query = format!("token={token}&instanceId=inst-1");
        let claims = authenticate(&secret, Some(&query)).unwrap();
        assert_eq!(claims.user_id, "alice");
        assert_eq!(claims.instance_id, "inst-1");
    }

    #[test]
    fn authenticate_rejects_forged_token() {
        let secret = sandgate_core::generate_secret();
        let other = sandgate_core::generate_secret();
        let token = create_token(&other, "alice", 60);
        let query = format!("token={token}&instanceId=inst-1");
        assert!(authenticate(&secret, Some(&query)).is_err());
    }

    #[tokio::test]
    async fn authorize_member_passes() {
        let dir = StaticDirectory::new();
        dir.insert(InstanceRecord {
            instance_id: "inst-1".into(),
            workspace_id: "ws-1".into(),
            member_ids: vec!["alice".into()],
        })
        .await;
        let claims = HandshakeClaims {
            user_id: "alice".into(),
            instance_id: "inst-1".into(),
        };
        let record = authorize(&dir, &claims).await.unwrap();
        assert_eq!(record.workspace_id, "ws-1");
    }

    #[tokio::test]
    async fn authorize_rejects_non_member() {
        let dir = StaticDirectory::new();
        dir.insert(InstanceRecord {
            instance_id: "inst-1".into(),
            workspace_id: "ws-1".into(),
            member_ids: vec!["alice".into()],
        })
        .await;
        let claims = HandshakeClaims {
            user_id: "mallory".into(),
            instance_id: "inst-1".into(),
        };
        assert!(matches!(
            authorize(&dir, &claims).await,
            Err(GatewayError::NotAMember { .. })
        ));
    }

    #[tokio::test]
    async fn authorize_rejects_missing_instance() {
        let dir = StaticDirectory::new();
        let claims = HandshakeClaims {
            user_id: "alice".into(),
            instance_id: "gone".into(),
        };
        assert!(matches!(
            authorize(&dir, &claims).await,
            Err(GatewayError::InstanceNotFound(_))
        ));
    }
}
